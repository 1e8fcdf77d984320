//! NeuroCursor Application
//!
//! Command-line entry point for the EEG signal-to-intent controller. The
//! pipeline runs on a blocking control thread while a tokio runtime feeds
//! the latest-sample slot from a simulated headset or a recorded stream.
//!
//! # Usage
//!
//! ```bash
//! # Simulated headset with the default threshold pipeline
//! neurocursor simulate --calibrate
//!
//! # Replay a JSON-lines recording through a configured pipeline
//! neurocursor --config pipeline.toml replay session.jsonl
//!
//! # Validate a config (and its model) without running anything
//! neurocursor --config pipeline.toml check-config --print
//!
//! # Calibrate against the simulator and print the baseline
//! neurocursor calibrate --duration-ms 3000
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use neurocursor_core::protocol::SampleUpdate;
use neurocursor_core::types::{Channel, IntentLabel};
use neurocursor_native::config::{DeciderConfig, PipelineConfig};
use neurocursor_native::decision::movement_step;
use neurocursor_native::error::ActuationFault;
use neurocursor_native::ml::{ModelDescriptor, SoftmaxModel};
use neurocursor_native::processing::BaselineCalibrator;
use neurocursor_native::session::{
    run_control_loop, ActionSink, CancelToken, CentreTarget, ControlSession, SampleSlot,
    SessionHandles, TickOutcome,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Runtime;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// NeuroCursor Application
#[derive(Parser, Debug)]
#[command(name = "neurocursor")]
#[command(author, version, about = "EEG signal-to-intent cursor controller", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Pipeline configuration (TOML); defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive the pipeline from a simulated headset (default if no subcommand)
    Simulate {
        /// Interval between simulated frames (ms)
        #[arg(long, default_value = "250")]
        sample_ms: u64,

        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<u64>,

        /// Calibrate the baseline before starting the control loop
        #[arg(long)]
        calibrate: bool,
    },

    /// Replay a recorded sample stream
    Replay {
        /// Recording, one frame per line
        file: PathBuf,

        /// Line format of the recording
        #[arg(long, value_enum, default_value = "json")]
        format: ReplayFormat,

        /// Interval between frames (ms)
        #[arg(long, default_value = "150")]
        frame_ms: u64,

        /// Quality stamped on formats that do not carry one
        #[arg(long, default_value = "0")]
        assume_quality: u16,
    },

    /// Validate the configuration and any model it names
    CheckConfig {
        /// Print the effective configuration as TOML
        #[arg(long)]
        print: bool,
    },

    /// Run one calibration against the simulator and print the baseline
    Calibrate {
        /// Override the configured calibration window (ms)
        #[arg(long)]
        duration_ms: Option<u64>,
    },
}

/// Recording line formats
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ReplayFormat {
    /// JSON object per line (`sig`, `att`, `med`, band powers, ...)
    Json,
    /// TGAM bridge line: `attention,meditation,raw`
    Tgam,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("NeuroCursor v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        None => run_simulate(config, 250, None, false),
        Some(Commands::Simulate { sample_ms, seconds, calibrate }) => {
            run_simulate(config, sample_ms, seconds, calibrate)
        }
        Some(Commands::Replay { file, format, frame_ms, assume_quality }) => {
            run_replay(config, &file, format, frame_ms, assume_quality)
        }
        Some(Commands::CheckConfig { print }) => check_config(&config, print),
        Some(Commands::Calibrate { duration_ms }) => run_calibrate(config, duration_ms),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(path) => {
            let config = PipelineConfig::load(path)?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        None => {
            info!("No configuration given, using defaults");
            Ok(PipelineConfig::default())
        }
    }
}

// ============================================================================
// Subcommands
// ============================================================================

/// Run the pipeline against the simulated headset
fn run_simulate(
    config: PipelineConfig,
    sample_ms: u64,
    seconds: Option<u64>,
    calibrate: bool,
) -> anyhow::Result<()> {
    let handles = SessionHandles::default();
    let mut session = ControlSession::from_config(&config, handles.clone())?;
    let calibrator = Arc::new(BaselineCalibrator::new(config.calibration.clone()));
    let cancel = CancelToken::new();
    let tick = config.tick_interval();

    let rt = Runtime::new()?;
    let result = rt.block_on(async {
        tokio::spawn(simulate_samples(
            handles.slot.clone(),
            Duration::from_millis(sample_ms.max(1)),
            cancel.clone(),
        ));
        spawn_shutdown_watch(cancel.clone(), seconds.map(Duration::from_secs));

        if calibrate {
            run_calibration(calibrator.clone(), handles.clone(), cancel.clone()).await;
        }

        tokio::spawn(operator_console(handles.clone(), calibrator, cancel.clone()));
        info!("Commands: {}", ConsoleCommand::HELP);

        let mut sink = CursorSink::new(config.effort.base_speed);
        let loop_cancel = cancel.clone();
        let control = tokio::task::spawn_blocking(move || {
            run_control_loop(&mut session, &mut sink, tick, &loop_cancel);
            sink
        });
        let sink = control.await?;
        sink.report();
        anyhow::Ok(())
    });

    // The console may still be parked on stdin
    rt.shutdown_background();
    result
}

/// Replay a recording through the pipeline, one frame per `frame_ms`
fn run_replay(
    config: PipelineConfig,
    file: &Path,
    format: ReplayFormat,
    frame_ms: u64,
    assume_quality: u16,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)?;
    let handles = SessionHandles::default();
    let mut session = ControlSession::from_config(&config, handles.clone())?;
    let cancel = CancelToken::new();
    let tick = config.tick_interval();

    let mut frames = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let decoded = match format {
            ReplayFormat::Json => SampleUpdate::from_json(line),
            ReplayFormat::Tgam => {
                SampleUpdate::from_tgam_line(line).map(|u| u.quality(assume_quality))
            }
        };
        match decoded {
            Ok(update) => frames.push(update),
            Err(e) => warn!("Skipping line {}: {}", number + 1, e),
        }
    }
    if frames.is_empty() {
        anyhow::bail!("No usable frames in {}", file.display());
    }
    info!("Replaying {} frames from {}", frames.len(), file.display());

    let rt = Runtime::new()?;
    rt.block_on(async {
        spawn_shutdown_watch(cancel.clone(), None);

        let mut sink = CursorSink::new(config.effort.base_speed);
        let loop_cancel = cancel.clone();
        let control = tokio::task::spawn_blocking(move || {
            run_control_loop(&mut session, &mut sink, tick, &loop_cancel);
            sink
        });

        let mut interval = tokio::time::interval(Duration::from_millis(frame_ms.max(1)));
        for update in &frames {
            if cancel.is_cancelled() {
                break;
            }
            interval.tick().await;
            handles.slot.ingest(update);
        }
        // Let the last frame reach at least one tick
        tokio::time::sleep(tick * 2).await;
        cancel.cancel();

        let sink = control.await?;
        sink.report();
        anyhow::Ok(())
    })
}

/// Validate configuration; for classifier pipelines also load the model and
/// check that every feature it needs is derivable.
fn check_config(config: &PipelineConfig, print: bool) -> anyhow::Result<()> {
    config.validate()?;

    if let DeciderConfig::Classifier { model_path, .. } = &config.decider {
        let model = SoftmaxModel::load(model_path)?;
        let descriptor = ModelDescriptor::new(Arc::new(model), config.labels)?;
        let missing = descriptor.missing_features();
        if !missing.is_empty() {
            anyhow::bail!(
                "Model {} needs features the deriver does not produce: {}",
                model_path.display(),
                missing.join(", ")
            );
        }
        info!(
            "Model {} OK: {} features, labels {:?}",
            model_path.display(),
            descriptor.feature_names().len(),
            descriptor.labels()
        );
    }

    let controller = config.build_controller()?;
    info!("Configuration OK ({:?})", controller);

    if print {
        println!("{}", config.to_toml_string()?);
    }
    Ok(())
}

/// Calibrate once against the simulator and print the resulting baseline
fn run_calibrate(mut config: PipelineConfig, duration_ms: Option<u64>) -> anyhow::Result<()> {
    if let Some(ms) = duration_ms {
        config.calibration.duration_ms = ms;
    }
    config.validate()?;

    let handles = SessionHandles::default();
    let calibrator = BaselineCalibrator::new(config.calibration.clone());
    let cancel = CancelToken::new();

    let rt = Runtime::new()?;
    let baseline = rt.block_on(async {
        tokio::spawn(simulate_samples(
            handles.slot.clone(),
            Duration::from_millis(100),
            cancel.clone(),
        ));
        spawn_shutdown_watch(cancel.clone(), None);

        let slot = handles.slot.clone();
        let store = handles.baseline.clone();
        let run_cancel = cancel.clone();
        let result = tokio::task::spawn_blocking(move || {
            calibrator.calibrate(&slot, &store, &run_cancel)
        })
        .await?;
        cancel.cancel();
        anyhow::Ok(result?)
    })?;

    println!("{}", serde_json::to_string_pretty(&baseline)?);
    Ok(())
}

// ============================================================================
// Runtime Tasks
// ============================================================================

/// Cancel on Ctrl-C, or after `limit` when one is given
fn spawn_shutdown_watch(cancel: CancelToken, limit: Option<Duration>) {
    tokio::spawn(async move {
        let deadline = async {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl-C: {}", e);
                    return;
                }
                info!("Interrupted, shutting down");
            }
            () = deadline => info!("Time limit reached, shutting down"),
        }
        cancel.cancel();
    });
}

/// Run one calibration on the blocking pool and log the outcome
async fn run_calibration(
    calibrator: Arc<BaselineCalibrator>,
    handles: SessionHandles,
    cancel: CancelToken,
) {
    let outcome = tokio::task::spawn_blocking(move || {
        calibrator.calibrate(&handles.slot, &handles.baseline, &cancel)
    })
    .await;

    match outcome {
        Ok(Ok(baseline)) => info!(
            "Baseline: attention {:.1}, meditation {:.1}, alpha {:.0}, beta {:.0}",
            baseline.channel(Channel::Attention),
            baseline.channel(Channel::Meditation),
            baseline.alpha(),
            baseline.beta()
        ),
        Ok(Err(e)) => warn!("{}", e),
        Err(e) => error!("Calibration task failed: {}", e),
    }
}

/// One line of operator input
#[derive(Copy, Clone, Debug, PartialEq)]
enum ConsoleCommand {
    Pause,
    Resume,
    Calibrate,
    Centre(CentreTarget),
    Quit,
}

impl ConsoleCommand {
    const HELP: &'static str = "pause, resume, calibrate, centre [level], quit";

    /// Parse a trimmed line; None for blank or unknown input
    fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = match words.next()? {
            "p" | "pause" => Self::Pause,
            "r" | "resume" => Self::Resume,
            "c" | "calibrate" => Self::Calibrate,
            "q" | "quit" => Self::Quit,
            "centre" | "center" => match words.next() {
                None => Self::Centre(CentreTarget::Average),
                Some(level) => {
                    let level: f64 = level.parse().ok()?;
                    if !level.is_finite() {
                        return None;
                    }
                    Self::Centre(CentreTarget::Value(level))
                }
            },
            _ => return None,
        };
        words.next().is_none().then_some(command)
    }
}

/// Operator commands from stdin
async fn operator_console(
    handles: SessionHandles,
    calibrator: Arc<BaselineCalibrator>,
    cancel: CancelToken,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match ConsoleCommand::parse(line) {
            Some(ConsoleCommand::Pause) => handles.interlock.pause(),
            Some(ConsoleCommand::Resume) => {
                if handles.interlock.resume().is_none() {
                    info!("Pipeline is not paused");
                }
            }
            Some(ConsoleCommand::Calibrate) => {
                tokio::spawn(run_calibration(calibrator.clone(), handles.clone(), cancel.clone()));
            }
            Some(ConsoleCommand::Centre(target)) => handles.centre.request(target),
            Some(ConsoleCommand::Quit) => {
                cancel.cancel();
                break;
            }
            None => warn!("Unknown command {:?} ({})", line, ConsoleCommand::HELP),
        }
    }
}

/// Simulated headset.
///
/// Cycles through neutral, focused, relaxed and blinking phases of about six
/// seconds each at the default rate, with an occasional contact dropout.
async fn simulate_samples(slot: Arc<SampleSlot>, period: Duration, cancel: CancelToken) {
    let mut interval = tokio::time::interval(period);
    let mut sequence = 0u64;

    while !cancel.is_cancelled() {
        interval.tick().await;
        slot.ingest(&simulated_frame(sequence));
        sequence += 1;
    }
}

fn simulated_frame(sequence: u64) -> SampleUpdate {
    const PHASE_LEN: u64 = 24;

    let t = sequence as f64;
    let wobble = |k: f64| (t * 0.37 + k).sin();
    let phase = (sequence / PHASE_LEN) % 4;

    let (attention, meditation) = match phase {
        1 => (85.0, 30.0),
        2 => (25.0, 85.0),
        _ => (45.0, 45.0),
    };
    let raw = if phase == 3 && sequence % PHASE_LEN == PHASE_LEN / 2 {
        1800.0
    } else {
        200.0 * wobble(5.0)
    };
    let quality = if sequence % 97 == 96 { 200 } else { 0 };

    SampleUpdate::new()
        .quality(quality)
        .channel(Channel::Attention, (attention + 5.0 * wobble(1.0)).clamp(0.0, 100.0))
        .channel(Channel::Meditation, (meditation + 5.0 * wobble(2.0)).clamp(0.0, 100.0))
        .channel(Channel::Raw, raw)
        .channel(Channel::Delta, 20_000.0 + 2_000.0 * wobble(3.0))
        .channel(Channel::Theta, 8_000.0 + 800.0 * wobble(4.0))
        .channel(Channel::LowAlpha, 5_000.0 + 400.0 * wobble(6.0))
        .channel(Channel::HighAlpha, 5_000.0 + 400.0 * wobble(7.0))
        .channel(Channel::LowBeta, 3_000.0 + 300.0 * wobble(8.0))
        .channel(Channel::HighBeta, 3_000.0 + 300.0 * wobble(9.0))
        .channel(Channel::LowGamma, 1_500.0 + 150.0 * wobble(10.0))
        .channel(Channel::MidGamma, 800.0 + 80.0 * wobble(11.0))
}

// ============================================================================
// Action Sink
// ============================================================================

/// Virtual cursor that logs every action.
///
/// Reaching a screen corner is a guarded boundary and trips the interlock.
struct CursorSink {
    x: f64,
    y: f64,
    base_speed: f64,
    actions: BTreeMap<IntentLabel, usize>,
}

impl CursorSink {
    const WIDTH: f64 = 1920.0;
    const HEIGHT: f64 = 1080.0;
    const STEP: f64 = 20.0;

    fn new(base_speed: f64) -> Self {
        Self {
            x: Self::WIDTH / 2.0,
            y: Self::HEIGHT / 2.0,
            base_speed,
            actions: BTreeMap::new(),
        }
    }

    fn at_corner(&self) -> bool {
        let edge_x = self.x <= 0.0 || self.x >= Self::WIDTH - 1.0;
        let edge_y = self.y <= 0.0 || self.y >= Self::HEIGHT - 1.0;
        edge_x && edge_y
    }

    fn report(&self) {
        if self.actions.is_empty() {
            info!("No actions taken");
            return;
        }
        for (label, count) in &self.actions {
            info!("{}: {} actions", label, count);
        }
    }
}

impl ActionSink for CursorSink {
    fn act(&mut self, outcome: &TickOutcome) -> Result<(), ActuationFault> {
        let label = outcome.intent.label;
        let step = outcome.drive.map_or(Self::STEP, |d| movement_step(self.base_speed, d));

        match label {
            IntentLabel::Up => self.y -= step,
            IntentLabel::Down => self.y += step,
            IntentLabel::Left => self.x -= step,
            IntentLabel::Right => self.x += step,
            IntentLabel::Click | IntentLabel::Idle => {}
        }
        self.x = self.x.clamp(0.0, Self::WIDTH - 1.0);
        self.y = self.y.clamp(0.0, Self::HEIGHT - 1.0);
        *self.actions.entry(label).or_default() += 1;

        info!(
            "{} ({:.0}%) -> cursor ({:.0}, {:.0})",
            label,
            outcome.intent.confidence * 100.0,
            self.x,
            self.y
        );

        if self.at_corner() {
            return Err(ActuationFault::Boundary(format!(
                "cursor reached corner ({:.0}, {:.0})",
                self.x, self.y
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurocursor_core::types::{Intent, RawSample};
    use neurocursor_native::session::TickStatus;

    fn outcome(label: IntentLabel) -> TickOutcome {
        TickOutcome {
            status: TickStatus::Active,
            raw: Intent::certain(label),
            intent: Intent::certain(label),
            drive: None,
            sequence: 1,
        }
    }

    #[test]
    fn test_cursor_moves_and_counts() {
        let mut sink = CursorSink::new(8.0);
        sink.act(&outcome(IntentLabel::Up)).unwrap();
        sink.act(&outcome(IntentLabel::Click)).unwrap();
        assert!((sink.y - (CursorSink::HEIGHT / 2.0 - CursorSink::STEP)).abs() < 1e-9);
        assert_eq!(sink.actions.get(&IntentLabel::Up), Some(&1));
        assert_eq!(sink.actions.get(&IntentLabel::Click), Some(&1));
    }

    #[test]
    fn test_drive_scales_the_step() {
        let mut sink = CursorSink::new(8.0);
        let left = TickOutcome { drive: Some(-40.0), ..outcome(IntentLabel::Left) };
        sink.act(&left).unwrap();
        assert!((sink.x - (CursorSink::WIDTH / 2.0 - 13.0)).abs() < 1e-9);
    }

    #[test]
    fn test_console_commands() {
        assert_eq!(ConsoleCommand::parse("pause"), Some(ConsoleCommand::Pause));
        assert_eq!(ConsoleCommand::parse("q"), Some(ConsoleCommand::Quit));
        assert_eq!(
            ConsoleCommand::parse("centre"),
            Some(ConsoleCommand::Centre(CentreTarget::Average))
        );
        assert_eq!(
            ConsoleCommand::parse("centre 62.5"),
            Some(ConsoleCommand::Centre(CentreTarget::Value(62.5)))
        );
        assert_eq!(ConsoleCommand::parse("centre high"), None);
        assert_eq!(ConsoleCommand::parse("centre NaN"), None);
        assert_eq!(ConsoleCommand::parse("pause now"), None);
        assert_eq!(ConsoleCommand::parse("jump"), None);
    }

    #[test]
    fn test_corner_is_a_fault() {
        let mut sink = CursorSink::new(8.0);
        sink.x = 5.0;
        sink.y = 5.0;
        assert!(sink.act(&outcome(IntentLabel::Left)).is_ok());
        assert!(matches!(sink.act(&outcome(IntentLabel::Up)), Err(ActuationFault::Boundary(_))));
    }

    #[test]
    fn test_simulated_frames_cover_phases() {
        let mut sample = RawSample::default();
        simulated_frame(30).apply_to(&mut sample);
        assert!(sample.channel(Channel::Attention) > 70.0);
        assert_eq!(sample.quality.value(), 0);

        simulated_frame(50).apply_to(&mut sample);
        assert!(sample.channel(Channel::Meditation) > 70.0);

        simulated_frame(84).apply_to(&mut sample);
        assert!((sample.channel(Channel::Raw) - 1800.0).abs() < 1e-9);

        simulated_frame(96).apply_to(&mut sample);
        assert_eq!(sample.quality.value(), 200);
    }
}
