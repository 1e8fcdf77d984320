//! Control session: the per-tick pipeline
//!
//! The session owns every piece of per-loop state (smoother, debouncer,
//! decider) and reads the two shared pieces (latest sample, baseline)
//! through short copy-out snapshots. One call to [`ControlSession::tick`]
//! runs the whole pipeline once:
//!
//! ```text
//! interlock → liveness → smoother → quality gate → features → decider → debouncer
//! ```
//!
//! Every failure path ends in IDLE with a [`TickStatus`] saying why. A
//! discrete action fires at most once per accepted sample, however many
//! ticks that sample stays in the slot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use neurocursor_core::types::{Intent, LabelSet, SignalQuality};

use crate::config::PipelineConfig;
use crate::decision::{Debouncer, EffortController, IntentDecider, Stabilized};
use crate::error::{ActuationFault, DecisionError};
use crate::ml::features::FeatureDeriver;
use crate::processing::smoother::CausalSmoother;
use crate::session::shared::{
    BaselineStore, CancelToken, CentreRequest, CentreTarget, Interlock, SampleSlot,
};

/// Why a tick produced the intent it did
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TickStatus {
    /// The pipeline decided normally
    Active,
    /// The interlock is engaged
    Paused,
    /// No sample within the liveness window
    DataGap,
    /// Signal quality is above the gate ceiling
    PoorSignal,
    /// No accepted sample has been smoothed yet
    Warmup,
    /// The classifier needs a feature the deriver does not produce
    FeatureMismatch,
    /// The classifier failed on this tick
    DecisionFailed,
    /// A discrete action was held back by the debouncer cooldown
    Suppressed,
}

/// Result of one tick
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TickOutcome {
    /// Why the intent is what it is
    pub status: TickStatus,
    /// Decider output before debouncing (IDLE on inert paths)
    pub raw: Intent,
    /// Intent to act on
    pub intent: Intent,
    /// Signed drive for continuous control (LEFT negative)
    pub drive: Option<f64>,
    /// Slot sequence the tick saw (0 before the first sample)
    pub sequence: u64,
}

impl TickOutcome {
    const fn inert(status: TickStatus, sequence: u64) -> Self {
        Self { status, raw: Intent::idle(), intent: Intent::idle(), drive: None, sequence }
    }

    /// Check if the sink should act on this tick
    #[must_use]
    pub const fn is_actionable(&self) -> bool {
        matches!(self.status, TickStatus::Active) && self.intent.label.is_active()
    }
}

/// Consumer of stabilized intents (cursor driver, logger, ...)
pub trait ActionSink {
    /// Act on one tick's intent.
    ///
    /// # Errors
    ///
    /// Returns [`ActuationFault`] when actuation hits a guarded condition;
    /// the session pauses until the interlock is cleared.
    fn act(&mut self, outcome: &TickOutcome) -> Result<(), ActuationFault>;
}

/// Decision stage selected at construction
pub enum Controller {
    /// Smoothed features through a discrete decider and the debouncer
    Discrete(Box<dyn IntentDecider>),
    /// Continuous attention-effort drive
    Effort(EffortController),
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discrete(d) => write!(f, "Discrete({})", d.name()),
            Self::Effort(_) => f.write_str("Effort"),
        }
    }
}

/// Handles to the state shared with producers and operators
#[derive(Clone, Debug, Default)]
pub struct SessionHandles {
    /// Latest-sample slot written by the transport
    pub slot: Arc<SampleSlot>,
    /// Process baseline written by calibration
    pub baseline: Arc<BaselineStore>,
    /// Pause/resume control surface
    pub interlock: Arc<Interlock>,
    /// Operator re-centring of the effort controller
    pub centre: Arc<CentreRequest>,
}

/// Per-loop pipeline state
#[derive(Debug)]
pub struct ControlSession {
    handles: SessionHandles,
    controller: Controller,
    smoother: CausalSmoother,
    deriver: FeatureDeriver,
    debouncer: Debouncer,
    acceptance: SignalQuality,
    liveness_timeout: Duration,
    labels: LabelSet,
    last_sequence: u64,
    smoothed_sequence: u64,
    discrete_sequence: Option<u64>,
    last_status: Option<TickStatus>,
}

impl ControlSession {
    /// Build a session from configuration, loading any model it names.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ConfigError`] if the configuration is invalid
    /// or the model cannot be loaded.
    pub fn from_config(
        config: &PipelineConfig,
        handles: SessionHandles,
    ) -> crate::error::ConfigResult<Self> {
        config.validate()?;
        let controller = config.build_controller()?;
        Ok(Self::new(config, controller, handles))
    }

    /// Build a session around an explicit controller
    #[must_use]
    pub fn new(config: &PipelineConfig, controller: Controller, handles: SessionHandles) -> Self {
        tracing::info!("Control session using {:?}", controller);
        Self {
            handles,
            controller,
            smoother: CausalSmoother::new(config.smoothing),
            deriver: FeatureDeriver::new(config.features.clone()),
            debouncer: Debouncer::new(config.debounce.clone()),
            acceptance: config.acceptance(),
            liveness_timeout: config.liveness_timeout(),
            labels: config.labels,
            last_sequence: 0,
            smoothed_sequence: 0,
            discrete_sequence: None,
            last_status: None,
        }
    }

    /// Shared-state handles
    #[must_use]
    pub const fn handles(&self) -> &SessionHandles {
        &self.handles
    }

    /// Move the effort centre. Returns the new centre, or None when the
    /// controller is discrete or has no smoothed attention to centre on yet.
    pub fn set_effort_centre(&mut self, target: CentreTarget) -> Option<f64> {
        let Controller::Effort(effort) = &mut self.controller else {
            tracing::warn!("Ignoring centre request: no effort controller");
            return None;
        };
        match target {
            CentreTarget::Average => {
                let centre = effort.set_centre();
                if centre.is_none() {
                    tracing::warn!("No attention reading yet; centre unchanged");
                }
                centre
            }
            CentreTarget::Value(value) => {
                effort.set_centre_to(value);
                Some(value)
            }
        }
    }

    /// Run one tick at the current time
    pub fn tick(&mut self) -> TickOutcome {
        self.tick_at(Instant::now())
    }

    /// Run one tick as if at `now`
    pub fn tick_at(&mut self, now: Instant) -> TickOutcome {
        if let Some(target) = self.handles.centre.take() {
            self.set_effort_centre(target);
        }
        let outcome = self.step(now);
        self.note_transition(&outcome);
        outcome
    }

    fn step(&mut self, now: Instant) -> TickOutcome {
        let sequence = self.handles.slot.sequence();

        if self.handles.interlock.is_engaged() {
            self.debouncer.reset();
            return TickOutcome::inert(TickStatus::Paused, sequence);
        }

        let snapshot = match self.handles.slot.snapshot() {
            Some(s) if now.saturating_duration_since(s.received_at) <= self.liveness_timeout => s,
            _ => {
                if self.last_status != Some(TickStatus::DataGap) {
                    self.smoother.reset();
                    self.debouncer.reset();
                    if let Controller::Effort(effort) = &mut self.controller {
                        effort.reset();
                    }
                }
                return TickOutcome::inert(TickStatus::DataGap, sequence);
            }
        };

        let is_new = snapshot.sequence != self.last_sequence;
        self.last_sequence = snapshot.sequence;
        let sample = &snapshot.sample;

        if let Controller::Effort(effort) = &mut self.controller {
            if !is_new {
                return TickOutcome::inert(TickStatus::Active, snapshot.sequence);
            }
            let ceiling = SignalQuality::new(effort.config().quality_ceiling);
            let status =
                if sample.is_accepted(ceiling) { TickStatus::Active } else { TickStatus::PoorSignal };
            let out = effort.update_at(sample, now);
            if !self.labels.contains(out.intent.label) {
                tracing::debug!("{} is outside the label set; holding", out.intent.label);
                return TickOutcome::inert(status, snapshot.sequence);
            }
            return TickOutcome {
                status,
                raw: out.intent,
                intent: out.intent,
                drive: Some(out.drive),
                sequence: snapshot.sequence,
            };
        }

        if is_new && sample.is_accepted(self.acceptance) {
            self.smoother.push_sample(sample);
            self.smoothed_sequence = snapshot.sequence;
        }

        let Controller::Discrete(decider) = &self.controller else {
            return TickOutcome::inert(TickStatus::Active, snapshot.sequence);
        };

        if !decider.gate().admits(sample.quality) {
            return TickOutcome::inert(TickStatus::PoorSignal, snapshot.sequence);
        }
        if self.smoother.is_empty() {
            return TickOutcome::inert(TickStatus::Warmup, snapshot.sequence);
        }

        let baseline = self.handles.baseline.snapshot();
        let features = self.deriver.derive(&self.smoother.snapshot(), &baseline);

        let raw = match decider.decide(&features, sample.quality) {
            Ok(intent)
                if intent.label.is_discrete()
                    && self.discrete_sequence == Some(self.smoothed_sequence) =>
            {
                tracing::trace!("{} already emitted for this sample", intent.label);
                Intent::idle()
            }
            Ok(intent) if self.labels.contains(intent.label) => intent,
            Ok(intent) => {
                tracing::debug!("{} is outside the label set; holding", intent.label);
                Intent::idle()
            }
            Err(e) => {
                let status = match e {
                    DecisionError::FeatureMismatch { .. } => TickStatus::FeatureMismatch,
                    DecisionError::Classifier { .. } => TickStatus::DecisionFailed,
                };
                if self.last_status != Some(status) {
                    tracing::error!("Decision failed, emitting IDLE: {}", e);
                }
                return TickOutcome::inert(status, snapshot.sequence);
            }
        };

        let (status, intent) = match self.debouncer.stabilize(raw) {
            Stabilized::Emit(intent) => {
                if intent.label.is_discrete() {
                    self.discrete_sequence = Some(self.smoothed_sequence);
                }
                (TickStatus::Active, intent)
            }
            Stabilized::Suppressed => (TickStatus::Suppressed, Intent::idle()),
        };
        TickOutcome { status, raw, intent, drive: None, sequence: snapshot.sequence }
    }

    fn note_transition(&mut self, outcome: &TickOutcome) {
        if self.last_status == Some(outcome.status) {
            return;
        }
        match outcome.status {
            TickStatus::DataGap => {
                tracing::warn!("No sample within {:?}; holding IDLE", self.liveness_timeout);
            }
            TickStatus::PoorSignal => tracing::warn!("Poor signal; holding IDLE"),
            TickStatus::Paused => tracing::info!("Pipeline paused"),
            TickStatus::Active => {
                if self.last_status.is_some() {
                    tracing::info!("Pipeline active");
                }
            }
            status => tracing::debug!("Tick status {:?}", status),
        }
        self.last_status = Some(outcome.status);
    }

    /// Run one tick and hand actionable intents to `sink`.
    ///
    /// A sink fault trips the interlock; the outcome returned is the one
    /// the sink rejected.
    pub fn tick_into(&mut self, sink: &mut dyn ActionSink) -> TickOutcome {
        let outcome = self.tick();
        if outcome.is_actionable() {
            if let Err(fault) = sink.act(&outcome) {
                self.handles.interlock.trip(fault);
            }
        }
        outcome
    }
}

/// Drive `session` at a fixed cadence until `cancel` fires.
///
/// Blocks the calling thread; shutdown latency is bounded by the cancel
/// token's polling slice.
pub fn run_control_loop(
    session: &mut ControlSession,
    sink: &mut dyn ActionSink,
    tick_interval: Duration,
    cancel: &CancelToken,
) {
    tracing::info!("Control loop started ({:?} ticks)", tick_interval);
    while !cancel.is_cancelled() {
        let started = Instant::now();
        session.tick_into(sink);
        let elapsed = started.elapsed();
        if !cancel.sleep(tick_interval.saturating_sub(elapsed)) {
            break;
        }
    }
    tracing::info!("Control loop stopped");
}
