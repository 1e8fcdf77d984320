//! Baseline Calibration
//!
//! Establishes the per-channel resting reference used for normalization.
//!
//! # Calibration Strategy
//!
//! 1. Poll the latest-sample slot at a fixed interval for a fixed window
//! 2. Count each distinct sample once (by its slot sequence number)
//! 3. Discard samples whose quality is above the threshold entirely
//! 4. Average every tracked channel over the accepted samples
//! 5. Replace the process baseline in one step, or keep it on failure

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use neurocursor_core::types::{Baseline, Channel, ChannelSet, RawSample, SignalQuality};
use serde::{Deserialize, Serialize};

use crate::error::{CalibrationError, CalibrationResult};
use crate::session::shared::{BaselineStore, CancelToken, SampleSlot};

/// Calibration run configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Collection window (ms)
    pub duration_ms: u64,
    /// Worst accepted signal quality (inclusive)
    pub quality_threshold: u16,
    /// Slot polling interval (ms)
    pub poll_interval_ms: u64,
    /// Channels averaged into the baseline
    pub channels: ChannelSet,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        let channels = Channel::ALL.into_iter().filter(|c| *c != Channel::Raw).collect();
        Self { duration_ms: 5000, quality_threshold: 100, poll_interval_ms: 100, channels }
    }
}

impl CalibrationConfig {
    /// Collection window
    #[must_use]
    pub const fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Polling interval
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Quality threshold as a [`SignalQuality`]
    #[must_use]
    pub const fn threshold(&self) -> SignalQuality {
        SignalQuality::new(self.quality_threshold)
    }
}

// ============================================================================
// Accumulator
// ============================================================================

/// Per-channel running sums over accepted samples.
///
/// Pure bookkeeping with no clock or locks; the timed run drives it.
#[derive(Clone, Debug)]
pub struct BaselineAccumulator {
    threshold: SignalQuality,
    channels: ChannelSet,
    sums: [f64; Channel::COUNT],
    counts: [usize; Channel::COUNT],
    accepted: usize,
    observed: usize,
}

impl BaselineAccumulator {
    /// Create an empty accumulator
    #[must_use]
    pub fn new(threshold: SignalQuality, channels: ChannelSet) -> Self {
        Self {
            threshold,
            channels,
            sums: [0.0; Channel::COUNT],
            counts: [0; Channel::COUNT],
            accepted: 0,
            observed: 0,
        }
    }

    /// Observe one distinct sample. Returns whether it was accepted.
    ///
    /// Only channels the device has reported at least once are accumulated,
    /// so a channel the transport never carries keeps its previous baseline.
    pub fn observe(&mut self, sample: &RawSample) -> bool {
        self.observed += 1;
        if !sample.is_accepted(self.threshold) {
            return false;
        }
        self.accepted += 1;
        for channel in self.channels.iter() {
            if sample.reported.contains(channel) {
                self.sums[channel.index()] += sample.channel(channel);
                self.counts[channel.index()] += 1;
            }
        }
        true
    }

    /// Samples accepted so far
    #[must_use]
    pub const fn accepted(&self) -> usize {
        self.accepted
    }

    /// Distinct samples seen so far
    #[must_use]
    pub const fn observed(&self) -> usize {
        self.observed
    }

    /// Build the new baseline on top of `previous`.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::NoAcceptedSamples`] if nothing was accepted.
    pub fn finish(&self, previous: &Baseline) -> CalibrationResult<Baseline> {
        if self.accepted == 0 {
            return Err(CalibrationError::NoAcceptedSamples {
                quality_threshold: self.threshold.value(),
                observed: self.observed,
            });
        }

        let mut values = previous.values;
        for (i, value) in values.iter_mut().enumerate() {
            if self.counts[i] > 0 {
                *value = self.sums[i] / self.counts[i] as f64;
            }
        }
        Ok(Baseline::from_values(values, self.accepted))
    }
}

// ============================================================================
// Timed Calibration
// ============================================================================

/// Runs timed calibration windows against the shared slot.
///
/// At most one run is active at a time. The run blocks its thread, so
/// callers put it on its own execution context (a spawned thread or
/// `spawn_blocking`).
#[derive(Debug, Default)]
pub struct BaselineCalibrator {
    config: CalibrationConfig,
    running: AtomicBool,
}

struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl BaselineCalibrator {
    /// Create a calibrator
    #[must_use]
    pub fn new(config: CalibrationConfig) -> Self {
        Self { config, running: AtomicBool::new(false) }
    }

    /// Configuration in force
    #[must_use]
    pub const fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Check if a run is in progress
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Collect for the configured window and replace the baseline.
    ///
    /// Only samples that arrive after the run starts count; whatever the
    /// slot already holds is history. The slot lock is held only for each
    /// individual read and the store lock only for the final swap. On any
    /// error the store is untouched.
    ///
    /// # Errors
    ///
    /// - [`CalibrationError::AlreadyRunning`] if another run is active
    /// - [`CalibrationError::Cancelled`] if `cancel` fires first
    /// - [`CalibrationError::NoAcceptedSamples`] if every sample was rejected
    pub fn calibrate(
        &self,
        slot: &SampleSlot,
        store: &BaselineStore,
        cancel: &CancelToken,
    ) -> CalibrationResult<Baseline> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CalibrationError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.running);

        tracing::info!(
            "Calibration started: {} ms, quality <= {}",
            self.config.duration_ms,
            self.config.quality_threshold
        );

        let mut acc = BaselineAccumulator::new(self.config.threshold(), self.config.channels);
        let mut last_sequence = slot.sequence();
        let deadline = Instant::now() + self.config.duration();

        loop {
            if let Some(snapshot) = slot.snapshot() {
                if snapshot.sequence != last_sequence {
                    last_sequence = snapshot.sequence;
                    acc.observe(&snapshot.sample);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wait = self.config.poll_interval().min(deadline - now);
            if !cancel.sleep(wait) {
                tracing::info!("Calibration cancelled");
                return Err(CalibrationError::Cancelled { accepted: acc.accepted() });
            }
        }

        let previous = store.snapshot();
        match acc.finish(&previous) {
            Ok(baseline) => {
                store.replace(baseline.clone());
                tracing::info!(
                    "Calibration complete: {} of {} samples accepted",
                    acc.accepted(),
                    acc.observed()
                );
                Ok(baseline)
            }
            Err(e) => {
                tracing::warn!("{}; keeping previous baseline", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurocursor_core::protocol::SampleUpdate;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn sample(quality: u16, att: f64) -> RawSample {
        RawSample::default()
            .with_quality(SignalQuality::new(quality))
            .with_channel(Channel::Attention, att)
    }

    #[test]
    fn test_mean_of_accepted_samples() {
        let mut acc = BaselineAccumulator::new(SignalQuality::new(50), ChannelSet::ALL);
        assert!(acc.observe(&sample(0, 40.0)));
        assert!(acc.observe(&sample(50, 60.0)));
        assert!(!acc.observe(&sample(51, 1000.0)));

        let baseline = acc.finish(&Baseline::default()).unwrap();
        assert!((baseline.channel(Channel::Attention) - 50.0).abs() < 1e-9);
        assert_eq!(baseline.sample_count, 2);
        assert_eq!(acc.observed(), 3);
    }

    #[test]
    fn test_unreported_channel_keeps_previous_value() {
        let mut acc = BaselineAccumulator::new(SignalQuality::new(50), ChannelSet::ALL);
        acc.observe(&sample(0, 40.0));

        let baseline = acc.finish(&Baseline::default()).unwrap();
        assert!((baseline.channel(Channel::Meditation) - Baseline::DEFAULT_ESENSE).abs() < 1e-9);
        assert!((baseline.channel(Channel::LowAlpha) - Baseline::DEFAULT_ALPHA_BAND).abs() < 1e-9);
    }

    #[test]
    fn test_untracked_channel_keeps_previous_value() {
        let mut acc = BaselineAccumulator::new(SignalQuality::new(50), ChannelSet::CORE);
        acc.observe(&sample(0, 40.0).with_channel(Channel::Theta, 900.0));

        let previous = Baseline::default().with_channel(Channel::Theta, 123.0);
        let baseline = acc.finish(&previous).unwrap();
        assert!((baseline.channel(Channel::Theta) - 123.0).abs() < 1e-9);
        assert!((baseline.channel(Channel::Attention) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_rejected_fails() {
        let mut acc = BaselineAccumulator::new(SignalQuality::new(100), ChannelSet::ALL);
        acc.observe(&sample(200, 10.0));
        assert_eq!(
            acc.finish(&Baseline::default()),
            Err(CalibrationError::NoAcceptedSamples { quality_threshold: 100, observed: 1 })
        );
    }

    fn fast_config() -> CalibrationConfig {
        CalibrationConfig { duration_ms: 120, poll_interval_ms: 10, ..CalibrationConfig::default() }
    }

    /// Ingest `update` once, shortly after the calibration window opens
    fn ingest_later(slot: &Arc<SampleSlot>, update: SampleUpdate) -> std::thread::JoinHandle<()> {
        let slot = Arc::clone(slot);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            slot.ingest(&update);
        })
    }

    #[test]
    fn test_calibrate_replaces_store() {
        let slot = Arc::new(SampleSlot::new());
        let store = BaselineStore::default();
        let producer =
            ingest_later(&slot, SampleUpdate::new().quality(0).channel(Channel::Attention, 44.0));

        let calibrator = BaselineCalibrator::new(fast_config());
        let baseline = calibrator.calibrate(&slot, &store, &CancelToken::new()).unwrap();
        producer.join().unwrap();

        // One distinct sample, however many polls saw it
        assert_eq!(baseline.sample_count, 1);
        assert!((store.snapshot().channel(Channel::Attention) - 44.0).abs() < 1e-9);
        assert!(!calibrator.is_running());
    }

    #[test]
    fn test_calibrate_failure_keeps_store() {
        let slot = Arc::new(SampleSlot::new());
        let store = BaselineStore::default();
        let producer =
            ingest_later(&slot, SampleUpdate::new().quality(200).channel(Channel::Attention, 99.0));

        let result = BaselineCalibrator::new(fast_config()).calibrate(
            &slot,
            &store,
            &CancelToken::new(),
        );
        producer.join().unwrap();
        assert_eq!(
            result,
            Err(CalibrationError::NoAcceptedSamples { quality_threshold: 100, observed: 1 })
        );
        assert_eq!(*store.snapshot(), Baseline::default());
    }

    #[test]
    fn test_calibrate_ignores_sample_from_before_the_window() {
        // A good sample is in the slot, but the transport has gone quiet
        let slot = SampleSlot::new();
        slot.ingest(&SampleUpdate::new().quality(0).channel(Channel::Attention, 77.0));
        let store = BaselineStore::default();

        let result = BaselineCalibrator::new(fast_config()).calibrate(
            &slot,
            &store,
            &CancelToken::new(),
        );
        assert_eq!(
            result,
            Err(CalibrationError::NoAcceptedSamples { quality_threshold: 100, observed: 0 })
        );
        assert_eq!(*store.snapshot(), Baseline::default());
    }

    #[test]
    fn test_calibrate_without_any_sample_fails() {
        let result = BaselineCalibrator::new(fast_config()).calibrate(
            &SampleSlot::new(),
            &BaselineStore::default(),
            &CancelToken::new(),
        );
        assert_eq!(
            result,
            Err(CalibrationError::NoAcceptedSamples { quality_threshold: 100, observed: 0 })
        );
    }

    #[test]
    fn test_calibrate_cancel_is_prompt() {
        let config = CalibrationConfig { duration_ms: 10_000, ..CalibrationConfig::default() };
        let calibrator = BaselineCalibrator::new(config);
        let cancel = CancelToken::new();
        cancel.cancel();

        let start = Instant::now();
        let result =
            calibrator.calibrate(&SampleSlot::new(), &BaselineStore::default(), &cancel);
        assert!(matches!(result, Err(CalibrationError::Cancelled { accepted: 0 })));
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_second_run_rejected_while_running() {
        let config = CalibrationConfig { duration_ms: 300, ..CalibrationConfig::default() };
        let calibrator = Arc::new(BaselineCalibrator::new(config));
        let slot = Arc::new(SampleSlot::new());
        let store = Arc::new(BaselineStore::default());
        let cancel = CancelToken::new();

        let handle = {
            let (calibrator, slot, store, cancel) =
                (Arc::clone(&calibrator), Arc::clone(&slot), Arc::clone(&store), cancel.clone());
            std::thread::spawn(move || calibrator.calibrate(&slot, &store, &cancel))
        };
        while !calibrator.is_running() {
            std::thread::yield_now();
        }
        assert_eq!(
            calibrator.calibrate(&slot, &store, &CancelToken::new()),
            Err(CalibrationError::AlreadyRunning)
        );
        cancel.cancel();
        assert!(handle.join().unwrap().is_err());
    }

    proptest! {
        #[test]
        fn prop_all_bad_quality_never_produces_baseline(
            qualities in prop::collection::vec(101u16..=200, 0..30),
            values in prop::collection::vec(0.0f64..100.0, 30),
        ) {
            let mut acc = BaselineAccumulator::new(SignalQuality::new(100), ChannelSet::ALL);
            for (q, v) in qualities.iter().zip(&values) {
                acc.observe(&sample(*q, *v));
            }
            let is_no_accepted = matches!(
                acc.finish(&Baseline::default()),
                Err(CalibrationError::NoAcceptedSamples { .. })
            );
            prop_assert!(is_no_accepted);
        }
    }
}
