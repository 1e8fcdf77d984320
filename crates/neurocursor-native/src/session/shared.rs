//! State shared between the sample producer and the control loop.
//!
//! There are exactly two pieces of shared mutable state: the latest-sample
//! slot and the baseline. Each sits behind its own lock, is copied out
//! under the lock, and is worked on outside it. Readers see either the old
//! or the new value, never a mix.
//!
//! The [`Interlock`] and [`CancelToken`] are the control surfaces: one for
//! pausing actuation until an operator clears it, one for cooperative
//! shutdown of the control loop and calibration runs. [`CentreRequest`]
//! carries operator re-centring of the effort controller into the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use neurocursor_core::protocol::SampleUpdate;
use neurocursor_core::types::{Baseline, RawSample};

use crate::error::ActuationFault;

/// Longest single sleep between cancellation checks
pub const CANCEL_POLL: Duration = Duration::from_millis(50);

// ============================================================================
// Latest Sample Slot
// ============================================================================

/// Copy of the slot taken under its lock
#[derive(Clone, Debug, PartialEq)]
pub struct SampleSnapshot {
    /// Merged latest sample
    pub sample: RawSample,
    /// Increments once per non-empty frame
    pub sequence: u64,
    /// When the last non-empty frame arrived
    pub received_at: Instant,
}

#[derive(Debug, Default)]
struct SlotState {
    sample: RawSample,
    sequence: u64,
    received_at: Option<Instant>,
}

/// Single-writer slot holding the most recent merged sample.
#[derive(Debug, Default)]
pub struct SampleSlot {
    inner: Mutex<SlotState>,
}

impl SampleSlot {
    /// Create an empty slot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a decoded frame, stamping it with the current time
    pub fn ingest(&self, update: &SampleUpdate) -> Option<u64> {
        self.ingest_at(update, Instant::now())
    }

    /// Merge a decoded frame received at `now`.
    ///
    /// Returns the new sequence number, or None if the frame carried nothing.
    /// Poor-quality frames are still merged: they refresh liveness, and the
    /// consumers filter them by quality.
    pub fn ingest_at(&self, update: &SampleUpdate, now: Instant) -> Option<u64> {
        if update.is_empty() {
            return None;
        }
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        update.apply_to(&mut state.sample);
        state.sequence += 1;
        state.received_at = Some(now);
        Some(state.sequence)
    }

    /// Copy out the latest sample (None until the first frame)
    #[must_use]
    pub fn snapshot(&self) -> Option<SampleSnapshot> {
        let state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.received_at.map(|received_at| SampleSnapshot {
            sample: state.sample.clone(),
            sequence: state.sequence,
            received_at,
        })
    }

    /// Sequence number of the latest frame (0 before the first)
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).sequence
    }
}

// ============================================================================
// Baseline Store
// ============================================================================

/// Process baseline, replaced wholesale by calibration.
#[derive(Debug)]
pub struct BaselineStore {
    inner: RwLock<Arc<Baseline>>,
}

impl BaselineStore {
    /// Create a store holding `baseline`
    #[must_use]
    pub fn new(baseline: Baseline) -> Self {
        Self { inner: RwLock::new(Arc::new(baseline)) }
    }

    /// Current baseline
    #[must_use]
    pub fn snapshot(&self) -> Arc<Baseline> {
        Arc::clone(&self.inner.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the baseline atomically
    pub fn replace(&self, baseline: Baseline) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(baseline);
    }
}

impl Default for BaselineStore {
    fn default() -> Self {
        Self::new(Baseline::default())
    }
}

// ============================================================================
// Interlock
// ============================================================================

/// Why actuation is paused
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PauseReason {
    /// The operator paused the pipeline
    Operator,
    /// The action sink reported a fault
    Fault(ActuationFault),
}

/// Pause/resume control surface.
///
/// Once engaged, the pipeline emits IDLE and performs no actuation until
/// [`Interlock::resume`] is called explicitly.
#[derive(Debug, Default)]
pub struct Interlock {
    state: Mutex<Option<PauseReason>>,
}

impl Interlock {
    /// Create a cleared interlock
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Operator pause
    pub fn pause(&self) {
        self.engage(PauseReason::Operator);
    }

    /// Engage from an actuation fault. A fault overrides an operator pause.
    pub fn trip(&self, fault: ActuationFault) {
        tracing::warn!("Safety interlock engaged: {}", fault);
        self.engage(PauseReason::Fault(fault));
    }

    fn engage(&self, reason: PauseReason) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let keep_fault = matches!(*state, Some(PauseReason::Fault(_)))
            && reason == PauseReason::Operator;
        if !keep_fault {
            *state = Some(reason);
        }
    }

    /// Clear the interlock (operator action). Returns the reason it was engaged.
    pub fn resume(&self) -> Option<PauseReason> {
        let previous = self.state.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(reason) = &previous {
            tracing::info!("Interlock cleared (was {:?})", reason);
        }
        previous
    }

    /// Check if actuation is paused
    #[must_use]
    pub fn is_engaged(&self) -> bool {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Current pause reason
    #[must_use]
    pub fn reason(&self) -> Option<PauseReason> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

// ============================================================================
// Effort Centre Requests
// ============================================================================

/// Where the operator wants the effort centre
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum CentreTarget {
    /// The controller's current smoothed attention
    Average,
    /// An explicit attention level
    Value(f64),
}

/// Pending operator re-centre, consumed by the control loop on its next tick.
///
/// Only the latest request is kept.
#[derive(Debug, Default)]
pub struct CentreRequest {
    pending: Mutex<Option<CentreTarget>>,
}

impl CentreRequest {
    /// Queue a re-centre, replacing any request not yet consumed
    pub fn request(&self, target: CentreTarget) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(target);
    }

    /// Take the pending request, if any
    pub fn take(&self) -> Option<CentreTarget> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Cooperative cancellation flag shared by loops and their owner.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create an uncancelled token
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking every [`CANCEL_POLL`] to re-check the flag.
    ///
    /// Returns `false` if cancelled before the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(CANCEL_POLL));
        }
    }
}
