//! Intent decision stages
//!
//! - [`threshold`]: Ordered rule set over named features
//! - [`classifier`]: Confidence-floored classifier decisions
//! - [`debounce`]: Majority vote with discrete-action clearing
//! - [`effort`]: Continuous attention-effort drive
//!
//! Both discrete deciders share one contract, [`IntentDecider`], and the
//! same [`QualityGate`]: a tick whose signal quality is worse than the gate
//! ceiling is IDLE before any feature is looked at.

pub mod classifier;
pub mod debounce;
pub mod effort;
pub mod threshold;

use neurocursor_core::types::{Intent, SignalQuality};

use crate::error::DecisionResult;
use crate::ml::features::FeatureVector;

pub use classifier::ClassifierDecider;
pub use debounce::{DebounceConfig, Debouncer, Stabilized};
pub use effort::{movement_step, EffortConfig, EffortController, EffortOutput};
pub use threshold::{Comparison, ThresholdDecider, ThresholdRule};

/// Hard signal-quality ceiling applied before any decision
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QualityGate {
    ceiling: SignalQuality,
}

impl QualityGate {
    /// Create a gate admitting quality at or below `ceiling`
    #[must_use]
    pub const fn new(ceiling: SignalQuality) -> Self {
        Self { ceiling }
    }

    /// Gate ceiling
    #[must_use]
    pub const fn ceiling(self) -> SignalQuality {
        self.ceiling
    }

    /// Check if a tick at `quality` may be decided on
    #[inline]
    #[must_use]
    pub const fn admits(self, quality: SignalQuality) -> bool {
        quality.within(self.ceiling)
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(SignalQuality::new(120))
    }
}

/// Maps a feature vector and signal quality to an intent.
pub trait IntentDecider: Send {
    /// Short variant name for logs
    fn name(&self) -> &'static str;

    /// Quality gate this decider applies
    fn gate(&self) -> QualityGate;

    /// Decide from features alone; callers go through [`IntentDecider::decide`]
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::DecisionError`] when no decision can be made.
    fn evaluate(&self, features: &FeatureVector) -> DecisionResult<Intent>;

    /// Gate on quality, then evaluate.
    ///
    /// # Errors
    ///
    /// As [`IntentDecider::evaluate`]; a gated tick never errors.
    fn decide(&self, features: &FeatureVector, quality: SignalQuality) -> DecisionResult<Intent> {
        if !self.gate().admits(quality) {
            return Ok(Intent::idle());
        }
        self.evaluate(features)
    }
}
