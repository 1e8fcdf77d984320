//! Classifier-backed intent decisions

use neurocursor_core::types::{Intent, IntentLabel};

use crate::decision::{IntentDecider, QualityGate};
use crate::error::DecisionResult;
use crate::ml::classifier::ModelDescriptor;
use crate::ml::features::FeatureVector;

/// Arg-max decider with a confidence floor.
///
/// The arg-max label is emitted only when its probability is at or above
/// the floor; anything less is IDLE.
#[derive(Clone, Debug)]
pub struct ClassifierDecider {
    model: ModelDescriptor,
    confidence_floor: f64,
    gate: QualityGate,
}

impl ClassifierDecider {
    /// Create a decider. The floor is clamped into `[0, 1]`.
    #[must_use]
    pub fn new(model: ModelDescriptor, confidence_floor: f64, gate: QualityGate) -> Self {
        let missing = model.missing_features();
        if !missing.is_empty() {
            tracing::warn!("Model expects features the deriver does not produce: {:?}", missing);
        }
        Self { model, confidence_floor: confidence_floor.clamp(0.0, 1.0), gate }
    }

    /// Model in use
    #[must_use]
    pub const fn model(&self) -> &ModelDescriptor {
        &self.model
    }

    /// Confidence floor in force
    #[must_use]
    pub const fn confidence_floor(&self) -> f64 {
        self.confidence_floor
    }
}

impl IntentDecider for ClassifierDecider {
    fn name(&self) -> &'static str {
        "classifier"
    }

    fn gate(&self) -> QualityGate {
        self.gate
    }

    fn evaluate(&self, features: &FeatureVector) -> DecisionResult<Intent> {
        let probabilities = self.model.predict(features)?;
        tracing::trace!("Probabilities: {}", probabilities);

        Ok(match probabilities.argmax() {
            Some((label, p)) if p >= self.confidence_floor => Intent::new(label, p),
            _ => Intent::certain(IntentLabel::Idle),
        })
    }
}
