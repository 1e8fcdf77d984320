//! Rule-based intent decisions
//!
//! Rules are evaluated in priority order and the first match wins. All
//! comparisons are strict, so a feature sitting exactly on a boundary does
//! not fire. Rule decisions carry full confidence.

use neurocursor_core::types::{Channel, Intent, IntentLabel};
use serde::{Deserialize, Serialize};

use crate::decision::{IntentDecider, QualityGate};
use crate::error::DecisionResult;
use crate::ml::features::{Feature, FeatureVector};

/// How a rule compares its feature with the threshold
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// feature > value
    Above,
    /// feature < value
    Below,
    /// |feature| > value
    AbsAbove,
}

/// One decision rule
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    /// Feature tested
    pub feature: Feature,
    /// Comparison
    pub op: Comparison,
    /// Threshold
    pub value: f64,
    /// Label emitted on match
    pub label: IntentLabel,
}

impl ThresholdRule {
    /// Create a rule
    #[must_use]
    pub const fn new(feature: Feature, op: Comparison, value: f64, label: IntentLabel) -> Self {
        Self { feature, op, value, label }
    }

    /// Check if the rule fires on `features`
    #[must_use]
    pub fn matches(&self, features: &FeatureVector) -> bool {
        let x = features.get(self.feature);
        match self.op {
            Comparison::Above => x > self.value,
            Comparison::Below => x < self.value,
            Comparison::AbsAbove => x.abs() > self.value,
        }
    }

    /// Baseline-deviation rules: blink, attention/meditation margins, band dominance
    #[must_use]
    pub fn relative_preset() -> Vec<Self> {
        vec![
            Self::new(Feature::RawInstant, Comparison::AbsAbove, 1500.0, IntentLabel::Click),
            Self::new(Feature::NormAttention, Comparison::Above, 40.0, IntentLabel::Up),
            Self::new(Feature::NormMeditation, Comparison::Above, 40.0, IntentLabel::Down),
            Self::new(Feature::BetaAlphaRatio, Comparison::Above, 1.5, IntentLabel::Right),
            Self::new(Feature::BetaAlphaRatio, Comparison::Below, 0.5, IntentLabel::Left),
        ]
    }

    /// Absolute eSense thresholds used with TGAM line transports
    #[must_use]
    pub fn absolute_preset() -> Vec<Self> {
        let att = Feature::Base(Channel::Attention);
        let med = Feature::Base(Channel::Meditation);
        vec![
            Self::new(Feature::RawInstant, Comparison::AbsAbove, 1500.0, IntentLabel::Click),
            Self::new(att, Comparison::Above, 70.0, IntentLabel::Up),
            Self::new(med, Comparison::Above, 70.0, IntentLabel::Down),
            Self::new(att, Comparison::Below, 30.0, IntentLabel::Left),
            Self::new(med, Comparison::Below, 30.0, IntentLabel::Right),
        ]
    }
}

/// First-match rule decider
#[derive(Clone, Debug)]
pub struct ThresholdDecider {
    rules: Vec<ThresholdRule>,
    gate: QualityGate,
}

impl ThresholdDecider {
    /// Create a decider from rules in priority order
    #[must_use]
    pub fn new(rules: Vec<ThresholdRule>, gate: QualityGate) -> Self {
        Self { rules, gate }
    }

    /// Rules in priority order
    #[must_use]
    pub fn rules(&self) -> &[ThresholdRule] {
        &self.rules
    }
}

impl IntentDecider for ThresholdDecider {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn gate(&self) -> QualityGate {
        self.gate
    }

    fn evaluate(&self, features: &FeatureVector) -> DecisionResult<Intent> {
        let label = self
            .rules
            .iter()
            .find(|rule| rule.matches(features))
            .map_or(IntentLabel::Idle, |rule| rule.label);
        Ok(Intent::certain(label))
    }
}
