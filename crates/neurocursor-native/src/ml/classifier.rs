//! Classifier capability and its typed descriptor
//!
//! A trained model is consumed through [`Classifier`]: an ordered list of
//! feature names it expects, the labels it can produce, and a probability
//! prediction over those labels. [`ModelDescriptor`] validates a classifier
//! against the deployment's label set once, at load time.

use std::fmt;
use std::sync::Arc;

use neurocursor_core::types::{IntentLabel, LabelSet};

use crate::error::{DecisionResult, ModelError, ModelResult};
use crate::ml::features::{Feature, FeatureVector};

/// Probability per label, in model label order
#[derive(Clone, Debug, PartialEq)]
pub struct ClassProbabilities {
    entries: Vec<(IntentLabel, f64)>,
}

impl ClassProbabilities {
    /// Wrap `(label, probability)` pairs
    #[must_use]
    pub fn new(entries: Vec<(IntentLabel, f64)>) -> Self {
        Self { entries }
    }

    /// Probability of `label` (0 if the model does not produce it)
    #[must_use]
    pub fn get(&self, label: IntentLabel) -> f64 {
        self.entries.iter().find(|(l, _)| *l == label).map_or(0.0, |(_, p)| *p)
    }

    /// Most probable label. Ties go to the label listed first by the model.
    #[must_use]
    pub fn argmax(&self) -> Option<(IntentLabel, f64)> {
        let mut best: Option<(IntentLabel, f64)> = None;
        for &(label, p) in &self.entries {
            if best.map_or(true, |(_, bp)| p > bp) {
                best = Some((label, p));
            }
        }
        best
    }

    /// Iterate pairs in model order
    pub fn iter(&self) -> impl Iterator<Item = (IntentLabel, f64)> + '_ {
        self.entries.iter().copied()
    }
}

impl fmt::Display for ClassProbabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (label, p)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{label}: {:.0}%", p * 100.0)?;
        }
        Ok(())
    }
}

/// A probabilistic intent classifier.
pub trait Classifier: Send + Sync {
    /// Feature names the model expects, in input order
    fn feature_names(&self) -> &[String];

    /// Labels the model can produce, in output order
    fn labels(&self) -> &[IntentLabel];

    /// Predict label probabilities for one input row.
    ///
    /// `features` is ordered as [`Classifier::feature_names`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::DecisionError::Classifier`] if the input is
    /// unusable.
    fn predict_probabilities(&self, features: &[f64]) -> DecisionResult<ClassProbabilities>;
}

/// A classifier checked against the deployment's label set.
#[derive(Clone)]
pub struct ModelDescriptor {
    classifier: Arc<dyn Classifier>,
}

impl ModelDescriptor {
    /// Validate and wrap a classifier.
    ///
    /// # Errors
    ///
    /// - [`ModelError::Empty`] if it declares no features or labels
    /// - [`ModelError::LabelNotAllowed`] if a label is outside `allowed`
    pub fn new(classifier: Arc<dyn Classifier>, allowed: LabelSet) -> ModelResult<Self> {
        if classifier.feature_names().is_empty() {
            return Err(ModelError::Empty("features"));
        }
        if classifier.labels().is_empty() {
            return Err(ModelError::Empty("classes"));
        }
        if let Some(label) = classifier.labels().iter().find(|l| !allowed.contains(**l)) {
            return Err(ModelError::LabelNotAllowed(*label));
        }
        Ok(Self { classifier })
    }

    /// Feature names, in input order
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        self.classifier.feature_names()
    }

    /// Labels, in output order
    #[must_use]
    pub fn labels(&self) -> &[IntentLabel] {
        self.classifier.labels()
    }

    /// Names this deriver cannot produce (empty when compatible)
    #[must_use]
    pub fn missing_features(&self) -> Vec<&str> {
        self.feature_names()
            .iter()
            .map(String::as_str)
            .filter(|n| Feature::from_name(n).is_none())
            .collect()
    }

    /// Select the model's inputs from `features` and predict.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::DecisionError::FeatureMismatch`] for a missing
    /// feature, or whatever the classifier reports.
    pub fn predict(&self, features: &FeatureVector) -> DecisionResult<ClassProbabilities> {
        let row = features.select(self.feature_names())?;
        self.classifier.predict_probabilities(&row)
    }
}

impl fmt::Debug for ModelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDescriptor")
            .field("feature_names", &self.feature_names())
            .field("labels", &self.labels())
            .finish_non_exhaustive()
    }
}
