//! Linear softmax classifier loaded from JSON
//!
//! The model file carries everything inference needs: the ordered feature
//! names, the class labels, the standard-scaler parameters fitted at
//! training time, and one weight row plus bias per class.
//!
//! ```json
//! {
//!   "feature_names": ["attention", "meditation", "beta_alpha_ratio"],
//!   "classes": ["LEFT", "RIGHT", "IDLE"],
//!   "scaler": { "mean": [50.0, 50.0, 1.0], "scale": [20.0, 20.0, 0.5] },
//!   "weights": [[0.1, -0.2, -1.0], [0.0, 0.1, 1.5], [0.0, 0.0, 0.0]],
//!   "bias": [0.0, 0.0, 0.3]
//! }
//! ```

use std::path::Path;

use neurocursor_core::types::IntentLabel;
use serde::{Deserialize, Serialize};

use crate::error::{DecisionError, DecisionResult, ModelError, ModelResult};
use crate::ml::classifier::{ClassProbabilities, Classifier};

/// Standard-scaler parameters: `z = (x - mean) / scale`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    /// Per-feature mean
    pub mean: Vec<f64>,
    /// Per-feature scale (standard deviation)
    pub scale: Vec<f64>,
}

#[derive(Deserialize)]
struct ModelFile {
    feature_names: Vec<String>,
    classes: Vec<String>,
    #[serde(default)]
    scaler: Option<Scaler>,
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

/// Multinomial logistic regression over scaled features
#[derive(Clone, Debug, PartialEq)]
pub struct SoftmaxModel {
    feature_names: Vec<String>,
    labels: Vec<IntentLabel>,
    scaler: Option<Scaler>,
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

impl SoftmaxModel {
    /// Parse and validate a model from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] for malformed JSON, unknown labels, mismatched
    /// array lengths, or a zero scale entry.
    pub fn from_json_str(text: &str) -> ModelResult<Self> {
        let file: ModelFile = serde_json::from_str(text)?;
        Self::from_file(file)
    }

    /// Load a model from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Io`] if the file cannot be read, otherwise as
    /// [`SoftmaxModel::from_json_str`].
    pub fn load(path: impl AsRef<Path>) -> ModelResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ModelError::Io { path: path.to_path_buf(), source })?;
        let model = Self::from_json_str(&text)?;
        tracing::info!(
            "Loaded model {}: {} features, classes {:?}",
            path.display(),
            model.feature_names.len(),
            model.labels
        );
        Ok(model)
    }

    fn from_file(file: ModelFile) -> ModelResult<Self> {
        let n_features = file.feature_names.len();
        let n_classes = file.classes.len();
        if n_features == 0 {
            return Err(ModelError::Empty("features"));
        }
        if n_classes == 0 {
            return Err(ModelError::Empty("classes"));
        }

        let labels = file
            .classes
            .iter()
            .map(|c| c.parse::<IntentLabel>().map_err(|_| ModelError::UnknownLabel(c.clone())))
            .collect::<ModelResult<Vec<_>>>()?;

        check_len("weights", file.weights.len(), n_classes)?;
        for row in &file.weights {
            check_len("weight row", row.len(), n_features)?;
        }
        check_len("bias", file.bias.len(), n_classes)?;

        if let Some(scaler) = &file.scaler {
            check_len("scaler mean", scaler.mean.len(), n_features)?;
            check_len("scaler scale", scaler.scale.len(), n_features)?;
            if let Some(i) = scaler.scale.iter().position(|s| *s == 0.0 || !s.is_finite()) {
                return Err(ModelError::DegenerateScale { feature: file.feature_names[i].clone() });
            }
        }

        Ok(Self {
            feature_names: file.feature_names,
            labels,
            scaler: file.scaler,
            weights: file.weights,
            bias: file.bias,
        })
    }

    fn logits(&self, features: &[f64]) -> Vec<f64> {
        let scaled: Vec<f64> = match &self.scaler {
            Some(s) => features
                .iter()
                .zip(s.mean.iter().zip(&s.scale))
                .map(|(x, (m, sd))| (x - m) / sd)
                .collect(),
            None => features.to_vec(),
        };
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(&scaled).map(|(w, z)| w * z).sum::<f64>() + b)
            .collect()
    }
}

fn check_len(what: &'static str, got: usize, expected: usize) -> ModelResult<()> {
    if got == expected {
        Ok(())
    } else {
        Err(ModelError::Shape { what, got, expected })
    }
}

impl Classifier for SoftmaxModel {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn labels(&self) -> &[IntentLabel] {
        &self.labels
    }

    fn predict_probabilities(&self, features: &[f64]) -> DecisionResult<ClassProbabilities> {
        if features.len() != self.feature_names.len() {
            return Err(DecisionError::Classifier {
                reason: format!(
                    "expected {} features, got {}",
                    self.feature_names.len(),
                    features.len()
                ),
            });
        }

        let logits = self.logits(features);
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return Err(DecisionError::Classifier { reason: "non-finite logits".into() });
        }
        let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f64 = exps.iter().sum();

        Ok(ClassProbabilities::new(
            self.labels.iter().copied().zip(exps.into_iter().map(|e| e / total)).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MODEL: &str = r#"{
        "feature_names": ["attention", "beta_alpha_ratio"],
        "classes": ["UP", "IDLE"],
        "scaler": { "mean": [50.0, 1.0], "scale": [10.0, 1.0] },
        "weights": [[2.0, 0.0], [0.0, 0.0]],
        "bias": [0.0, 0.0]
    }"#;

    #[test]
    fn test_probabilities_sum_to_one() {
        let model = SoftmaxModel::from_json_str(MODEL).unwrap();
        let probs = model.predict_probabilities(&[50.0, 1.0]).unwrap();
        assert!((probs.get(IntentLabel::Up) - 0.5).abs() < 1e-12);
        assert!((probs.get(IntentLabel::Idle) - 0.5).abs() < 1e-12);

        // z = 3 → logit 6 for UP
        let probs = model.predict_probabilities(&[80.0, 1.0]).unwrap();
        let expected = 6.0f64.exp() / (6.0f64.exp() + 1.0);
        assert!((probs.get(IntentLabel::Up) - expected).abs() < 1e-12);
        let total: f64 = probs.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_wrong_width_is_classifier_error() {
        let model = SoftmaxModel::from_json_str(MODEL).unwrap();
        assert!(matches!(
            model.predict_probabilities(&[1.0]),
            Err(DecisionError::Classifier { .. })
        ));
    }

    #[test]
    fn test_validation_errors() {
        let bad_label = MODEL.replace("\"UP\"", "\"JUMP\"");
        assert!(matches!(
            SoftmaxModel::from_json_str(&bad_label),
            Err(ModelError::UnknownLabel(l)) if l == "JUMP"
        ));

        let bad_bias = MODEL.replace("\"bias\": [0.0, 0.0]", "\"bias\": [0.0]");
        assert!(matches!(
            SoftmaxModel::from_json_str(&bad_bias),
            Err(ModelError::Shape { what: "bias", got: 1, expected: 2 })
        ));

        let zero_scale = MODEL.replace("[10.0, 1.0]", "[10.0, 0.0]");
        assert!(matches!(
            SoftmaxModel::from_json_str(&zero_scale),
            Err(ModelError::DegenerateScale { feature }) if feature == "beta_alpha_ratio"
        ));

        assert!(matches!(SoftmaxModel::from_json_str("{"), Err(ModelError::Json(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MODEL.as_bytes()).unwrap();

        let model = SoftmaxModel::load(file.path()).unwrap();
        assert_eq!(model.labels(), &[IntentLabel::Up, IntentLabel::Idle]);

        let missing = SoftmaxModel::load("/nonexistent/model.json");
        assert!(matches!(missing, Err(ModelError::Io { .. })));
    }
}
