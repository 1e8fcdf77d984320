//! Pipeline Error Types
//!
//! Error types for calibration, decision, model loading and configuration
//! using `thiserror`.
//!
//! Every error here degrades to an inert outcome at the control loop:
//! calibration failures keep the previous baseline, decision failures emit
//! IDLE for that tick, and nothing is allowed to stop the loop.

use std::path::PathBuf;

use neurocursor_core::types::IntentLabel;
use thiserror::Error;

/// Calibration error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalibrationError {
    /// No sample passed the quality threshold during the window
    #[error("Calibration failed: no samples at or below quality {quality_threshold} in {observed} observed")]
    NoAcceptedSamples {
        /// Quality threshold in force
        quality_threshold: u16,
        /// Distinct samples seen (all rejected)
        observed: usize,
    },

    /// The run was cancelled before its window elapsed
    #[error("Calibration cancelled after {accepted} accepted samples")]
    Cancelled {
        /// Samples accepted before cancellation
        accepted: usize,
    },

    /// Another calibration run holds the calibrator
    #[error("A calibration run is already in progress")]
    AlreadyRunning,
}

/// Result type for calibration
pub type CalibrationResult<T> = Result<T, CalibrationError>;

/// Decision error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecisionError {
    /// A classifier needs a feature the deriver does not produce
    #[error("Feature mismatch: model expects {name:?}, which the deriver does not produce")]
    FeatureMismatch {
        /// Missing feature name
        name: String,
    },

    /// The classifier rejected its input or produced unusable output
    #[error("Classifier failed: {reason}")]
    Classifier {
        /// Error reason
        reason: String,
    },
}

/// Result type for decisions
pub type DecisionResult<T> = Result<T, DecisionError>;

/// Model loading and validation error types
#[derive(Error, Debug)]
pub enum ModelError {
    /// Reading the model file failed
    #[error("Failed to read model {path}: {source}")]
    Io {
        /// Model path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Model JSON is malformed
    #[error("Invalid model JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Array dimensions disagree
    #[error("Model shape mismatch: {what} has length {got}, expected {expected}")]
    Shape {
        /// Which array is wrong
        what: &'static str,
        /// Actual length
        got: usize,
        /// Expected length
        expected: usize,
    },

    /// A class label is not an intent label
    #[error("Model class {0:?} is not a known intent label")]
    UnknownLabel(String),

    /// A class label is outside the deployment's label set
    #[error("Model class {0} is not in the configured label set")]
    LabelNotAllowed(IntentLabel),

    /// The model declares no classes or features
    #[error("Model declares no {0}")]
    Empty(&'static str),

    /// A scaler entry would divide by zero
    #[error("Scaler scale for feature {feature:?} is zero or non-finite")]
    DegenerateScale {
        /// Feature name
        feature: String,
    },
}

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading the config file failed
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// Config path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// TOML is malformed or has wrong types
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("Invalid config value {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Why it is invalid
        reason: String,
    },

    /// The configured model could not be loaded
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Result type for configuration
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Fault reported by an action sink.
///
/// Any fault engages the safety interlock; the pipeline stays paused until
/// an operator clears it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActuationFault {
    /// The actuator reached a guarded boundary (e.g. the cursor hit a screen corner)
    #[error("Actuator hit a guarded boundary: {0}")]
    Boundary(String),

    /// The actuator failed outright
    #[error("Actuator failure: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CalibrationError::NoAcceptedSamples { quality_threshold: 100, observed: 12 };
        assert!(err.to_string().contains("quality 100"));

        let err = DecisionError::FeatureMismatch { name: "alpha_power".into() };
        assert!(err.to_string().contains("alpha_power"));

        let err = ModelError::LabelNotAllowed(IntentLabel::Click);
        assert!(err.to_string().contains("CLICK"));
    }
}
