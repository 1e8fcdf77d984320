//! Pipeline configuration
//!
//! Every constant the controllers disagree on (smoothing window, confidence
//! floor, quality ceilings, feature masking) lives here. Files are TOML and
//! every section is optional; durations are in milliseconds.
//!
//! ```toml
//! acceptance_quality = 50
//! gate_ceiling = 120
//!
//! [smoothing]
//! mode = "window"
//! size = 3
//!
//! [decider]
//! kind = "classifier"
//! model_path = "model.json"
//! confidence_floor = 0.35
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use neurocursor_core::types::{LabelSet, SignalQuality};
use serde::{Deserialize, Serialize};

use crate::decision::{
    ClassifierDecider, DebounceConfig, EffortConfig, EffortController, QualityGate,
    ThresholdDecider, ThresholdRule,
};
use crate::error::{ConfigError, ConfigResult};
use crate::ml::classifier::ModelDescriptor;
use crate::ml::features::FeatureConfig;
use crate::ml::softmax::SoftmaxModel;
use crate::processing::calibration::CalibrationConfig;
use crate::processing::smoother::SmoothingMode;
use crate::session::control::Controller;

/// Largest smoothing or debounce window accepted from configuration
pub const MAX_WINDOW: usize = 64;

// ============================================================================
// Decider Selection
// ============================================================================

/// Built-in threshold rule sets
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePreset {
    /// Deviations from the calibrated baseline
    #[default]
    Relative,
    /// Absolute eSense levels
    Absolute,
}

impl RulePreset {
    /// Rules of this preset, in priority order
    #[must_use]
    pub fn rules(self) -> Vec<ThresholdRule> {
        match self {
            Self::Relative => ThresholdRule::relative_preset(),
            Self::Absolute => ThresholdRule::absolute_preset(),
        }
    }
}

/// Which decision stage to run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeciderConfig {
    /// Ordered rules
    Threshold {
        /// Preset used when `rules` is empty
        #[serde(default)]
        preset: RulePreset,
        /// Explicit rules, highest priority first
        #[serde(default)]
        rules: Vec<ThresholdRule>,
    },
    /// Trained classifier with a confidence floor
    Classifier {
        /// Softmax model JSON file
        model_path: PathBuf,
        /// Minimum arg-max probability to act on
        #[serde(default = "default_confidence_floor")]
        confidence_floor: f64,
    },
    /// Continuous effort drive (see `[effort]`)
    Effort,
}

const fn default_confidence_floor() -> f64 {
    0.35
}

impl Default for DeciderConfig {
    fn default() -> Self {
        Self::Threshold { preset: RulePreset::Relative, rules: Vec::new() }
    }
}

impl DeciderConfig {
    /// Threshold rules in force (None for other deciders)
    #[must_use]
    pub fn threshold_rules(&self) -> Option<Vec<ThresholdRule>> {
        match self {
            Self::Threshold { preset, rules } if rules.is_empty() => Some(preset.rules()),
            Self::Threshold { rules, .. } => Some(rules.clone()),
            _ => None,
        }
    }
}

// ============================================================================
// Pipeline Configuration
// ============================================================================

/// Complete pipeline configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worst quality whose samples enter smoothing
    pub acceptance_quality: u16,
    /// Worst quality the deciders act on
    pub gate_ceiling: u16,
    /// Sample silence that counts as a data gap (ms)
    pub liveness_timeout_ms: u64,
    /// Control loop cadence (ms)
    pub tick_interval_ms: u64,
    /// Labels this deployment may emit
    pub labels: LabelSet,
    /// Per-channel smoothing
    pub smoothing: SmoothingMode,
    /// Baseline calibration
    pub calibration: CalibrationConfig,
    /// Feature derivation
    pub features: FeatureConfig,
    /// Decision stage
    pub decider: DeciderConfig,
    /// Debouncing
    pub debounce: DebounceConfig,
    /// Effort controller
    pub effort: EffortConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            acceptance_quality: 50,
            gate_ceiling: 120,
            liveness_timeout_ms: 5000,
            tick_interval_ms: 150,
            labels: LabelSet::ALL,
            smoothing: SmoothingMode::default(),
            calibration: CalibrationConfig::default(),
            features: FeatureConfig::default(),
            decider: DeciderConfig::default(),
            debounce: DebounceConfig::default(),
            effort: EffortConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse TOML text and validate it
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file. A relative model path is resolved against the
    /// file's directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`PipelineConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let mut config = Self::from_toml_str(&text)?;

        if let DeciderConfig::Classifier { model_path, .. } = &mut config.decider {
            if model_path.is_relative() {
                if let Some(dir) = path.parent() {
                    *model_path = dir.join(&*model_path);
                }
            }
        }
        tracing::debug!("Loaded config {}", path.display());
        Ok(config)
    }

    /// Serialize as TOML
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be represented in TOML.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Check value ranges and cross-field consistency
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> ConfigResult<()> {
        match self.smoothing {
            SmoothingMode::Window { size } if !(1..=MAX_WINDOW).contains(&size) => {
                return Err(invalid(
                    "smoothing.size",
                    format!("{size} is outside 1..={MAX_WINDOW}"),
                ));
            }
            SmoothingMode::Ema { alpha } if !(alpha > 0.0 && alpha <= 1.0) => {
                return Err(invalid("smoothing.alpha", format!("{alpha} is outside (0, 1]")));
            }
            _ => {}
        }
        if self.liveness_timeout_ms == 0 {
            return Err(invalid("liveness_timeout_ms", "must be positive"));
        }
        if self.tick_interval_ms == 0 {
            return Err(invalid("tick_interval_ms", "must be positive"));
        }
        if self.calibration.duration_ms == 0 || self.calibration.poll_interval_ms == 0 {
            return Err(invalid("calibration", "duration and poll interval must be positive"));
        }
        if self.calibration.channels.is_empty() {
            return Err(invalid("calibration.channels", "at least one channel is required"));
        }
        if !(1..=MAX_WINDOW).contains(&self.debounce.window) {
            return Err(invalid(
                "debounce.window",
                format!("{} is outside 1..={MAX_WINDOW}", self.debounce.window),
            ));
        }
        if !(self.effort.ema_alpha > 0.0 && self.effort.ema_alpha <= 1.0) {
            return Err(invalid("effort.ema_alpha", "must be in (0, 1]"));
        }
        if self.effort.left_gain < 0.0 || self.effort.right_gain < 0.0 {
            return Err(invalid("effort", "gains must be non-negative"));
        }

        match &self.decider {
            DeciderConfig::Classifier { confidence_floor, .. }
                if !(0.0..=1.0).contains(confidence_floor) =>
            {
                return Err(invalid(
                    "decider.confidence_floor",
                    format!("{confidence_floor} is outside [0, 1]"),
                ));
            }
            _ => {}
        }
        if let Some(rule) = self
            .decider
            .threshold_rules()
            .unwrap_or_default()
            .iter()
            .find(|r| !self.labels.contains(r.label))
        {
            return Err(invalid("decider.rules", format!("{} is not in the label set", rule.label)));
        }
        Ok(())
    }

    /// Sample acceptance ceiling
    #[must_use]
    pub const fn acceptance(&self) -> SignalQuality {
        SignalQuality::new(self.acceptance_quality)
    }

    /// Decider quality gate
    #[must_use]
    pub const fn gate(&self) -> QualityGate {
        QualityGate::new(SignalQuality::new(self.gate_ceiling))
    }

    /// Liveness window
    #[must_use]
    pub const fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    /// Control loop cadence
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Build the configured decision stage, loading a model if needed
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Model`] if the model cannot be loaded or uses
    /// labels outside the label set.
    pub fn build_controller(&self) -> ConfigResult<Controller> {
        Ok(match &self.decider {
            DeciderConfig::Threshold { .. } => {
                let rules = self.decider.threshold_rules().unwrap_or_default();
                Controller::Discrete(Box::new(ThresholdDecider::new(rules, self.gate())))
            }
            DeciderConfig::Classifier { model_path, confidence_floor } => {
                let model = SoftmaxModel::load(model_path)?;
                let descriptor = ModelDescriptor::new(Arc::new(model), self.labels)?;
                Controller::Discrete(Box::new(ClassifierDecider::new(
                    descriptor,
                    *confidence_floor,
                    self.gate(),
                )))
            }
            DeciderConfig::Effort => Controller::Effort(EffortController::new(self.effort.clone())),
        })
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field, reason: reason.into() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurocursor_core::types::IntentLabel;
    use std::io::Write;

    #[test]
    fn test_empty_file_is_default() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.tick_interval(), Duration::from_millis(150));
        assert_eq!(config.decider.threshold_rules(), Some(ThresholdRule::relative_preset()));
    }

    #[test]
    fn test_sections_parse() {
        let text = r#"
            gate_ceiling = 100
            labels = ["LEFT", "RIGHT", "UP", "DOWN", "CLICK"]

            [smoothing]
            mode = "ema"
            alpha = 0.2

            [features]
            dominant_masking = true

            [debounce]
            window = 5

            [decider]
            kind = "threshold"
            preset = "absolute"
        "#;
        let config = PipelineConfig::from_toml_str(text).unwrap();
        assert_eq!(config.smoothing, SmoothingMode::Ema { alpha: 0.2 });
        assert!(config.features.dominant_masking);
        assert_eq!(config.debounce.window, 5);
        assert_eq!(config.debounce.cooldown_ticks, 3);
        assert_eq!(config.labels, LabelSet::ALL);
        assert_eq!(config.decider.threshold_rules(), Some(ThresholdRule::absolute_preset()));
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = PipelineConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(PipelineConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_validation() {
        let err = PipelineConfig::from_toml_str("[smoothing]\nmode = \"window\"\nsize = 0\n");
        assert!(matches!(err, Err(ConfigError::Invalid { field: "smoothing.size", .. })));

        let err = PipelineConfig::from_toml_str(
            "[decider]\nkind = \"classifier\"\nmodel_path = \"m.json\"\nconfidence_floor = 1.5\n",
        );
        assert!(matches!(err, Err(ConfigError::Invalid { field: "decider.confidence_floor", .. })));

        // The relative preset emits CLICK, which this label set excludes
        let err = PipelineConfig::from_toml_str("labels = [\"LEFT\", \"RIGHT\"]\n");
        assert!(matches!(err, Err(ConfigError::Invalid { field: "decider.rules", .. })));

        assert!(matches!(
            PipelineConfig::from_toml_str("gate_ceiling = \"x\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_oversized_windows_rejected() {
        let err = PipelineConfig::from_toml_str("[smoothing]\nmode = \"window\"\nsize = 65\n");
        assert!(matches!(err, Err(ConfigError::Invalid { field: "smoothing.size", .. })));

        // Would otherwise reach VecDeque::with_capacity
        let err = PipelineConfig::from_toml_str("[debounce]\nwindow = 1000000000000\n");
        assert!(matches!(err, Err(ConfigError::Invalid { field: "debounce.window", .. })));

        let at_limit = format!(
            "[smoothing]\nmode = \"window\"\nsize = {MAX_WINDOW}\n[debounce]\nwindow = {MAX_WINDOW}\n"
        );
        assert!(PipelineConfig::from_toml_str(&at_limit).is_ok());
    }

    #[test]
    fn test_load_resolves_model_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("model.json"),
            r#"{"feature_names": ["attention"], "classes": ["UP", "IDLE"],
                "weights": [[1.0], [0.0]], "bias": [0.0, 0.0]}"#,
        )
        .unwrap();
        let config_path = dir.path().join("pipeline.toml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "[decider]\nkind = \"classifier\"\nmodel_path = \"model.json\"").unwrap();

        let config = PipelineConfig::load(&config_path).unwrap();
        let DeciderConfig::Classifier { model_path, confidence_floor } = &config.decider else {
            panic!("expected classifier decider");
        };
        assert_eq!(model_path, &dir.path().join("model.json"));
        assert!((confidence_floor - 0.35).abs() < 1e-12);

        let controller = config.build_controller().unwrap();
        assert!(matches!(controller, Controller::Discrete(d) if d.name() == "classifier"));
    }

    #[test]
    fn test_model_with_excluded_label_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.json");
        std::fs::write(
            &model_path,
            r#"{"feature_names": ["attention"], "classes": ["CLICK", "IDLE"],
                "weights": [[1.0], [0.0]], "bias": [0.0, 0.0]}"#,
        )
        .unwrap();
        let config = PipelineConfig {
            labels: LabelSet::DIRECTIONS,
            decider: DeciderConfig::Classifier { model_path, confidence_floor: 0.5 },
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.build_controller(),
            Err(ConfigError::Model(crate::error::ModelError::LabelNotAllowed(IntentLabel::Click)))
        ));
    }
}
