//! Feature derivation for intent decisions
//!
//! Turns smoothed channel values and the current baseline into the named
//! feature vector consumed by both decider variants. Every derived ratio
//! uses a `+1` denominator guard; a model trained on these features expects
//! exactly that offset, so the formulas here must not drift.
//!
//! Features are laid out in a fixed order: the eleven base channels, the
//! band ratios, the baseline deltas, then the unsmoothed raw value.

use std::fmt;

use neurocursor_core::math::guarded_ratio;
use neurocursor_core::types::{Baseline, Channel, IntentLabel};
use serde::{Deserialize, Serialize};

use crate::error::{DecisionError, DecisionResult};
use crate::processing::smoother::SmoothedChannels;

/// Named feature in formula order
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Feature {
    /// Smoothed channel value
    Base(Channel),
    /// alpha / (theta + 1)
    AlphaThetaRatio,
    /// beta / (alpha + 1)
    BetaAlphaRatio,
    /// beta / (theta + 1)
    BetaThetaRatio,
    /// attention / (meditation + 1)
    EngagementRatio,
    /// gamma / (beta + 1)
    GammaBetaRatio,
    /// gamma / (alpha + 1)
    GammaAlphaRatio,
    /// beta / (alpha + theta + 1)
    FocusIndex,
    /// high beta / (low alpha + 1)
    StressIndex,
    /// attention - baseline attention
    NormAttention,
    /// meditation - baseline meditation
    NormMeditation,
    /// alpha - baseline alpha
    NormAlpha,
    /// beta - baseline beta
    NormBeta,
    /// Raw channel of the latest accepted sample, never smoothed or masked
    RawInstant,
}

const DERIVED: [Feature; 13] = [
    Feature::AlphaThetaRatio,
    Feature::BetaAlphaRatio,
    Feature::BetaThetaRatio,
    Feature::EngagementRatio,
    Feature::GammaBetaRatio,
    Feature::GammaAlphaRatio,
    Feature::FocusIndex,
    Feature::StressIndex,
    Feature::NormAttention,
    Feature::NormMeditation,
    Feature::NormAlpha,
    Feature::NormBeta,
    Feature::RawInstant,
];

impl Feature {
    /// Number of features
    pub const COUNT: usize = Channel::COUNT + DERIVED.len();

    /// All features in formula order
    pub fn all() -> impl Iterator<Item = Self> {
        Channel::ALL.into_iter().map(Self::Base).chain(DERIVED)
    }

    /// Position in the feature vector
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Base(channel) => channel.index(),
            derived => {
                Channel::COUNT + DERIVED.iter().position(|d| *d == derived).unwrap_or_default()
            }
        }
    }

    /// Feature name as used by trained models
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Base(channel) => channel.name(),
            Self::AlphaThetaRatio => "alpha_theta_ratio",
            Self::BetaAlphaRatio => "beta_alpha_ratio",
            Self::BetaThetaRatio => "beta_theta_ratio",
            Self::EngagementRatio => "engagement_ratio",
            Self::GammaBetaRatio => "gamma_beta_ratio",
            Self::GammaAlphaRatio => "gamma_alpha_ratio",
            Self::FocusIndex => "focus_index",
            Self::StressIndex => "stress_index",
            Self::NormAttention => "norm_att",
            Self::NormMeditation => "norm_med",
            Self::NormAlpha => "norm_alpha",
            Self::NormBeta => "norm_beta",
            Self::RawInstant => "raw_instant",
        }
    }

    /// Look up a feature by name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().find(|f| f.name() == name)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<String> for Feature {
    type Error = DecisionError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::from_name(&name).ok_or(DecisionError::FeatureMismatch { name })
    }
}

impl From<Feature> for String {
    fn from(feature: Feature) -> Self {
        feature.name().to_owned()
    }
}

/// Derived feature values for one tick
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureVector {
    values: [f64; Feature::COUNT],
    dominant: Option<IntentLabel>,
}

impl FeatureVector {
    /// Get one feature
    #[inline]
    #[must_use]
    pub fn get(&self, feature: Feature) -> f64 {
        self.values[feature.index()]
    }

    /// Get one feature by name
    ///
    /// # Errors
    ///
    /// Returns [`DecisionError::FeatureMismatch`] for an unknown name.
    pub fn get_by_name(&self, name: &str) -> DecisionResult<f64> {
        Feature::from_name(name)
            .map(|f| self.get(f))
            .ok_or_else(|| DecisionError::FeatureMismatch { name: name.to_owned() })
    }

    /// Project onto an ordered list of feature names.
    ///
    /// # Errors
    ///
    /// Returns [`DecisionError::FeatureMismatch`] on the first name this
    /// deriver does not produce. Missing features are never zero-filled.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> DecisionResult<Vec<f64>> {
        names.iter().map(|n| self.get_by_name(n.as_ref())).collect()
    }

    /// All values in formula order
    #[must_use]
    pub const fn as_slice(&self) -> &[f64; Feature::COUNT] {
        &self.values
    }

    /// Dominant group chosen by masking (None when masking is off)
    #[must_use]
    pub const fn dominant(&self) -> Option<IntentLabel> {
        self.dominant
    }

    /// `(name, value)` pairs in formula order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        Feature::all().map(|f| (f.name(), self.get(f)))
    }
}

/// Dominant-signal masking settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Keep only the most elevated channel group before deriving
    pub dominant_masking: bool,
    /// Elevation below which no group dominates
    pub idle_margin: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self { dominant_masking: false, idle_margin: 5.0 }
    }
}

/// Stateless feature deriver
#[derive(Clone, Debug, Default)]
pub struct FeatureDeriver {
    config: FeatureConfig,
}

/// Channel groups a masked vector may keep, in tie-break order
const GROUPS: [(IntentLabel, &[Channel]); 4] = [
    (IntentLabel::Up, &[Channel::Attention]),
    (IntentLabel::Down, &[Channel::Meditation]),
    (IntentLabel::Left, &[Channel::LowAlpha, Channel::HighAlpha]),
    (IntentLabel::Right, &[Channel::LowBeta, Channel::HighBeta]),
];

impl FeatureDeriver {
    /// Create a deriver
    #[must_use]
    pub const fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    /// Configuration in force
    #[must_use]
    pub const fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Derive the feature vector. Pure: identical inputs give identical output.
    #[must_use]
    pub fn derive(&self, smoothed: &SmoothedChannels, baseline: &Baseline) -> FeatureVector {
        let (channels, dominant) = if self.config.dominant_masking {
            let dominant = self.dominant_group(smoothed, baseline);
            (mask(smoothed, dominant), Some(dominant))
        } else {
            (smoothed.clone(), None)
        };

        let keeps = |label: IntentLabel| match dominant {
            None | Some(IntentLabel::Idle) => true,
            Some(d) => d == label,
        };

        let att = channels.channel(Channel::Attention);
        let med = channels.channel(Channel::Meditation);
        let theta = channels.channel(Channel::Theta);
        let (alpha, beta, gamma) = (channels.alpha(), channels.beta(), channels.gamma());

        let mut values = [0.0; Feature::COUNT];
        values[..Channel::COUNT].copy_from_slice(&channels.values);

        let mut set = |feature: Feature, value: f64| values[feature.index()] = value;
        set(Feature::AlphaThetaRatio, guarded_ratio(alpha, theta));
        set(Feature::BetaAlphaRatio, guarded_ratio(beta, alpha));
        set(Feature::BetaThetaRatio, guarded_ratio(beta, theta));
        set(Feature::EngagementRatio, guarded_ratio(att, med));
        set(Feature::GammaBetaRatio, guarded_ratio(gamma, beta));
        set(Feature::GammaAlphaRatio, guarded_ratio(gamma, alpha));
        set(Feature::FocusIndex, guarded_ratio(beta, alpha + theta));
        set(
            Feature::StressIndex,
            guarded_ratio(channels.channel(Channel::HighBeta), channels.channel(Channel::LowAlpha)),
        );

        if keeps(IntentLabel::Up) {
            set(Feature::NormAttention, att - baseline.channel(Channel::Attention));
        }
        if keeps(IntentLabel::Down) {
            set(Feature::NormMeditation, med - baseline.channel(Channel::Meditation));
        }
        if keeps(IntentLabel::Left) {
            set(Feature::NormAlpha, alpha - baseline.alpha());
        }
        if keeps(IntentLabel::Right) {
            set(Feature::NormBeta, beta - baseline.beta());
        }

        set(Feature::RawInstant, smoothed.latest_raw);

        FeatureVector { values, dominant }
    }

    /// Most elevated group relative to baseline, or IDLE below the margin
    fn dominant_group(&self, smoothed: &SmoothedChannels, baseline: &Baseline) -> IntentLabel {
        let mut best = (IntentLabel::Idle, f64::NEG_INFINITY);
        for (label, channels) in GROUPS {
            let elevation: f64 = channels
                .iter()
                .map(|c| smoothed.channel(*c) - baseline.channel(*c))
                .sum();
            if elevation > best.1 {
                best = (label, elevation);
            }
        }
        if best.1 < self.config.idle_margin {
            IntentLabel::Idle
        } else {
            best.0
        }
    }
}

/// Keep the dominant group (all four groups for IDLE), zero everything else
fn mask(smoothed: &SmoothedChannels, dominant: IntentLabel) -> SmoothedChannels {
    let mut out = SmoothedChannels::default();
    for (label, channels) in GROUPS {
        if dominant == IntentLabel::Idle || dominant == label {
            for c in channels {
                out.values[c.index()] = smoothed.channel(*c);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn smoothed() -> SmoothedChannels {
        SmoothedChannels::default()
            .with_channel(Channel::Attention, 60.0)
            .with_channel(Channel::Meditation, 39.0)
            .with_channel(Channel::Theta, 999.0)
            .with_channel(Channel::LowAlpha, 400.0)
            .with_channel(Channel::HighAlpha, 600.0)
            .with_channel(Channel::LowBeta, 1500.0)
            .with_channel(Channel::HighBeta, 501.0)
            .with_channel(Channel::LowGamma, 100.0)
            .with_channel(Channel::MidGamma, 100.0)
    }

    #[test]
    fn test_feature_order_and_names() {
        let names: Vec<&str> = Feature::all().map(Feature::name).collect();
        assert_eq!(names.len(), Feature::COUNT);
        assert_eq!(names[0], "attention");
        assert_eq!(names[Channel::COUNT], "alpha_theta_ratio");
        assert_eq!(names[Feature::COUNT - 2], "norm_beta");
        assert_eq!(*names.last().unwrap(), "raw_instant");
        for (i, f) in Feature::all().enumerate() {
            assert_eq!(f.index(), i);
            assert_eq!(Feature::from_name(f.name()), Some(f));
        }
    }

    #[test]
    fn test_guarded_ratios() {
        let v = FeatureDeriver::default().derive(&smoothed(), &Baseline::default());
        assert!((v.get(Feature::AlphaThetaRatio) - 1.0).abs() < 1e-12);
        assert!((v.get(Feature::BetaAlphaRatio) - 2001.0 / 1001.0).abs() < 1e-12);
        assert!((v.get(Feature::BetaThetaRatio) - 2001.0 / 1000.0).abs() < 1e-12);
        assert!((v.get(Feature::EngagementRatio) - 1.5).abs() < 1e-12);
        assert!((v.get(Feature::GammaBetaRatio) - 200.0 / 2002.0).abs() < 1e-12);
        assert!((v.get(Feature::FocusIndex) - 2001.0 / 2000.0).abs() < 1e-12);
        assert!((v.get(Feature::StressIndex) - 501.0 / 401.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_denominators_are_finite() {
        let v = FeatureDeriver::default().derive(&SmoothedChannels::default(), &Baseline::default());
        assert!(v.as_slice().iter().all(|x| x.is_finite()));
        assert!(v.get(Feature::BetaAlphaRatio).abs() < 1e-12);
    }

    #[test]
    fn test_baseline_deltas() {
        let baseline = Baseline::default();
        let v = FeatureDeriver::default().derive(&smoothed(), &baseline);
        assert!((v.get(Feature::NormAttention) - 30.0).abs() < 1e-12);
        assert!((v.get(Feature::NormMeditation) - 9.0).abs() < 1e-12);
        assert!((v.get(Feature::NormAlpha) - (1000.0 - 10_000.0)).abs() < 1e-12);
        assert!(v.dominant().is_none());
    }

    #[test]
    fn test_select_fails_fast_on_unknown_name() {
        let v = FeatureDeriver::default().derive(&smoothed(), &Baseline::default());
        let picked = v.select(&["engagement_ratio", "attention"]).unwrap();
        assert_eq!(picked, vec![1.5, 60.0]);

        assert_eq!(
            v.select(&["attention", "alpha_power"]),
            Err(DecisionError::FeatureMismatch { name: "alpha_power".into() })
        );
    }

    #[test]
    fn test_masking_keeps_dominant_group() {
        let deriver =
            FeatureDeriver::new(FeatureConfig { dominant_masking: true, idle_margin: 5.0 });
        let v = deriver.derive(&smoothed(), &Baseline::default());

        // Attention is 30 above baseline; alpha and beta are far below
        assert_eq!(v.dominant(), Some(IntentLabel::Up));
        assert!((v.get(Feature::Base(Channel::Attention)) - 60.0).abs() < 1e-12);
        assert!(v.get(Feature::Base(Channel::Meditation)).abs() < 1e-12);
        assert!(v.get(Feature::Base(Channel::Theta)).abs() < 1e-12);
        assert!((v.get(Feature::NormAttention) - 30.0).abs() < 1e-12);
        assert!(v.get(Feature::NormMeditation).abs() < 1e-12);
        assert!((v.get(Feature::EngagementRatio) - 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_masking_below_margin_is_idle() {
        let deriver =
            FeatureDeriver::new(FeatureConfig { dominant_masking: true, idle_margin: 5.0 });
        let resting = smoothed()
            .with_channel(Channel::Attention, 32.0)
            .with_channel(Channel::Meditation, 33.0);
        let v = deriver.derive(&resting, &Baseline::default());

        assert_eq!(v.dominant(), Some(IntentLabel::Idle));
        assert!((v.get(Feature::Base(Channel::Meditation)) - 33.0).abs() < 1e-12);
        assert!((v.get(Feature::NormMeditation) - 3.0).abs() < 1e-12);
        assert!(v.get(Feature::Base(Channel::Theta)).abs() < 1e-12);
    }

    #[test]
    fn test_raw_instant_is_unsmoothed_and_survives_masking() {
        let blink = smoothed().with_channel(Channel::Raw, 600.0).with_latest_raw(1800.0);
        for dominant_masking in [false, true] {
            let deriver = FeatureDeriver::new(FeatureConfig { dominant_masking, idle_margin: 5.0 });
            let v = deriver.derive(&blink, &Baseline::default());
            assert!((v.get(Feature::RawInstant) - 1800.0).abs() < 1e-12);
        }
        let plain = FeatureDeriver::default().derive(&blink, &Baseline::default());
        assert!((plain.get(Feature::Base(Channel::Raw)) - 600.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_derive_is_pure(
            values in prop::array::uniform11(0.0f64..1e6),
            base in prop::array::uniform11(0.0f64..1e4),
            masking in any::<bool>(),
        ) {
            let deriver = FeatureDeriver::new(FeatureConfig { dominant_masking: masking, idle_margin: 5.0 });
            let smoothed = SmoothedChannels::new(values);
            let baseline = Baseline::from_values(base, 1);
            let a = deriver.derive(&smoothed, &baseline);
            let b = deriver.derive(&smoothed, &baseline);
            prop_assert_eq!(a, b);
        }
    }
}
