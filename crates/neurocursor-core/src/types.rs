//! Core types for the NeuroCursor pipeline
//!
//! This module provides the fundamental types shared by every stage:
//! - Channel identifiers for the single-electrode TGAM metric stream
//! - Signal quality as reported by the headset
//! - Raw per-tick samples and per-channel baselines
//! - Intent labels, intents and configurable label sets

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

// ============================================================================
// Channels
// ============================================================================

/// Metric channels reported by a TGAM/NeuroSky-class headset.
///
/// Attention and meditation are the chip's own 0-100 eSense metrics; the
/// band powers are unbounded device-unit magnitudes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Channel {
    /// eSense attention (0-100)
    Attention = 0,
    /// eSense meditation (0-100)
    Meditation = 1,
    /// Raw EEG value (signed)
    Raw = 2,
    /// Delta band power (0.5-2.75 Hz)
    Delta = 3,
    /// Theta band power (3.5-6.75 Hz)
    Theta = 4,
    /// Low alpha band power (7.5-9.25 Hz)
    LowAlpha = 5,
    /// High alpha band power (10-11.75 Hz)
    HighAlpha = 6,
    /// Low beta band power (13-16.75 Hz)
    LowBeta = 7,
    /// High beta band power (18-29.75 Hz)
    HighBeta = 8,
    /// Low gamma band power (31-39.75 Hz)
    LowGamma = 9,
    /// Mid gamma band power (41-49.75 Hz)
    MidGamma = 10,
}

impl Channel {
    /// All channels in order
    pub const ALL: [Self; 11] = [
        Self::Attention,
        Self::Meditation,
        Self::Raw,
        Self::Delta,
        Self::Theta,
        Self::LowAlpha,
        Self::HighAlpha,
        Self::LowBeta,
        Self::HighBeta,
        Self::LowGamma,
        Self::MidGamma,
    ];

    /// Number of channels
    pub const COUNT: usize = 11;

    /// Get the array index for this channel
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Get channel from index (returns None if out of range)
    #[inline]
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < Self::COUNT {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    /// Short key used by the headset bridge firmware (`att`, `la`, ...)
    #[inline]
    #[must_use]
    pub const fn wire_key(self) -> &'static str {
        match self {
            Self::Attention => "att",
            Self::Meditation => "med",
            Self::Raw => "raw",
            Self::Delta => "delta",
            Self::Theta => "theta",
            Self::LowAlpha => "la",
            Self::HighAlpha => "ha",
            Self::LowBeta => "lb",
            Self::HighBeta => "hb",
            Self::LowGamma => "lg",
            Self::MidGamma => "mg",
        }
    }

    /// Column name used in recorded training data and feature vectors
    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Attention => "attention",
            Self::Meditation => "meditation",
            Self::Raw => "raw",
            Self::Delta => "delta",
            Self::Theta => "theta",
            Self::LowAlpha => "low_alpha",
            Self::HighAlpha => "high_alpha",
            Self::LowBeta => "low_beta",
            Self::HighBeta => "high_beta",
            Self::LowGamma => "low_gamma",
            Self::MidGamma => "mid_gamma",
        }
    }

    /// Resolve either a wire key or a column name
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|ch| ch.wire_key() == key || ch.name() == key)
    }

    /// Check if this channel is a band power
    #[inline]
    #[must_use]
    pub const fn is_band_power(self) -> bool {
        !matches!(self, Self::Attention | Self::Meditation | Self::Raw)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compact set of channels (bitmask over [`Channel::index`]).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChannelSet(u16);

impl ChannelSet {
    /// The empty set
    pub const EMPTY: Self = Self(0);

    /// Every channel
    pub const ALL: Self = Self((1 << Channel::COUNT) - 1);

    /// Attention, meditation, and the four alpha/beta bands
    pub const CORE: Self = Self::EMPTY
        .with(Channel::Attention)
        .with(Channel::Meditation)
        .with(Channel::LowAlpha)
        .with(Channel::HighAlpha)
        .with(Channel::LowBeta)
        .with(Channel::HighBeta);

    /// Return a copy with `channel` added
    #[inline]
    #[must_use]
    pub const fn with(self, channel: Channel) -> Self {
        Self(self.0 | (1 << channel as u16))
    }

    /// Add a channel
    #[inline]
    pub fn insert(&mut self, channel: Channel) {
        *self = self.with(channel);
    }

    /// Check membership
    #[inline]
    #[must_use]
    pub const fn contains(self, channel: Channel) -> bool {
        self.0 & (1 << channel as u16) != 0
    }

    /// Check if no channel is present
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of channels present
    #[inline]
    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate members in channel order
    pub fn iter(self) -> impl Iterator<Item = Channel> {
        Channel::ALL.into_iter().filter(move |ch| self.contains(*ch))
    }
}

impl FromIterator<Channel> for ChannelSet {
    fn from_iter<I: IntoIterator<Item = Channel>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

impl Serialize for ChannelSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for ChannelSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let channels = Vec::<Channel>::deserialize(deserializer)?;
        Ok(channels.into_iter().collect())
    }
}

// ============================================================================
// Signal Quality
// ============================================================================

/// Device-reported contact/noise indicator. Lower is better.
///
/// `0` is perfect contact; [`SignalQuality::NO_CONTACT`] (200) means the
/// electrode is off the skin and no metric can be trusted.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalQuality(u16);

impl SignalQuality {
    /// Perfect contact
    pub const PERFECT: Self = Self(0);

    /// Sentinel reported when the electrode has no contact
    pub const NO_CONTACT: Self = Self(200);

    /// Wrap a raw quality value
    #[inline]
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Get the raw quality value
    #[inline]
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Check if this quality is at or below `ceiling` (i.e. acceptable)
    #[inline]
    #[must_use]
    pub const fn within(self, ceiling: Self) -> bool {
        self.0 <= ceiling.0
    }
}

impl Default for SignalQuality {
    fn default() -> Self {
        Self::NO_CONTACT
    }
}

impl fmt::Display for SignalQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Samples
// ============================================================================

/// One tick of headset output.
///
/// Channels that have never been reported stay at `0.0` and are absent from
/// [`RawSample::reported`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Signal quality for this tick
    pub quality: SignalQuality,
    /// Channel values indexed by [`Channel::index`]
    pub values: [f64; Channel::COUNT],
    /// Channels the device has reported at least once
    pub reported: ChannelSet,
}

impl RawSample {
    /// Create a sample with no contact and all channels zeroed
    #[must_use]
    pub const fn new() -> Self {
        Self {
            quality: SignalQuality::NO_CONTACT,
            values: [0.0; Channel::COUNT],
            reported: ChannelSet::EMPTY,
        }
    }

    /// Get a channel value
    #[inline]
    #[must_use]
    pub const fn channel(&self, channel: Channel) -> f64 {
        self.values[channel.index()]
    }

    /// Set a channel value and mark it reported
    #[inline]
    pub fn set_channel(&mut self, channel: Channel, value: f64) {
        self.values[channel.index()] = value;
        self.reported.insert(channel);
    }

    /// Builder-style channel setter
    #[must_use]
    pub fn with_channel(mut self, channel: Channel, value: f64) -> Self {
        self.set_channel(channel, value);
        self
    }

    /// Builder-style quality setter
    #[must_use]
    pub const fn with_quality(mut self, quality: SignalQuality) -> Self {
        self.quality = quality;
        self
    }

    /// Check if this sample is clean enough to use (quality at or below `ceiling`)
    #[inline]
    #[must_use]
    pub const fn is_accepted(&self, ceiling: SignalQuality) -> bool {
        self.quality.within(ceiling)
    }

    /// Combined alpha power (low + high)
    #[inline]
    #[must_use]
    pub fn alpha(&self) -> f64 {
        self.channel(Channel::LowAlpha) + self.channel(Channel::HighAlpha)
    }

    /// Combined beta power (low + high)
    #[inline]
    #[must_use]
    pub fn beta(&self) -> f64 {
        self.channel(Channel::LowBeta) + self.channel(Channel::HighBeta)
    }
}

impl Default for RawSample {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Baseline
// ============================================================================

/// Per-channel resting reference values produced by calibration.
///
/// A baseline is replaced wholesale on every successful calibration run and
/// is never observed half-written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    /// Reference values indexed by [`Channel::index`]
    pub values: [f64; Channel::COUNT],
    /// Accepted samples that produced this baseline (0 for the default)
    pub sample_count: usize,
}

impl Baseline {
    /// Default attention/meditation reference before any calibration
    pub const DEFAULT_ESENSE: f64 = 30.0;

    /// Default per-band alpha reference before any calibration
    pub const DEFAULT_ALPHA_BAND: f64 = 5000.0;

    /// Default per-band beta reference before any calibration
    pub const DEFAULT_BETA_BAND: f64 = 3000.0;

    /// Build a baseline from explicit values
    #[must_use]
    pub const fn from_values(values: [f64; Channel::COUNT], sample_count: usize) -> Self {
        Self { values, sample_count }
    }

    /// Get a reference value
    #[inline]
    #[must_use]
    pub const fn channel(&self, channel: Channel) -> f64 {
        self.values[channel.index()]
    }

    /// Builder-style channel setter
    #[must_use]
    pub fn with_channel(mut self, channel: Channel, value: f64) -> Self {
        self.values[channel.index()] = value;
        self
    }

    /// Combined alpha reference (low + high)
    #[inline]
    #[must_use]
    pub fn alpha(&self) -> f64 {
        self.channel(Channel::LowAlpha) + self.channel(Channel::HighAlpha)
    }

    /// Combined beta reference (low + high)
    #[inline]
    #[must_use]
    pub fn beta(&self) -> f64 {
        self.channel(Channel::LowBeta) + self.channel(Channel::HighBeta)
    }

    /// Check if this baseline came from a calibration run
    #[inline]
    #[must_use]
    pub const fn is_calibrated(&self) -> bool {
        self.sample_count > 0
    }
}

impl Default for Baseline {
    fn default() -> Self {
        let mut values = [0.0; Channel::COUNT];
        values[Channel::Attention.index()] = Self::DEFAULT_ESENSE;
        values[Channel::Meditation.index()] = Self::DEFAULT_ESENSE;
        values[Channel::LowAlpha.index()] = Self::DEFAULT_ALPHA_BAND;
        values[Channel::HighAlpha.index()] = Self::DEFAULT_ALPHA_BAND;
        values[Channel::LowBeta.index()] = Self::DEFAULT_BETA_BAND;
        values[Channel::HighBeta.index()] = Self::DEFAULT_BETA_BAND;
        Self { values, sample_count: 0 }
    }
}

// ============================================================================
// Intents
// ============================================================================

/// Discrete control decision.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum IntentLabel {
    /// Move left
    Left = 0,
    /// Move right
    Right = 1,
    /// Move up
    Up = 2,
    /// Move down
    Down = 3,
    /// Click (discrete, irreversible)
    Click = 4,
    /// No action
    Idle = 5,
}

impl IntentLabel {
    /// All labels in order
    pub const ALL: [Self; 6] = [
        Self::Left,
        Self::Right,
        Self::Up,
        Self::Down,
        Self::Click,
        Self::Idle,
    ];

    /// Upper-case label as used in recordings and model files
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Click => "CLICK",
            Self::Idle => "IDLE",
        }
    }

    /// Check if acting on this label is a one-shot action that must not repeat
    #[inline]
    #[must_use]
    pub const fn is_discrete(self) -> bool {
        matches!(self, Self::Click)
    }

    /// Check if this label causes any actuation
    #[inline]
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for IntentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownLabel(s.to_owned()))
    }
}

/// Returned when a string does not name an [`IntentLabel`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownLabel(pub String);

impl fmt::Display for UnknownLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown intent label: {:?}", self.0)
    }
}

impl std::error::Error for UnknownLabel {}

/// A labelled decision with confidence in `[0, 1]`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// Decided label
    pub label: IntentLabel,
    /// Confidence (1.0 for rule-based decisions)
    pub confidence: f64,
}

impl Intent {
    /// Create an intent, clamping confidence into `[0, 1]`
    #[must_use]
    pub fn new(label: IntentLabel, confidence: f64) -> Self {
        let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        Self { label, confidence }
    }

    /// Full-confidence intent, as emitted by rules
    #[must_use]
    pub const fn certain(label: IntentLabel) -> Self {
        Self { label, confidence: 1.0 }
    }

    /// The inert intent
    #[must_use]
    pub const fn idle() -> Self {
        Self::certain(IntentLabel::Idle)
    }

    /// Check if this intent is IDLE
    #[inline]
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self.label, IntentLabel::Idle)
    }
}

/// The set of labels a deployment may emit.
///
/// IDLE is always a member; some deployments drop CLICK.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LabelSet(u8);

impl LabelSet {
    /// All six labels
    pub const ALL: Self = Self(0b11_1111);

    /// Directions and IDLE, without CLICK
    pub const DIRECTIONS: Self = Self(Self::ALL.0 & !(1 << IntentLabel::Click as u8));

    /// Check membership
    #[inline]
    #[must_use]
    pub const fn contains(self, label: IntentLabel) -> bool {
        self.0 & (1 << label as u8) != 0
    }

    /// Iterate members in label order
    pub fn iter(self) -> impl Iterator<Item = IntentLabel> {
        IntentLabel::ALL.into_iter().filter(move |l| self.contains(*l))
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::ALL
    }
}

impl FromIterator<IntentLabel> for LabelSet {
    fn from_iter<I: IntoIterator<Item = IntentLabel>>(iter: I) -> Self {
        let bits = iter
            .into_iter()
            .fold(1 << IntentLabel::Idle as u8, |acc, l| acc | (1 << l as u8));
        Self(bits)
    }
}

impl Serialize for LabelSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for LabelSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let labels = Vec::<IntentLabel>::deserialize(deserializer)?;
        Ok(labels.into_iter().collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_index_roundtrip() {
        for ch in Channel::ALL {
            assert_eq!(Channel::from_index(ch.index()), Some(ch));
        }
        assert_eq!(Channel::from_index(Channel::COUNT), None);
    }

    #[test]
    fn test_channel_keys() {
        assert_eq!(Channel::from_key("la"), Some(Channel::LowAlpha));
        assert_eq!(Channel::from_key("low_alpha"), Some(Channel::LowAlpha));
        assert_eq!(Channel::from_key("sig"), None);
        assert!(!Channel::Attention.is_band_power());
        assert!(Channel::MidGamma.is_band_power());
    }

    #[test]
    fn test_channel_set() {
        assert_eq!(ChannelSet::ALL.len(), Channel::COUNT);
        assert_eq!(ChannelSet::CORE.len(), 6);
        assert!(ChannelSet::CORE.contains(Channel::HighBeta));
        assert!(!ChannelSet::CORE.contains(Channel::Theta));

        let set: ChannelSet = [Channel::Theta, Channel::Delta].into_iter().collect();
        let order: Vec<_> = set.iter().collect();
        assert_eq!(order, vec![Channel::Delta, Channel::Theta]);
    }

    #[test]
    fn test_signal_quality_within() {
        let ceiling = SignalQuality::new(50);
        assert!(SignalQuality::new(50).within(ceiling));
        assert!(!SignalQuality::new(51).within(ceiling));
    }

    #[test]
    fn test_raw_sample_defaults() {
        let sample = RawSample::default();
        assert_eq!(sample.quality, SignalQuality::NO_CONTACT);
        assert!(sample.reported.is_empty());

        let sample = sample
            .with_channel(Channel::LowAlpha, 10.0)
            .with_channel(Channel::HighAlpha, 5.0);
        assert!((sample.alpha() - 15.0).abs() < 1e-9);
        assert!(sample.reported.contains(Channel::LowAlpha));
    }

    #[test]
    fn test_baseline_defaults() {
        let baseline = Baseline::default();
        assert!((baseline.channel(Channel::Attention) - 30.0).abs() < 1e-9);
        assert!((baseline.alpha() - 10_000.0).abs() < 1e-9);
        assert!((baseline.beta() - 6_000.0).abs() < 1e-9);
        assert!(!baseline.is_calibrated());
    }

    #[test]
    fn test_intent_label_parse() {
        assert_eq!("left".parse::<IntentLabel>(), Ok(IntentLabel::Left));
        assert_eq!("CLICK".parse::<IntentLabel>(), Ok(IntentLabel::Click));
        assert!("SIDEWAYS".parse::<IntentLabel>().is_err());
    }

    #[test]
    fn test_intent_confidence_clamped() {
        assert!((Intent::new(IntentLabel::Up, 1.7).confidence - 1.0).abs() < 1e-9);
        assert!((Intent::new(IntentLabel::Up, f64::NAN).confidence).abs() < 1e-9);
    }

    #[test]
    fn test_label_set_always_has_idle() {
        let set: LabelSet = [IntentLabel::Left, IntentLabel::Right].into_iter().collect();
        assert!(set.contains(IntentLabel::Idle));
        assert!(!set.contains(IntentLabel::Click));
        assert!(!LabelSet::DIRECTIONS.contains(IntentLabel::Click));
        assert!(LabelSet::ALL.contains(IntentLabel::Click));
    }
}
