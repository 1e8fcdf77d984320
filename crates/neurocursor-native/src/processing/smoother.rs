//! Causal per-channel smoothing
//!
//! One filter per channel, either a short sliding-window mean or an EMA.
//! Samples must be pushed in arrival order; replaying out of order is not
//! supported. The same smoother type prepares offline training features
//! (see [`crate::ml::offline`]), so window size and α are part of the model
//! contract rather than tuning knobs.

use neurocursor_core::math::{Ema, WindowMean};
use neurocursor_core::types::{Channel, RawSample};
use serde::{Deserialize, Serialize};

/// Smoothing mode and its parameter
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SmoothingMode {
    /// Mean of the last `size` accepted samples
    Window {
        /// Window length in samples
        size: usize,
    },
    /// Exponential moving average seeded by the first sample
    Ema {
        /// Weight of the newest sample
        alpha: f64,
    },
}

impl Default for SmoothingMode {
    fn default() -> Self {
        Self::Window { size: 3 }
    }
}

#[derive(Clone, Debug)]
enum ChannelFilter {
    Window(WindowMean),
    Ema(Ema),
}

impl ChannelFilter {
    fn new(mode: SmoothingMode) -> Self {
        match mode {
            SmoothingMode::Window { size } => Self::Window(WindowMean::new(size)),
            SmoothingMode::Ema { alpha } => Self::Ema(Ema::new(alpha)),
        }
    }

    fn filter(&mut self, value: f64) -> f64 {
        match self {
            Self::Window(w) => w.filter(value),
            Self::Ema(e) => e.filter(value),
        }
    }

    fn value(&self) -> Option<f64> {
        match self {
            Self::Window(w) => w.value(),
            Self::Ema(e) => e.value(),
        }
    }

    fn reset(&mut self) {
        match self {
            Self::Window(w) => w.reset(),
            Self::Ema(e) => e.reset(),
        }
    }
}

/// Smoothed value of every channel at one tick
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SmoothedChannels {
    /// Values indexed by [`Channel::index`]
    pub values: [f64; Channel::COUNT],
    /// Raw channel of the most recent accepted sample, bypassing the filter
    #[serde(default)]
    pub latest_raw: f64,
}

impl SmoothedChannels {
    /// Wrap explicit values
    #[must_use]
    pub const fn new(values: [f64; Channel::COUNT]) -> Self {
        Self { values, latest_raw: 0.0 }
    }

    /// Use a raw sample unsmoothed
    #[must_use]
    pub fn from_sample(sample: &RawSample) -> Self {
        Self { values: sample.values, latest_raw: sample.channel(Channel::Raw) }
    }

    /// Builder-style setter for the unsmoothed raw value
    #[must_use]
    pub fn with_latest_raw(mut self, raw: f64) -> Self {
        self.latest_raw = raw;
        self
    }

    /// Builder-style channel setter
    #[must_use]
    pub fn with_channel(mut self, channel: Channel, value: f64) -> Self {
        self.values[channel.index()] = value;
        self
    }

    /// Get a channel value
    #[inline]
    #[must_use]
    pub const fn channel(&self, channel: Channel) -> f64 {
        self.values[channel.index()]
    }

    /// Low + high alpha
    #[must_use]
    pub fn alpha(&self) -> f64 {
        self.channel(Channel::LowAlpha) + self.channel(Channel::HighAlpha)
    }

    /// Low + high beta
    #[must_use]
    pub fn beta(&self) -> f64 {
        self.channel(Channel::LowBeta) + self.channel(Channel::HighBeta)
    }

    /// Low + mid gamma
    #[must_use]
    pub fn gamma(&self) -> f64 {
        self.channel(Channel::LowGamma) + self.channel(Channel::MidGamma)
    }
}

/// Per-channel causal smoother
#[derive(Clone, Debug)]
pub struct CausalSmoother {
    mode: SmoothingMode,
    filters: Vec<ChannelFilter>,
    latest_raw: Option<f64>,
}

impl CausalSmoother {
    /// Create a smoother with one filter per channel
    #[must_use]
    pub fn new(mode: SmoothingMode) -> Self {
        Self {
            mode,
            filters: Channel::ALL.iter().map(|_| ChannelFilter::new(mode)).collect(),
            latest_raw: None,
        }
    }

    /// Smoothing mode in force
    #[must_use]
    pub const fn mode(&self) -> SmoothingMode {
        self.mode
    }

    /// Push one value for `channel` and return its smoothed value
    pub fn push(&mut self, channel: Channel, value: f64) -> f64 {
        self.filters[channel.index()].filter(value)
    }

    /// Push every channel of an accepted sample
    pub fn push_sample(&mut self, sample: &RawSample) -> SmoothedChannels {
        let mut out = SmoothedChannels::default();
        for channel in Channel::ALL {
            out.values[channel.index()] = self.push(channel, sample.channel(channel));
        }
        let raw = sample.channel(Channel::Raw);
        self.latest_raw = Some(raw);
        out.latest_raw = raw;
        out
    }

    /// Current smoothed value for `channel` (None before its first push)
    #[must_use]
    pub fn value(&self, channel: Channel) -> Option<f64> {
        self.filters[channel.index()].value()
    }

    /// Current smoothed values, `0.0` for channels never pushed
    #[must_use]
    pub fn snapshot(&self) -> SmoothedChannels {
        let mut out = SmoothedChannels::default();
        for channel in Channel::ALL {
            out.values[channel.index()] = self.value(channel).unwrap_or(0.0);
        }
        out.latest_raw = self.latest_raw.unwrap_or(0.0);
        out
    }

    /// Check if nothing has been pushed since creation or the last reset
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.iter().all(|f| f.value().is_none())
    }

    /// Drop all history
    pub fn reset(&mut self) {
        for f in &mut self.filters {
            f.reset();
        }
        self.latest_raw = None;
    }
}

impl Default for CausalSmoother {
    fn default() -> Self {
        Self::new(SmoothingMode::default())
    }
}
