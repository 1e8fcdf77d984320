//! Causal smoothing primitives
//!
//! Both filters are strictly causal: each output depends only on values
//! already pushed. They are shared by online inference and offline feature
//! preparation, so any change here changes the feature definition.

use std::collections::VecDeque;

// ============================================================================
// Sliding Window Mean
// ============================================================================

/// Mean of the last `N` pushed values.
///
/// Defined from the first push onward: until the window fills, the mean is
/// taken over however many values have been seen (reduced-sample averaging,
/// the same as a rolling mean with `min_periods = 1`).
#[derive(Clone, Debug)]
pub struct WindowMean {
    buffer: VecDeque<f64>,
    capacity: usize,
}

impl WindowMean {
    /// Create a window of `capacity` values (a capacity of 0 is treated as 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a value and return the current mean
    pub fn filter(&mut self, input: f64) -> f64 {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(input);

        // Summed fresh each push: windows are tiny and a running sum drifts.
        let sum: f64 = self.buffer.iter().sum();
        sum / self.buffer.len() as f64
    }

    /// Current mean without pushing (None before the first push)
    #[must_use]
    pub fn value(&self) -> Option<f64> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer.iter().sum::<f64>() / self.buffer.len() as f64)
        }
    }

    /// Window capacity
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of values currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if no value has been pushed since the last reset
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Reset filter state
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

// ============================================================================
// Exponential Moving Average
// ============================================================================

/// Exponential moving average `y = α·x + (1-α)·y_prev`, seeded by the first input.
#[derive(Clone, Debug)]
pub struct Ema {
    alpha: f64,
    state: Option<f64>,
}

impl Ema {
    /// Create an EMA with decay factor `alpha`, clamped to `(0, 1]`
    #[must_use]
    pub fn new(alpha: f64) -> Self {
        let alpha = if alpha.is_finite() { alpha.clamp(f64::EPSILON, 1.0) } else { 1.0 };
        Self { alpha, state: None }
    }

    /// Push a value and return the smoothed output
    pub fn filter(&mut self, input: f64) -> f64 {
        let output = match self.state {
            None => input,
            Some(prev) => self.alpha * input + (1.0 - self.alpha) * prev,
        };
        self.state = Some(output);
        output
    }

    /// Current output without pushing (None before the first push)
    #[must_use]
    pub const fn value(&self) -> Option<f64> {
        self.state
    }

    /// Decay factor
    #[must_use]
    pub const fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Reset filter state
    pub fn reset(&mut self) {
        self.state = None;
    }
}

/// Divide by `denominator + 1`.
///
/// The `+1` keeps zero band powers from dividing by zero. Externally trained
/// models expect exactly this offset, so it is not a tunable.
#[inline]
#[must_use]
pub fn guarded_ratio(numerator: f64, denominator: f64) -> f64 {
    numerator / (denominator + 1.0)
}

// ============================================================================
// Tests
// ============================================================================
