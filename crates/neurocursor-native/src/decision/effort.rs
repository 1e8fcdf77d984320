//! Continuous effort control
//!
//! Attention is EMA-smoothed and compared with an operator-set centre.
//! Effort above the centre pushes LEFT, relaxation below it pulls RIGHT,
//! each through its own gain and a shared deadzone. The output carries a
//! signed drive (LEFT negative) for proportional actuators.

use std::time::{Duration, Instant};

use neurocursor_core::math::Ema;
use neurocursor_core::types::{Channel, Intent, IntentLabel, RawSample, SignalQuality};
use serde::{Deserialize, Serialize};

/// Effort controller configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffortConfig {
    /// EMA weight of the newest attention reading
    pub ema_alpha: f64,
    /// Centre before the operator sets one
    pub initial_centre: f64,
    /// Deviation from centre that produces no drive
    pub deadzone: f64,
    /// Drive per unit of effort above the deadzone
    pub left_gain: f64,
    /// Drive per unit of relaxation below the deadzone
    pub right_gain: f64,
    /// Drive needed to emit a direction
    pub activation: f64,
    /// Worst quality the controller acts on
    pub quality_ceiling: u16,
    /// Minimum interval between movements (ms)
    pub move_cooldown_ms: u64,
    /// Base movement step for actuators
    pub base_speed: f64,
}

impl Default for EffortConfig {
    fn default() -> Self {
        Self {
            ema_alpha: 0.2,
            initial_centre: 50.0,
            deadzone: 5.0,
            left_gain: 5.0,
            right_gain: 10.0,
            activation: 5.0,
            quality_ceiling: 50,
            move_cooldown_ms: 50,
            base_speed: 8.0,
        }
    }
}

/// Drive at which the drive range saturates
pub const MAX_DRIVE: f64 = 100.0;

/// Movement step for a signed drive: `base + |drive| / 8`
#[must_use]
pub fn movement_step(base_speed: f64, drive: f64) -> f64 {
    base_speed + drive.abs() / 8.0
}

/// One controller update
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EffortOutput {
    /// Direction to act on (IDLE when neutral, gated or cooling down)
    pub intent: Intent,
    /// Signed drive in `[-100, 100]`, LEFT negative
    pub drive: f64,
    /// Left drive in `[0, 100]`
    pub left: f64,
    /// Right drive in `[0, 100]`
    pub right: f64,
    /// Smoothed attention (None until the first accepted sample)
    pub average: Option<f64>,
}

impl EffortOutput {
    fn idle(average: Option<f64>) -> Self {
        Self { intent: Intent::idle(), drive: 0.0, left: 0.0, right: 0.0, average }
    }
}

/// Effort-to-drive controller
#[derive(Clone, Debug)]
pub struct EffortController {
    config: EffortConfig,
    ema: Ema,
    centre: f64,
    last_move: Option<Instant>,
}

impl EffortController {
    /// Create a controller
    #[must_use]
    pub fn new(config: EffortConfig) -> Self {
        Self {
            ema: Ema::new(config.ema_alpha),
            centre: config.initial_centre,
            config,
            last_move: None,
        }
    }

    /// Configuration in force
    #[must_use]
    pub const fn config(&self) -> &EffortConfig {
        &self.config
    }

    /// Current centre
    #[must_use]
    pub const fn centre(&self) -> f64 {
        self.centre
    }

    /// Smoothed attention
    #[must_use]
    pub const fn average(&self) -> Option<f64> {
        self.ema.value()
    }

    /// Re-centre on the current smoothed attention (operator action)
    pub fn set_centre(&mut self) -> Option<f64> {
        let average = self.ema.value()?;
        self.centre = average;
        tracing::info!("Effort centre set to {:.1}", average);
        Some(average)
    }

    /// Set the centre to an explicit attention level (operator action)
    pub fn set_centre_to(&mut self, centre: f64) {
        self.centre = centre;
        tracing::info!("Effort centre set to {:.1}", centre);
    }

    /// Forget the smoothed attention and movement cooldown; keeps the centre
    pub fn reset(&mut self) {
        self.ema.reset();
        self.last_move = None;
    }

    /// Feed a sample
    pub fn update(&mut self, sample: &RawSample) -> EffortOutput {
        self.update_at(sample, Instant::now())
    }

    /// Feed a sample observed at `now`
    pub fn update_at(&mut self, sample: &RawSample, now: Instant) -> EffortOutput {
        if !sample.is_accepted(SignalQuality::new(self.config.quality_ceiling)) {
            return EffortOutput::idle(self.ema.value());
        }

        let average = self.ema.filter(sample.channel(Channel::Attention));
        let diff = average - self.centre;
        let left = ((diff - self.config.deadzone) * self.config.left_gain).clamp(0.0, MAX_DRIVE);
        let right =
            ((-diff - self.config.deadzone) * self.config.right_gain).clamp(0.0, MAX_DRIVE);

        let (label, drive) = if left > self.config.activation {
            (IntentLabel::Left, -left)
        } else if right > self.config.activation {
            (IntentLabel::Right, right)
        } else {
            (IntentLabel::Idle, 0.0)
        };

        let cooldown = Duration::from_millis(self.config.move_cooldown_ms);
        let cooled = self.last_move.map_or(true, |t| now.duration_since(t) > cooldown);
        if label == IntentLabel::Idle || !cooled {
            return EffortOutput { left, right, ..EffortOutput::idle(Some(average)) };
        }

        self.last_move = Some(now);
        EffortOutput {
            intent: Intent::new(label, drive.abs() / MAX_DRIVE),
            drive,
            left,
            right,
            average: Some(average),
        }
    }
}

impl Default for EffortController {
    fn default() -> Self {
        Self::new(EffortConfig::default())
    }
}
