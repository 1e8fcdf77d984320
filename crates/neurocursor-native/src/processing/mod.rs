//! Signal conditioning
//!
//! - [`smoother`]: Causal per-channel window mean / EMA
//! - [`calibration`]: Baseline calibration runs

pub mod calibration;
pub mod smoother;

pub use calibration::{BaselineAccumulator, BaselineCalibrator, CalibrationConfig};
pub use smoother::{CausalSmoother, SmoothedChannels, SmoothingMode};
