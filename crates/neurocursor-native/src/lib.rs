//! NeuroCursor Native - host-side signal-to-intent pipeline
//!
//! This crate turns the headset's sample stream into stabilized intents:
//! - Causal per-channel smoothing and baseline calibration
//! - Feature derivation shared by online inference and offline training
//! - Threshold and classifier deciders behind one quality-gated contract
//! - Majority-vote debouncing and a continuous effort controller
//! - Shared state, safety interlock and the control loop
//!
//! # Modules
//!
//! - [`processing`]: Smoothing and calibration
//! - [`ml`]: Features, classifier capability, softmax model, training rows
//! - [`decision`]: Deciders, debouncer, effort controller
//! - [`session`]: Shared state and per-tick orchestration
//! - [`config`]: TOML pipeline configuration
//! - [`error`]: Error types

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod config;
pub mod decision;
pub mod error;
pub mod ml;
pub mod processing;
pub mod session;

// Re-export key types
pub use config::{DeciderConfig, PipelineConfig, RulePreset};
pub use decision::{
    ClassifierDecider, Debouncer, EffortController, IntentDecider, QualityGate, Stabilized,
    ThresholdDecider, ThresholdRule,
};
pub use error::{
    ActuationFault, CalibrationError, ConfigError, DecisionError, ModelError,
};
pub use ml::{Classifier, FeatureDeriver, FeatureVector, ModelDescriptor, SoftmaxModel};
pub use processing::{BaselineCalibrator, CalibrationConfig, CausalSmoother, SmoothingMode};
pub use session::{
    run_control_loop, ActionSink, BaselineStore, CancelToken, ControlSession, Controller,
    Interlock, SampleSlot, SessionHandles, TickOutcome, TickStatus,
};
