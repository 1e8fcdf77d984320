//! NeuroCursor Core - shared types for the EEG-to-intent pipeline
//!
//! This crate provides the data model used by every pipeline stage: metric
//! channels, raw samples, baselines, intents, sample ingestion, and the
//! causal smoothing primitives whose exact formulas are part of the feature
//! contract with any externally trained model.
//!
//! # Modules
//!
//! - [`types`]: Channels, samples, baselines, intent labels
//! - [`error`]: Ingestion error types
//! - [`math`]: Causal window mean, EMA, and the guarded ratio
//! - [`protocol`]: Decoding JSON and delimited transport frames
//!
//! # Example
//!
//! ```rust
//! use neurocursor_core::types::{Channel, RawSample, SignalQuality};
//!
//! let sample = RawSample::default()
//!     .with_quality(SignalQuality::new(0))
//!     .with_channel(Channel::Attention, 72.0);
//!
//! assert!(sample.is_accepted(SignalQuality::new(50)));
//! assert!((sample.channel(Channel::Attention) - 72.0).abs() < 1e-9);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod error;
pub mod math;
pub mod protocol;
pub mod types;

// Re-export commonly used types at crate root
pub use error::IngestError;
pub use math::{guarded_ratio, Ema, WindowMean};
pub use protocol::SampleUpdate;
pub use types::{
    Baseline, Channel, ChannelSet, Intent, IntentLabel, LabelSet, RawSample, SignalQuality,
};
