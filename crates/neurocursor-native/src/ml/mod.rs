//! Features and classifiers for intent decoding
//!
//! - [`features`]: Named feature vector derived from smoothed channels
//! - [`classifier`]: Classifier capability and validated model descriptor
//! - [`softmax`]: JSON-loadable linear softmax model
//! - [`offline`]: Training rows derived through the online code path

pub mod classifier;
pub mod features;
pub mod offline;
pub mod softmax;

pub use classifier::{ClassProbabilities, Classifier, ModelDescriptor};
pub use features::{Feature, FeatureConfig, FeatureDeriver, FeatureVector};
pub use offline::{smooth_recording, LabelledRecord, TrainingRow};
pub use softmax::SoftmaxModel;
