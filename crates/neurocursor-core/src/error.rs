//! Error types for sample ingestion
//!
//! Ingestion errors describe a frame that could not be read at all. A frame
//! that parses but lacks keys is not an error: missing channels simply keep
//! their previous value.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors from decoding a transport frame into a [`crate::protocol::SampleUpdate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestError {
    /// Frame is not valid JSON
    InvalidJson {
        /// Parser message
        message: String,
    },
    /// Frame is valid JSON but not an object
    NotAnObject {
        /// JSON type that was found instead
        found: String,
    },
    /// Delimited text line has too few fields
    TooFewFields {
        /// Fields present
        got: usize,
        /// Fields required
        need: usize,
    },
    /// Delimited field is not a number
    InvalidField {
        /// Zero-based field position
        index: usize,
        /// Offending text
        text: String,
    },
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidJson { message } => write!(f, "Invalid JSON frame: {message}"),
            Self::NotAnObject { found } => {
                write!(f, "Expected a JSON object of channel values, got {found}")
            }
            Self::TooFewFields { got, need } => {
                write!(f, "Delimited line has {got} fields, need at least {need}")
            }
            Self::InvalidField { index, text } => {
                write!(f, "Field {index} is not a number: {text:?}")
            }
        }
    }
}

impl std::error::Error for IngestError {}
