//! Sample ingestion from the headset bridge
//!
//! The ESP32 bridge forwards TGAM packets either as JSON objects over
//! WebSocket or as comma-delimited `att,med,raw` lines over TCP. Both decode
//! into a [`SampleUpdate`], a sparse per-channel mapping that is merged into
//! the latest [`RawSample`]. Keys the frame does not carry leave the previous
//! value untouched; ingestion never fails because a channel is missing.
//!
//! # Example
//!
//! ```
//! use neurocursor_core::protocol::SampleUpdate;
//! use neurocursor_core::types::{Channel, RawSample};
//!
//! let mut sample = RawSample::default();
//! let update = SampleUpdate::from_json(r#"{"sig": 0, "att": 61, "la": 4200}"#).unwrap();
//! update.apply_to(&mut sample);
//!
//! assert_eq!(sample.quality.value(), 0);
//! assert!((sample.channel(Channel::Attention) - 61.0).abs() < 1e-9);
//! assert!((sample.channel(Channel::Meditation)).abs() < 1e-9);
//! ```

use serde::Serialize;
use serde_json::Value;

use crate::error::IngestError;
use crate::types::{Channel, RawSample, SignalQuality};

/// Keys accepted for signal quality
pub const QUALITY_KEYS: [&str; 2] = ["sig", "signal_quality"];

/// Sparse per-channel update decoded from one transport frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SampleUpdate {
    /// Signal quality, if the frame carried one
    pub quality: Option<SignalQuality>,
    /// Channel values present in the frame
    pub values: [Option<f64>; Channel::COUNT],
}

impl SampleUpdate {
    /// Create an empty update
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style quality setter
    #[must_use]
    pub fn quality(mut self, quality: u16) -> Self {
        self.quality = Some(SignalQuality::new(quality));
        self
    }

    /// Builder-style channel setter
    #[must_use]
    pub fn channel(mut self, channel: Channel, value: f64) -> Self {
        self.values[channel.index()] = Some(value);
        self
    }

    /// Decode a JSON object frame.
    ///
    /// Unknown keys, non-numeric values and non-finite numbers are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if the text is not JSON or not an object.
    pub fn from_json(text: &str) -> Result<Self, IngestError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| IngestError::InvalidJson { message: e.to_string() })?;
        Self::from_json_value(&value)
    }

    /// Decode an already-parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::NotAnObject`] for anything but an object.
    pub fn from_json_value(value: &Value) -> Result<Self, IngestError> {
        let Value::Object(map) = value else {
            return Err(IngestError::NotAnObject { found: json_type(value).to_owned() });
        };
        Ok(Self::from_pairs(
            map.iter().filter_map(|(k, v)| v.as_f64().map(|n| (k.as_str(), n))),
        ))
    }

    /// Build from plain `(key, value)` pairs, ignoring unknown keys.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut update = Self::new();
        for (key, value) in pairs {
            if !value.is_finite() {
                continue;
            }
            if QUALITY_KEYS.contains(&key) {
                if let Some(q) = quality_from_f64(value) {
                    update.quality = Some(q);
                }
            } else if let Some(channel) = Channel::from_key(key) {
                update.values[channel.index()] = Some(value);
            }
        }
        update
    }

    /// Decode a TGAM TCP line: `attention,meditation,raw[,...]`.
    ///
    /// The TCP bridge does not forward signal quality, so the update leaves
    /// quality unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if fewer than three fields are present or one
    /// of them is not an integer.
    pub fn from_tgam_line(line: &str) -> Result<Self, IngestError> {
        const FIELDS: [Channel; 3] = [Channel::Attention, Channel::Meditation, Channel::Raw];

        let parts: Vec<&str> = line.trim().split(',').collect();
        if parts.len() < FIELDS.len() {
            return Err(IngestError::TooFewFields { got: parts.len(), need: FIELDS.len() });
        }

        let mut update = Self::new();
        for (index, (text, channel)) in parts.iter().zip(FIELDS).enumerate() {
            let value: i64 = text.trim().parse().map_err(|_| IngestError::InvalidField {
                index,
                text: (*text).to_owned(),
            })?;
            update.values[channel.index()] = Some(value as f64);
        }
        Ok(update)
    }

    /// Check if the frame carried nothing usable
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quality.is_none() && self.values.iter().all(Option::is_none)
    }

    /// Merge into `sample`; absent keys keep their previous value
    pub fn apply_to(&self, sample: &mut RawSample) {
        if let Some(q) = self.quality {
            sample.quality = q;
        }
        for channel in Channel::ALL {
            if let Some(value) = self.values[channel.index()] {
                sample.set_channel(channel, value);
            }
        }
    }
}

fn quality_from_f64(value: f64) -> Option<SignalQuality> {
    if value < 0.0 {
        return None;
    }
    let clamped = value.round().min(f64::from(u16::MAX));
    Some(SignalQuality::new(clamped as u16))
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Tests
// ============================================================================
