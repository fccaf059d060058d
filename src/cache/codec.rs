//! Encoding of cache payloads and write timestamps
//!
//! Payloads are stored as JSON text; timestamps as decimal epoch
//! milliseconds.

use chrono::{DateTime, TimeZone, Utc};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Errors produced while encoding or decoding a cache entry
#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload could not be serialized
    #[error("Failed to encode cache payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// Stored payload is not valid JSON for the requested type
    #[error("Failed to decode cache payload: {0}")]
    Decode(#[source] serde_json::Error),

    /// Stored timestamp is not an epoch-millis integer
    #[error("Invalid cache timestamp: '{0}'")]
    Timestamp(String),
}

/// Serializes a payload to its storage form
pub fn encode_payload<T: Serialize + ?Sized>(payload: &T) -> Result<String, CodecError> {
    serde_json::to_string(payload).map_err(CodecError::Encode)
}

/// Deserializes a stored payload
pub fn decode_payload<T: DeserializeOwned>(raw: &str) -> Result<T, CodecError> {
    serde_json::from_str(raw).map_err(CodecError::Decode)
}

/// Formats a write time as epoch milliseconds
pub fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.timestamp_millis().to_string()
}

/// Parses a stored write time
pub fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, CodecError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
        .ok_or_else(|| CodecError::Timestamp(raw.to_string()))
}
