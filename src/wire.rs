//! Intake → Ingest wire contract.
//!
//! One TCP connection carries exactly one UTF-8 JSON object
//! `{"username": ..., "message": ...}`. There is no length prefix, no version
//! field and no acknowledgment; the sender closes the connection after writing.

use crate::message::SubmittedMessage;
use std::fmt;

/// Default upper bound on a single relayed payload, in bytes
pub const DEFAULT_MAX_PAYLOAD: usize = 1024;

/// Error type for payload decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    Malformed(String),
    TooLarge { limit: usize },
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Malformed(msg) => write!(f, "Malformed payload: {}", msg),
            WireError::TooLarge { limit } => {
                write!(f, "Payload exceeds {} bytes", limit)
            }
        }
    }
}

impl std::error::Error for WireError {}

impl From<serde_json::Error> for WireError {
    fn from(err: serde_json::Error) -> Self {
        WireError::Malformed(err.to_string())
    }
}

/// Serialize a message into the bytes written on the relay connection
pub fn encode(message: &SubmittedMessage) -> Result<Vec<u8>, WireError> {
    Ok(serde_json::to_vec(message)?)
}

/// Decode a received payload.
///
/// Unknown keys are ignored; a missing `username` or `message`, a non-string
/// value, invalid UTF-8 or invalid JSON all yield [`WireError::Malformed`].
pub fn decode(bytes: &[u8]) -> Result<SubmittedMessage, WireError> {
    // Require an object; serde would otherwise accept a two-element array
    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(bytes)?;
    Ok(serde_json::from_value(serde_json::Value::Object(object))?)
}

/// Whether `bytes` already hold one complete JSON value of any shape.
///
/// Used to stop reading a connection that stays open after the sender is done,
/// whether or not the value turns out to be a valid message.
pub fn is_complete(bytes: &[u8]) -> bool {
    serde_json::from_slice::<serde::de::IgnoredAny>(bytes).is_ok()
}
