//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while building or decoding protocol values.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Two counters in one set share a name.
    #[error("duplicate counter name: {0}")]
    DuplicateName(String),

    /// A counter name that is not part of the set.
    #[error("unknown counter: {0}")]
    UnknownCounter(String),

    /// A server-sent event block could not be decoded.
    #[error("invalid event frame: {0}")]
    InvalidFrame(String),
}

impl ProtocolError {
    /// Returns true if the error describes a malformed payload sent by a peer.
    pub fn is_malformed_payload(&self) -> bool {
        matches!(
            self,
            ProtocolError::Json(_) | ProtocolError::DuplicateName(_) | ProtocolError::InvalidFrame(_)
        )
    }
}
