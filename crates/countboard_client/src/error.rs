//! Error types for the client.

use countboard_protocol::ProtocolError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur on the client side.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Protocol error (invalid message format).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// The gateway cannot push changes.
    #[error("push not available")]
    PushUnavailable,

    /// The session has not finished loading.
    #[error("client is still loading")]
    NotReady,

    /// No counter with this name.
    #[error("unknown counter: {0}")]
    UnknownCounter(String),

    /// Local storage failed.
    #[error("local storage error: {0}")]
    LocalStore(String),
}

impl ClientError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport { retryable, .. } => *retryable,
            ClientError::Timeout | ClientError::PushUnavailable => true,
            _ => false,
        }
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::UnknownCounter(name) => ClientError::UnknownCounter(name),
            other => ClientError::Protocol(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_decode() {
            ClientError::Protocol(err.to_string())
        } else if let Some(status) = err.status() {
            if status.is_server_error() {
                ClientError::transport_retryable(err.to_string())
            } else {
                ClientError::transport_fatal(err.to_string())
            }
        } else {
            // connect, request and body errors
            ClientError::transport_retryable(err.to_string())
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::LocalStore(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(ClientError::transport_retryable("connection lost").is_retryable());
        assert!(!ClientError::transport_fatal("bad request").is_retryable());
        assert!(ClientError::Timeout.is_retryable());
        assert!(ClientError::PushUnavailable.is_retryable());
        assert!(!ClientError::NotReady.is_retryable());
        assert!(!ClientError::UnknownCounter("Zed".into()).is_retryable());
    }

    #[test]
    fn protocol_errors_convert() {
        let err: ClientError = ProtocolError::UnknownCounter("Zed".into()).into();
        assert!(matches!(err, ClientError::UnknownCounter(ref n) if n == "Zed"));

        let err: ClientError = ProtocolError::DuplicateName("Flo".into()).into();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn error_display() {
        assert_eq!(ClientError::NotReady.to_string(), "client is still loading");
        assert!(ClientError::UnknownCounter("Zed".into())
            .to_string()
            .contains("Zed"));
    }
}
