//! Error types for the sync gateway.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use countboard_protocol::ResetResponse;
use thiserror::Error;

/// Result type for gateway operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors the gateway reports to callers.
///
/// Backend outages during Fetch, Save and Poll never get here: they are
/// absorbed by the counter store. Only Reset, Subscribe and malformed input
/// produce these.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The request body is not a valid counter set.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// No backend is configured, or it is unreachable.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Push notifications cannot be delivered on this backend.
    #[error("push not available: {0}")]
    PushUnavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(self, ServerError::MalformedPayload(_))
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            ServerError::BackendUnavailable(_) | ServerError::PushUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServerError::Internal(_) | ServerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            // Event-stream clients only look at the status.
            ServerError::PushUnavailable(_) => (status, "SSE not available").into_response(),
            other => (status, Json(ResetResponse::error(other.to_string()))).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::MalformedPayload("bad".into()).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(!ServerError::MalformedPayload("bad".into()).is_server_error());
        assert!(ServerError::BackendUnavailable("down".into()).is_server_error());
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            ServerError::MalformedPayload("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::PushUnavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServerError::BackendUnavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServerError::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn response_carries_status() {
        let response = ServerError::MalformedPayload("bad json".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
