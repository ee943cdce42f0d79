//! Error types for store and notifier operations.

use std::time::Duration;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to a backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend is not configured or cannot be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend did not answer in time.
    #[error("backend timed out after {0:?}")]
    Timeout(Duration),

    /// The stored record could not be decoded.
    #[error("stored record corrupted: {0}")]
    Corrupted(String),

    /// The backend has no publish/subscribe primitive.
    #[error("push notifications not available")]
    PushUnavailable,

    /// A Redis command failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A request to the managed REST store failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl StoreError {
    /// Returns true if the failure means the backend is unreachable, as
    /// opposed to holding bad data.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable(_)
                | StoreError::Timeout(_)
                | StoreError::Redis(_)
                | StoreError::Http(_)
        )
    }
}
