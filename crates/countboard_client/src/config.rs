//! Configuration for client sessions.

use countboard_protocol::STORAGE_KEY;
use std::time::Duration;

/// Configuration for a client session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Gateway base URL, e.g. `http://127.0.0.1:3000`.
    pub base_url: String,
    /// Interval between polls when push is unavailable.
    pub poll_interval: Duration,
    /// How long to wait for a subscription before falling back to polling.
    pub subscribe_timeout: Duration,
    /// How often to retry Subscribe while polling.
    pub resubscribe_interval: Duration,
    /// Timeout for Fetch, Save and Poll requests.
    pub request_timeout: Duration,
    /// Key under which the local copy is kept.
    pub local_key: String,
}

impl ClientConfig {
    /// Creates a configuration for the given gateway.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            poll_interval: Duration::from_secs(2),
            subscribe_timeout: Duration::from_secs(3),
            resubscribe_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
            local_key: STORAGE_KEY.to_string(),
        }
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the subscribe timeout.
    pub fn with_subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = timeout;
        self
    }

    /// Sets the resubscribe interval.
    pub fn with_resubscribe_interval(mut self, interval: Duration) -> Self {
        self.resubscribe_interval = interval;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the local storage key.
    pub fn with_local_key(mut self, key: impl Into<String>) -> Self {
        self.local_key = key.into();
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://127.0.0.1:3000")
    }
}
