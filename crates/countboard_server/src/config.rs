//! Server configuration.

use countboard_protocol::{CHANNEL_NAME, STORAGE_KEY};
use countboard_store::BackendMode;
use std::net::SocketAddr;
use std::time::Duration;

/// Environment variable holding the managed store URL.
pub const ENV_KV_URL: &str = "KV_REST_API_URL";
/// Environment variable holding the managed store token.
pub const ENV_KV_TOKEN: &str = "KV_REST_API_TOKEN";
/// Environment variable holding the Redis URL.
pub const ENV_REDIS_URL: &str = "REDIS_URL";

/// Which backend to run against, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// Managed REST store (no push).
    Managed {
        /// Store base URL.
        url: String,
        /// Bearer token.
        token: String,
    },
    /// Self-hosted Redis (push through pub/sub).
    Redis {
        /// Redis connection URL.
        url: String,
    },
    /// In-process store and notifier.
    InProcess,
    /// No backend; clients keep their own copy.
    LocalOnly,
}

impl BackendConfig {
    /// Resolves the backend from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolves the backend from an arbitrary variable lookup.
    ///
    /// Managed credentials win over a Redis URL; with neither the server
    /// runs client-local-only. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let (Some(url), Some(token)) = (var(ENV_KV_URL), var(ENV_KV_TOKEN)) {
            return BackendConfig::Managed { url, token };
        }
        match var(ENV_REDIS_URL) {
            Some(url) => BackendConfig::Redis { url },
            None => BackendConfig::LocalOnly,
        }
    }

    /// The mode this configuration selects.
    pub fn mode(&self) -> BackendMode {
        match self {
            BackendConfig::Managed { .. } => BackendMode::Managed,
            BackendConfig::Redis { .. } => BackendMode::Local,
            BackendConfig::InProcess => BackendMode::InProcess,
            BackendConfig::LocalOnly => BackendMode::LocalOnly,
        }
    }
}

/// Configuration for the sync gateway.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Interval between keepalive comments on event streams.
    pub keepalive_interval: Duration,
    /// How long a subscription may take to establish before the request
    /// is answered with "not available".
    pub subscribe_timeout: Duration,
    /// Timeout for individual backend commands.
    pub backend_timeout: Duration,
    /// Key of the counter record.
    pub storage_key: String,
    /// Pub/sub channel name.
    pub channel: String,
    /// Backend selection.
    pub backend: BackendConfig,
}

impl ServerConfig {
    /// Creates a configuration with defaults for everything but the address.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            keepalive_interval: Duration::from_secs(30),
            subscribe_timeout: Duration::from_secs(3),
            backend_timeout: Duration::from_secs(2),
            storage_key: STORAGE_KEY.to_string(),
            channel: CHANNEL_NAME.to_string(),
            backend: BackendConfig::LocalOnly,
        }
    }

    /// Sets the keepalive interval.
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Sets the subscribe timeout.
    pub fn with_subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = timeout;
        self
    }

    /// Sets the backend command timeout.
    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    /// Sets the counter record key.
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    /// Sets the pub/sub channel.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Sets the backend.
    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 3000)))
    }
}
