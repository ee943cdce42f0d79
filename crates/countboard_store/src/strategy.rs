//! Backend strategy: a counter store paired with a change notifier.

use crate::backend::KvBackend;
use crate::counter_store::CounterStore;
use crate::disabled::{DisabledKv, DisabledNotifier};
use crate::error::StoreResult;
use crate::memory::InMemoryKv;
use crate::notifier::{ChangeNotifier, MemoryNotifier};
use crate::redis_backend::{RedisKv, RedisNotifier};
use crate::rest::RestKv;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Which kind of backend the process runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    /// Managed REST store, no push; clients poll.
    Managed,
    /// Self-hosted Redis with pub/sub.
    Local,
    /// Everything in this process; push through in-process channels.
    InProcess,
    /// No backend; clients rely on their local storage.
    LocalOnly,
}

impl BackendMode {
    /// Returns true if subscribers can be pushed to.
    pub fn supports_push(&self) -> bool {
        matches!(self, BackendMode::Local | BackendMode::InProcess)
    }

    /// Returns true if writes reach a shared store.
    pub fn has_store(&self) -> bool {
        !matches!(self, BackendMode::LocalOnly)
    }

    /// Short name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendMode::Managed => "managed",
            BackendMode::Local => "local",
            BackendMode::InProcess => "in-process",
            BackendMode::LocalOnly => "local-only",
        }
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The store and notifier a gateway runs against.
#[derive(Clone)]
pub struct SyncBackend {
    mode: BackendMode,
    store: CounterStore,
    notifier: Arc<dyn ChangeNotifier>,
}

impl SyncBackend {
    /// Assembles a backend from parts.
    pub fn from_parts(
        mode: BackendMode,
        kv: Arc<dyn KvBackend>,
        notifier: Arc<dyn ChangeNotifier>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            mode,
            store: CounterStore::with_key(kv, key),
            notifier,
        }
    }

    /// Managed REST store with polling.
    pub fn managed(
        url: &str,
        token: &str,
        key: impl Into<String>,
        timeout: Duration,
    ) -> StoreResult<Self> {
        let kv = RestKv::new(url, token, timeout)?;
        Ok(Self::from_parts(
            BackendMode::Managed,
            Arc::new(kv),
            Arc::new(DisabledNotifier),
            key,
        ))
    }

    /// Redis store with Redis pub/sub.
    pub fn redis(
        url: &str,
        channel: &str,
        key: impl Into<String>,
        timeout: Duration,
    ) -> StoreResult<Self> {
        let kv = RedisKv::open(url, timeout)?;
        let notifier = RedisNotifier::open(url, channel, timeout)?;
        Ok(Self::from_parts(
            BackendMode::Local,
            Arc::new(kv),
            Arc::new(notifier),
            key,
        ))
    }

    /// In-process store and notifier.
    pub fn in_process(key: impl Into<String>) -> Self {
        Self::from_parts(
            BackendMode::InProcess,
            Arc::new(InMemoryKv::new()),
            Arc::new(MemoryNotifier::new()),
            key,
        )
    }

    /// No backend at all.
    pub fn local_only(key: impl Into<String>) -> Self {
        Self::from_parts(
            BackendMode::LocalOnly,
            Arc::new(DisabledKv),
            Arc::new(DisabledNotifier),
            key,
        )
    }

    /// Returns the mode.
    pub fn mode(&self) -> BackendMode {
        self.mode
    }

    /// Returns the counter store.
    pub fn store(&self) -> &CounterStore {
        &self.store
    }

    /// Returns the notifier.
    pub fn notifier(&self) -> &Arc<dyn ChangeNotifier> {
        &self.notifier
    }
}

impl fmt::Debug for SyncBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncBackend")
            .field("mode", &self.mode)
            .field("backend", &self.store.backend_tag())
            .field("key", &self.store.key())
            .finish()
    }
}
