//! In-memory key-value backend.

use crate::backend::KvBackend;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-memory key-value backend.
///
/// Suitable for:
/// - Unit and integration tests
/// - Single-process development servers
///
/// The backend can be switched offline with [`set_available`](Self::set_available)
/// to exercise the degraded paths of the store.
#[derive(Debug)]
pub struct InMemoryKv {
    data: RwLock<HashMap<String, String>>,
    available: AtomicBool,
}

impl InMemoryKv {
    /// Creates a new empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Creates a backend with pre-existing entries.
    #[must_use]
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let data = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            data: RwLock::new(data),
            available: AtomicBool::new(true),
        }
    }

    /// Simulates the backend going offline (`false`) or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Returns the raw value of a key, bypassing availability.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.data.read().get(key).cloned()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory backend offline".into()))
        }
    }
}

impl Default for InMemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvBackend for InMemoryKv {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.check_available()?;
        Ok(self.data.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.check_available()?;
        self.data.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        self.check_available()?;
        self.data.write().remove(key);
        Ok(())
    }
}
