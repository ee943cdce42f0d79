//! Key-value backend trait definition.

use crate::error::StoreResult;
use async_trait::async_trait;

/// An opaque string key-value store.
///
/// Backends do not interpret values; the [`CounterStore`](crate::CounterStore)
/// owns the record format.
///
/// # Invariants
///
/// - `set` replaces the whole value of a key in one step, so a concurrent
///   `get` sees either the old or the new value
/// - `get` on a missing key returns `Ok(None)`
/// - `del` on a missing key succeeds
#[async_trait]
pub trait KvBackend: Send + Sync + 'static {
    /// Short name used in logs.
    fn backend_tag(&self) -> &'static str;

    /// Reads the value of `key`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Replaces the value of `key`.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Removes `key`.
    async fn del(&self, key: &str) -> StoreResult<()>;
}
