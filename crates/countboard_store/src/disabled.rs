//! Stand-ins for backends that are not configured.

use crate::backend::KvBackend;
use crate::error::{StoreError, StoreResult};
use crate::notifier::{ChangeNotifier, Subscription};
use async_trait::async_trait;
use countboard_protocol::ChangeEvent;

/// A key-value backend that is never reachable.
///
/// Used when no store is configured: the counter store degrades exactly as
/// it does for an outage.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledKv;

#[async_trait]
impl KvBackend for DisabledKv {
    fn backend_tag(&self) -> &'static str {
        "none"
    }

    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        Err(StoreError::Unavailable("no backend configured".into()))
    }

    async fn set(&self, _key: &str, _value: &str) -> StoreResult<()> {
        Err(StoreError::Unavailable("no backend configured".into()))
    }

    async fn del(&self, _key: &str) -> StoreResult<()> {
        Err(StoreError::Unavailable("no backend configured".into()))
    }
}

/// A notifier for backends without publish/subscribe.
///
/// Publishing is a no-op (pollers find the write through the stored
/// marker); subscribing fails with [`StoreError::PushUnavailable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledNotifier;

#[async_trait]
impl ChangeNotifier for DisabledNotifier {
    fn supports_push(&self) -> bool {
        false
    }

    async fn publish(&self, _event: &ChangeEvent) -> StoreResult<()> {
        Ok(())
    }

    async fn subscribe(&self) -> StoreResult<Subscription> {
        Err(StoreError::PushUnavailable)
    }

    fn subscriber_count(&self) -> usize {
        0
    }
}
