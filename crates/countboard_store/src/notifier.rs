//! Change notification: publish/subscribe for counter writes.
//!
//! Delivery is best-effort and live-only. A subscriber that connects after
//! a publish never sees it; there is no backlog.
//!
//! # Usage
//!
//! ```rust,ignore
//! let notifier = MemoryNotifier::new();
//! let mut subscription = notifier.subscribe().await?;
//!
//! notifier.publish(&event).await?;
//! assert_eq!(subscription.recv().await, Some(event));
//!
//! drop(subscription);
//! assert_eq!(notifier.subscriber_count(), 0);
//! ```

use crate::error::StoreResult;
use async_trait::async_trait;
use countboard_protocol::ChangeEvent;
use futures::Stream;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// A broadcast channel for change events.
#[async_trait]
pub trait ChangeNotifier: Send + Sync + 'static {
    /// Returns true if [`subscribe`](Self::subscribe) can succeed at all.
    fn supports_push(&self) -> bool {
        true
    }

    /// Broadcasts an event to every current subscriber.
    ///
    /// Returns once the event is handed off; delivery is not acknowledged.
    async fn publish(&self, event: &ChangeEvent) -> StoreResult<()>;

    /// Opens a live subscription.
    async fn subscribe(&self) -> StoreResult<Subscription>;

    /// Number of subscriptions that have not been closed.
    fn subscriber_count(&self) -> usize;
}

/// A live, non-restartable sequence of change events.
///
/// Dropping (or [`close`](Self::close)-ing) the subscription releases it
/// from its notifier immediately, and with it any backend connection opened
/// for it.
pub struct Subscription {
    receiver: UnboundedReceiver<ChangeEvent>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wraps a receiver and the hook that unregisters it.
    pub fn new(
        receiver: UnboundedReceiver<ChangeEvent>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            receiver,
            release: Some(Box::new(release)),
        }
    }

    /// Waits for the next event. `None` once the notifier side is gone.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.recv().await
    }

    /// Closes the subscription.
    pub fn close(self) {
        drop(self);
    }
}

impl Stream for Subscription {
    type Item = ChangeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ChangeEvent>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.receiver.close();
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("released", &self.release.is_none())
            .finish()
    }
}

type Registry = Arc<RwLock<HashMap<u64, UnboundedSender<ChangeEvent>>>>;

/// An in-process notifier.
///
/// Each subscriber owns an unbounded channel registered here; publishing
/// clones the event into every channel and prunes the ones whose receiver
/// is gone.
pub struct MemoryNotifier {
    subscribers: Registry,
    next_id: AtomicU64,
}

impl MemoryNotifier {
    /// Creates a notifier with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for MemoryNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeNotifier for MemoryNotifier {
    async fn publish(&self, event: &ChangeEvent) -> StoreResult<()> {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|_, tx| tx.send(event.clone()).is_ok());
        debug!(
            update_id = %event.update_id,
            subscribers = subscribers.len(),
            "change published"
        );
        Ok(())
    }

    async fn subscribe(&self) -> StoreResult<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().insert(id, tx);

        let registry = Arc::clone(&self.subscribers);
        Ok(Subscription::new(rx, move || {
            registry.write().remove(&id);
        }))
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use countboard_protocol::{CounterSet, UpdateMarker};
    use futures::StreamExt;
    use std::time::Duration;

    fn event(id: &str) -> ChangeEvent {
        ChangeEvent::new(CounterSet::default_roster(), UpdateMarker::new(id))
    }

    #[tokio::test]
    async fn publish_and_receive() {
        let notifier = MemoryNotifier::new();
        let mut sub = notifier.subscribe().await.unwrap();

        notifier.publish(&event("m1")).await.unwrap();
        assert_eq!(sub.recv().await, Some(event("m1")));
    }

    #[tokio::test]
    async fn multiple_subscribers() {
        let notifier = MemoryNotifier::new();
        let mut sub1 = notifier.subscribe().await.unwrap();
        let mut sub2 = notifier.subscribe().await.unwrap();
        assert_eq!(notifier.subscriber_count(), 2);

        notifier.publish(&event("m1")).await.unwrap();
        assert_eq!(sub1.recv().await, Some(event("m1")));
        assert_eq!(sub2.recv().await, Some(event("m1")));
    }

    #[tokio::test]
    async fn late_subscriber_gets_no_backlog() {
        let notifier = MemoryNotifier::new();
        notifier.publish(&event("m1")).await.unwrap();

        let mut sub = notifier.subscribe().await.unwrap();
        let next = tokio::time::timeout(Duration::from_millis(50), sub.recv()).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn drop_releases_subscription() {
        let notifier = MemoryNotifier::new();
        let sub1 = notifier.subscribe().await.unwrap();
        let sub2 = notifier.subscribe().await.unwrap();

        drop(sub1);
        assert_eq!(notifier.subscriber_count(), 1);

        sub2.close();
        assert_eq!(notifier.subscriber_count(), 0);

        // Publishing to nobody is fine
        notifier.publish(&event("m1")).await.unwrap();
    }

    #[tokio::test]
    async fn subscription_is_a_stream() {
        let notifier = MemoryNotifier::new();
        let sub = notifier.subscribe().await.unwrap();

        notifier.publish(&event("a")).await.unwrap();
        notifier.publish(&event("b")).await.unwrap();

        let received: Vec<_> = sub.take(2).collect().await;
        assert_eq!(received, vec![event("a"), event("b")]);
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn events_keep_publish_order() {
        let notifier = MemoryNotifier::new();
        let mut sub = notifier.subscribe().await.unwrap();
        for i in 0..100 {
            notifier.publish(&event(&format!("m{i}"))).await.unwrap();
        }
        for i in 0..100 {
            let received = sub.recv().await.unwrap();
            assert_eq!(received.update_id.as_str(), format!("m{i}"));
        }
    }
}
