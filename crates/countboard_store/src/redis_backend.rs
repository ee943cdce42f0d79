//! Redis-backed key-value store and pub/sub notifier.

use crate::backend::KvBackend;
use crate::error::{StoreError, StoreResult};
use crate::notifier::{ChangeNotifier, Subscription};
use async_trait::async_trait;
use countboard_protocol::{ChangeEvent, WireMessage};
use futures::StreamExt;
use redis::aio::{MultiplexedConnection, PubSub};
use redis::{AsyncCommands, RedisResult};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

/// A lazily opened multiplexed connection, reopened after a failure.
#[derive(Clone)]
struct SharedConnection {
    client: redis::Client,
    slot: Arc<Mutex<Option<MultiplexedConnection>>>,
    timeout: Duration,
}

impl SharedConnection {
    fn open(url: &str, timeout: Duration) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            slot: Arc::new(Mutex::new(None)),
            timeout,
        })
    }

    async fn connection(&self) -> StoreResult<MultiplexedConnection> {
        let mut slot = self.slot.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        let conn = timeout(self.timeout, self.client.get_multiplexed_async_connection())
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))??;
        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn run<T, F, Fut>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.connection().await?;
        let result = match timeout(self.timeout, op(conn)).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => StoreError::Redis(e),
            Err(_) => StoreError::Timeout(self.timeout),
        };
        // Drop the cached connection so the next command reconnects.
        *self.slot.lock().await = None;
        Err(result)
    }
}

/// Key-value backend on a Redis server.
///
/// Every command is bounded by the configured timeout.
#[derive(Clone)]
pub struct RedisKv {
    conn: SharedConnection,
}

impl RedisKv {
    /// Creates a backend for `url` (e.g. `redis://127.0.0.1:6379`).
    ///
    /// No connection is made until the first command.
    pub fn open(url: &str, timeout: Duration) -> StoreResult<Self> {
        Ok(Self {
            conn: SharedConnection::open(url, timeout)?,
        })
    }
}

#[async_trait]
impl KvBackend for RedisKv {
    fn backend_tag(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let key = key.to_string();
        self.conn
            .run(|mut conn| async move { conn.get(key).await })
            .await
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.conn
            .run(|mut conn| async move { conn.set(key, value).await })
            .await
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        let key = key.to_string();
        self.conn
            .run(|mut conn| async move { conn.del(key).await })
            .await
    }
}

/// Push notifier on Redis pub/sub.
///
/// Publishing goes through a shared connection. Every subscription opens
/// its own pub/sub connection and a task forwarding messages into the
/// subscription's channel; when the subscription is dropped the task
/// unsubscribes and the connection is closed.
pub struct RedisNotifier {
    conn: SharedConnection,
    channel: String,
    active: Arc<AtomicUsize>,
}

impl RedisNotifier {
    /// Creates a notifier publishing on `channel`.
    ///
    /// `timeout` bounds both publish and establishing a subscription.
    pub fn open(url: &str, channel: impl Into<String>, timeout: Duration) -> StoreResult<Self> {
        Ok(Self {
            conn: SharedConnection::open(url, timeout)?,
            channel: channel.into(),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Returns the channel name.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    async fn open_pubsub(&self) -> StoreResult<PubSub> {
        let limit = self.conn.timeout;
        let mut pubsub = timeout(limit, self.conn.client.get_async_pubsub())
            .await
            .map_err(|_| StoreError::Timeout(limit))??;
        timeout(limit, pubsub.subscribe(self.channel.as_str()))
            .await
            .map_err(|_| StoreError::Timeout(limit))??;
        Ok(pubsub)
    }
}

#[async_trait]
impl ChangeNotifier for RedisNotifier {
    async fn publish(&self, event: &ChangeEvent) -> StoreResult<()> {
        let payload = event
            .encode()
            .map_err(|e| StoreError::Corrupted(e.to_string()))?;
        let channel = self.channel.clone();
        let receivers: i64 = self
            .conn
            .run(|mut conn| async move { conn.publish(channel, payload).await })
            .await?;
        debug!(update_id = %event.update_id, receivers, "change published");
        Ok(())
    }

    async fn subscribe(&self) -> StoreResult<Subscription> {
        let pubsub = self.open_pubsub().await?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.active.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(forward_messages(pubsub, self.channel.clone(), tx));

        let active = Arc::clone(&self.active);
        Ok(Subscription::new(rx, move || {
            active.fetch_sub(1, Ordering::SeqCst);
        }))
    }

    fn subscriber_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// Forwards pub/sub messages until the subscriber or the connection goes away.
async fn forward_messages(mut pubsub: PubSub, channel: String, tx: UnboundedSender<ChangeEvent>) {
    {
        let mut messages = pubsub.on_message();
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                message = messages.next() => {
                    let Some(message) = message else {
                        debug!(channel = %channel, "pub/sub stream ended");
                        break;
                    };
                    let payload: String = match message.get_payload() {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!(channel = %channel, error = %e, "unreadable pub/sub payload");
                            continue;
                        }
                    };
                    match ChangeEvent::decode(payload.as_bytes()) {
                        Ok(event) => {
                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(channel = %channel, error = %e, "malformed change event"),
                    }
                }
            }
        }
    }

    if let Err(e) = pubsub.unsubscribe(channel.as_str()).await {
        debug!(channel = %channel, error = %e, "unsubscribe failed, dropping connection");
    }
    debug!(channel = %channel, "pub/sub connection released");
}
