//! Transport layer abstraction for gateway operations.

use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use countboard_protocol::{
    ChangeEvent, CounterSet, FetchResponse, PollResponse, SaveRequest, SaveResponse,
    UpdateMarker,
};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Stream of changes pushed by the gateway. Ends when the connection drops.
pub type EventStream = BoxStream<'static, ClientResult<ChangeEvent>>;

/// A gateway transport handles network communication with the sync gateway.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, mock for testing).
#[async_trait]
pub trait GatewayTransport: Send + Sync + 'static {
    /// Fetches the current counters.
    async fn fetch(&self) -> ClientResult<FetchResponse>;

    /// Saves a counter set.
    async fn save(&self, request: &SaveRequest) -> ClientResult<SaveResponse>;

    /// Opens a push subscription.
    async fn subscribe(&self) -> ClientResult<EventStream>;

    /// Asks whether anything changed since `last_update_id`.
    async fn poll(&self, last_update_id: Option<&UpdateMarker>) -> ClientResult<PollResponse>;
}

/// An in-memory gateway for testing.
///
/// Behaves like a gateway over an in-process store: saves are stored and
/// echoed to every open subscription, including the saver's own.
#[derive(Debug, Default)]
pub struct MockTransport {
    connected: AtomicBool,
    push_available: AtomicBool,
    state: Mutex<(CounterSet, Option<UpdateMarker>)>,
    saves: Mutex<Vec<SaveRequest>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ClientResult<ChangeEvent>>>>,
    subscribe_delay: Mutex<Option<Duration>>,
    subscribe_attempts: AtomicUsize,
    polls: AtomicUsize,
}

impl MockTransport {
    /// Creates a connected, push-capable mock at the default roster.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            push_available: AtomicBool::new(true),
            state: Mutex::new((CounterSet::default_roster(), None)),
            ..Default::default()
        }
    }

    /// Sets the connected state. Every call fails while disconnected.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Enables or disables push.
    pub fn set_push_available(&self, available: bool) {
        self.push_available.store(available, Ordering::SeqCst);
    }

    /// Delays every Subscribe by `delay`.
    pub fn set_subscribe_delay(&self, delay: Option<Duration>) {
        *self.subscribe_delay.lock() = delay;
    }

    /// Replaces the stored state without notifying anyone.
    pub fn set_state(&self, data: CounterSet, update_id: Option<UpdateMarker>) {
        *self.state.lock() = (data, update_id);
    }

    /// Simulates a Save from another client.
    pub fn push_remote(&self, event: ChangeEvent) {
        *self.state.lock() = (event.data.clone(), Some(event.update_id.clone()));
        self.broadcast(event);
    }

    /// Ends every open subscription.
    pub fn drop_streams(&self) {
        self.subscribers.lock().clear();
    }

    /// Saves received so far.
    pub fn saves(&self) -> Vec<SaveRequest> {
        self.saves.lock().clone()
    }

    /// Number of Subscribe calls.
    pub fn subscribe_attempts(&self) -> usize {
        self.subscribe_attempts.load(Ordering::SeqCst)
    }

    /// Number of Poll calls.
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    /// Number of open subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    fn broadcast(&self, event: ChangeEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(Ok(event.clone())).is_ok());
    }

    fn check_connected(&self) -> ClientResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ClientError::transport_retryable("mock gateway unreachable"))
        }
    }
}

#[async_trait]
impl GatewayTransport for MockTransport {
    async fn fetch(&self) -> ClientResult<FetchResponse> {
        self.check_connected()?;
        let (data, update_id) = self.state.lock().clone();
        Ok(FetchResponse {
            data,
            update_id,
            use_local_storage: false,
        })
    }

    async fn save(&self, request: &SaveRequest) -> ClientResult<SaveResponse> {
        self.check_connected()?;
        self.saves.lock().push(request.clone());
        self.push_remote(ChangeEvent::from(request.clone()));
        Ok(SaveResponse::accepted())
    }

    async fn subscribe(&self) -> ClientResult<EventStream> {
        self.subscribe_attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.subscribe_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_connected()?;
        if !self.push_available.load(Ordering::SeqCst) {
            return Err(ClientError::PushUnavailable);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        let events = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Ok(events.boxed())
    }

    async fn poll(&self, last_update_id: Option<&UpdateMarker>) -> ClientResult<PollResponse> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.check_connected()?;
        let (data, update_id) = self.state.lock().clone();
        Ok(match update_id {
            Some(current) if last_update_id != Some(&current) => {
                PollResponse::updated(data, current)
            }
            _ => PollResponse::unchanged(),
        })
    }
}
