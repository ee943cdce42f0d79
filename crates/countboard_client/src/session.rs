//! Client session: reconciler, local backstop and transport selection.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::local::LocalStore;
use crate::state::{Reconciler, ReconcilerState, RemoteOutcome};
use crate::transport::{EventStream, GatewayTransport};
use countboard_protocol::{ChangeEvent, CounterSet};
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Which transport currently delivers remote changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// No sync task running.
    Idle,
    /// Trying to open a push subscription.
    Connecting,
    /// Receiving pushed changes.
    Push,
    /// Polling at the configured interval.
    Poll,
}

impl TransportMode {
    /// Returns true if remote changes are being received.
    pub fn is_active(&self) -> bool {
        matches!(self, TransportMode::Push | TransportMode::Poll)
    }
}

struct SessionInner<T: GatewayTransport> {
    config: ClientConfig,
    transport: T,
    local: Box<dyn LocalStore>,
    reconciler: RwLock<Reconciler>,
    mode: RwLock<TransportMode>,
    changes: watch::Sender<CounterSet>,
}

/// A client of the counter board.
///
/// ```ignore
/// let transport = HttpTransport::new(&config)?;
/// let session = ClientSession::new(config, transport, MemoryLocalStore::new());
/// session.load().await?;
/// session.start()?;
/// session.increment("Ara").await?;
/// ```
pub struct ClientSession<T: GatewayTransport> {
    inner: Arc<SessionInner<T>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<T: GatewayTransport> ClientSession<T> {
    /// Creates a session. Nothing is fetched until [`load`](Self::load).
    pub fn new(config: ClientConfig, transport: T, local: impl LocalStore + 'static) -> Self {
        let reconciler = Reconciler::new();
        let (changes, _) = watch::channel(reconciler.counters().clone());
        Self {
            inner: Arc::new(SessionInner {
                config,
                transport,
                local: Box::new(local),
                reconciler: RwLock::new(reconciler),
                mode: RwLock::new(TransportMode::Idle),
                changes,
            }),
            task: Mutex::new(None),
        }
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Current counters.
    pub fn counters(&self) -> CounterSet {
        self.inner.reconciler.read().counters().clone()
    }

    /// Reconciler state.
    pub fn state(&self) -> ReconcilerState {
        self.inner.reconciler.read().state()
    }

    /// Snapshot of the reconciler.
    pub fn reconciler(&self) -> Reconciler {
        self.inner.reconciler.read().clone()
    }

    /// Current transport mode.
    pub fn transport_mode(&self) -> TransportMode {
        *self.inner.mode.read()
    }

    /// Watches the counters. The receiver sees every local and applied
    /// remote change.
    pub fn watch(&self) -> watch::Receiver<CounterSet> {
        self.inner.changes.subscribe()
    }

    /// Loads the initial counters.
    ///
    /// Uses the gateway when reachable. Falls back to the local copy when
    /// the gateway is unreachable or runs without a backend, and to the
    /// default roster when there is no local copy either.
    pub async fn load(&self) -> ClientResult<CounterSet> {
        let inner = &self.inner;
        let (counters, update_id) = match inner.transport.fetch().await {
            Ok(response) if response.use_local_storage => {
                debug!("gateway has no backend, using local copy");
                let counters = inner.read_local().unwrap_or(response.data);
                (counters, None)
            }
            Ok(response) => (response.data, response.update_id),
            Err(e) => {
                warn!(error = %e, "fetch failed, using local copy");
                let counters = inner
                    .read_local()
                    .unwrap_or_else(CounterSet::default_roster);
                (counters, None)
            }
        };

        inner.reconciler.write().seed(counters.clone(), update_id);
        inner.persist(&counters)?;
        inner.changes.send_replace(counters.clone());
        info!(counters = counters.len(), "session loaded");
        Ok(counters)
    }

    /// Adds one to a counter.
    pub async fn increment(&self, name: &str) -> ClientResult<CounterSet> {
        self.apply_delta(name, 1).await
    }

    /// Subtracts one from a counter.
    pub async fn decrement(&self, name: &str) -> ClientResult<CounterSet> {
        self.apply_delta(name, -1).await
    }

    /// Applies a local edit, keeps a local copy, and saves it.
    ///
    /// A failed Save is logged, not returned: the edit stays applied
    /// locally.
    pub async fn apply_delta(&self, name: &str, delta: i64) -> ClientResult<CounterSet> {
        let inner = &self.inner;
        let request = inner.reconciler.write().apply_delta(name, delta)?;
        let counters = request.data.clone();

        inner.persist(&counters)?;
        inner.changes.send_replace(counters.clone());

        if let Err(e) = inner.transport.save(&request).await {
            warn!(error = %e, update_id = %request.update_id, "save failed, kept locally");
        }
        Ok(counters)
    }

    /// Starts receiving remote changes. Does nothing if already started.
    pub fn start(&self) -> ClientResult<()> {
        if !self.state().is_ready() {
            return Err(ClientError::NotReady);
        }
        let mut task = self.task.lock();
        if task.as_ref().map_or(false, |t| !t.is_finished()) {
            return Ok(());
        }
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(async move { inner.run_sync().await }));
        Ok(())
    }

    /// Stops receiving remote changes.
    pub fn close(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.inner.set_mode(TransportMode::Idle);
    }
}

impl<T: GatewayTransport> Drop for ClientSession<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

impl<T: GatewayTransport> SessionInner<T> {
    fn set_mode(&self, mode: TransportMode) {
        let previous = std::mem::replace(&mut *self.mode.write(), mode);
        if previous != mode {
            debug!(from = ?previous, to = ?mode, "transport mode changed");
        }
    }

    fn read_local(&self) -> Option<CounterSet> {
        let raw = match self.local.get_item(&self.config.local_key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "local copy unreadable");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(counters) => Some(counters),
            Err(e) => {
                warn!(error = %e, "local copy corrupted, ignoring");
                None
            }
        }
    }

    fn persist(&self, counters: &CounterSet) -> ClientResult<()> {
        let raw = serde_json::to_string(counters)
            .map_err(|e| ClientError::LocalStore(e.to_string()))?;
        self.local.set_item(&self.config.local_key, &raw)
    }

    fn handle_remote(&self, event: ChangeEvent) {
        let update_id = event.update_id.clone();
        let outcome = self.reconciler.write().apply_remote(event);
        match outcome {
            RemoteOutcome::Applied => {
                let counters = self.reconciler.read().counters().clone();
                if let Err(e) = self.persist(&counters) {
                    warn!(error = %e, "failed to keep local copy");
                }
                self.changes.send_replace(counters);
                debug!(%update_id, "applied remote change");
            }
            RemoteOutcome::SelfEcho => debug!(%update_id, "own change echoed back"),
            RemoteOutcome::Ignored => debug!(%update_id, "change ignored while loading"),
        }
    }

    async fn run_sync(self: Arc<Self>) {
        loop {
            if let Some(stream) = self.try_subscribe().await {
                self.set_mode(TransportMode::Push);
                self.consume(stream).await;
                warn!("push stream dropped, falling back to polling");
            }
            self.set_mode(TransportMode::Poll);
            self.poll_until_resubscribe().await;
        }
    }

    async fn try_subscribe(&self) -> Option<EventStream> {
        self.set_mode(TransportMode::Connecting);
        let limit = self.config.subscribe_timeout;
        match timeout(limit, self.transport.subscribe()).await {
            Ok(Ok(stream)) => {
                info!("push subscription established");
                Some(stream)
            }
            Ok(Err(ClientError::PushUnavailable)) => {
                debug!("push not available, polling");
                None
            }
            Ok(Err(e)) => {
                warn!(error = %e, "subscribe failed, polling");
                None
            }
            Err(_) => {
                warn!(timeout = ?limit, "subscribe timed out, polling");
                None
            }
        }
    }

    async fn consume(&self, mut stream: EventStream) {
        while let Some(item) = stream.next().await {
            match item {
                Ok(event) => self.handle_remote(event),
                Err(e) => {
                    warn!(error = %e, "push stream failed");
                    break;
                }
            }
        }
    }

    async fn poll_until_resubscribe(&self) {
        let period = self.config.poll_interval;
        let deadline = Instant::now() + self.config.resubscribe_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = sleep_until(deadline) => return,
                _ = ticker.tick() => self.poll_once().await,
            }
        }
    }

    async fn poll_once(&self) {
        let marker = self.reconciler.read().poll_marker().cloned();
        match self.transport.poll(marker.as_ref()).await {
            Ok(response) => {
                if let Some(event) = response.into_event() {
                    self.handle_remote(event);
                }
            }
            Err(e) => debug!(error = %e, "poll failed"),
        }
    }
}
