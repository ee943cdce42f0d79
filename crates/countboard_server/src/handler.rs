//! Request handlers for the gateway operations.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use countboard_protocol::{
    ChangeEvent, CounterSet, FetchResponse, PollResponse, ResetResponse, SaveRequest,
    SaveResponse, WireMessage, RESET_ROSTER,
};
use countboard_store::{BackendMode, StoreError, Subscription, SyncBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    backend: SyncBackend,
    shutdown: watch::Sender<bool>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, backend: SyncBackend) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            backend,
            shutdown,
        }
    }

    /// Returns the backend.
    pub fn backend(&self) -> &SyncBackend {
        &self.backend
    }

    /// Returns the backend mode.
    pub fn mode(&self) -> BackendMode {
        self.backend.mode()
    }

    /// Number of open subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.backend.notifier().subscriber_count()
    }

    /// Signals every open event stream to end.
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Returns true once shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves when shutdown begins.
    pub fn shutdown_signal(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown.subscribe();
        async move {
            let _ = rx.wait_for(|stopping| *stopping).await;
        }
    }
}

/// Handles gateway operations.
#[derive(Clone)]
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Returns the shared context.
    pub fn context(&self) -> &Arc<HandlerContext> {
        &self.context
    }

    /// Interval between keepalive comments on event streams.
    pub fn keepalive_interval(&self) -> Duration {
        self.context.config.keepalive_interval
    }

    /// Returns the current counters. Never fails.
    ///
    /// Without a backend, or when the store read fails, the reply carries
    /// the default roster and asks the client to use its local copy.
    pub async fn fetch(&self) -> FetchResponse {
        let backend = self.context.backend();
        if !backend.mode().has_store() {
            return FetchResponse {
                data: CounterSet::default_roster(),
                update_id: None,
                use_local_storage: true,
            };
        }
        let (state, degraded) = backend.store().read_degradable().await;
        FetchResponse {
            data: state.data,
            update_id: state.update_id,
            use_local_storage: degraded,
        }
    }

    /// Stores a new counter set and notifies subscribers.
    ///
    /// Only a malformed body is reported. Backend failures are logged and
    /// the write is acknowledged anyway.
    pub async fn save(&self, body: &[u8]) -> ServerResult<SaveResponse> {
        let request = SaveRequest::decode(body).map_err(|e| {
            debug!(error = %e, "rejected save payload");
            ServerError::MalformedPayload(e.to_string())
        })?;

        let backend = self.context.backend();
        if !backend.mode().has_store() {
            debug!("no backend, save acknowledged without storing");
            return Ok(SaveResponse::accepted());
        }

        backend
            .store()
            .write(&request.data, &request.update_id)
            .await;

        let event = ChangeEvent::from(request);
        if let Err(e) = backend.notifier().publish(&event).await {
            warn!(error = %e, update_id = %event.update_id, "failed to publish change");
        }
        debug!(update_id = %event.update_id, "counters saved");

        Ok(SaveResponse::accepted())
    }

    /// Reports whether the stored marker differs from `last_update_id`.
    pub async fn poll(&self, last_update_id: Option<&str>) -> PollResponse {
        self.context
            .backend()
            .store()
            .check_for_update(last_update_id)
            .await
    }

    /// Restores the reset roster.
    ///
    /// Nothing is published and the marker is cleared, so other clients are
    /// not notified. They keep their state until their next Save, which
    /// overwrites the reset.
    pub async fn reset(&self) -> ServerResult<ResetResponse> {
        let backend = self.context.backend();
        if !backend.mode().has_store() {
            return Err(ServerError::BackendUnavailable(
                "KV not available".to_string(),
            ));
        }

        match backend.store().reset().await {
            Ok(data) => {
                info!(counters = data.len(), "counters reset");
                Ok(ResetResponse::success(format!(
                    "Counters reset to default ({})",
                    RESET_ROSTER.join(", ")
                )))
            }
            Err(e) => {
                error!(error = %e, "reset failed");
                Err(ServerError::Internal(format!("failed to reset: {e}")))
            }
        }
    }

    /// Opens a subscription to change events.
    pub async fn subscribe(&self) -> ServerResult<Subscription> {
        let notifier = self.context.backend().notifier();
        if !notifier.supports_push() {
            return Err(ServerError::PushUnavailable(format!(
                "{} backend has no push",
                self.context.mode()
            )));
        }
        if self.context.is_shutting_down() {
            return Err(ServerError::PushUnavailable(
                "server shutting down".to_string(),
            ));
        }

        let timeout = self.context.config.subscribe_timeout;
        match tokio::time::timeout(timeout, notifier.subscribe()).await {
            Ok(Ok(subscription)) => Ok(subscription),
            Ok(Err(StoreError::PushUnavailable)) => Err(ServerError::PushUnavailable(
                "notifier refused subscription".to_string(),
            )),
            Ok(Err(e)) => {
                warn!(error = %e, "subscription failed");
                Err(ServerError::PushUnavailable(e.to_string()))
            }
            Err(_) => {
                warn!(?timeout, "subscription timed out");
                Err(ServerError::PushUnavailable(format!(
                    "subscription timed out after {timeout:?}"
                )))
            }
        }
    }

    /// Number of open subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.context.subscriber_count()
    }
}
