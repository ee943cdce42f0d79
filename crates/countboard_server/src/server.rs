//! Gateway server.

use crate::config::{BackendConfig, ServerConfig};
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use crate::http::build_router;
use axum::Router;
use countboard_store::{BackendMode, SyncBackend};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Connects the backend named by the configuration.
pub fn connect_backend(config: &ServerConfig) -> ServerResult<SyncBackend> {
    let key = config.storage_key.clone();
    let backend = match &config.backend {
        BackendConfig::Managed { url, token } => {
            SyncBackend::managed(url, token, key, config.backend_timeout)
        }
        BackendConfig::Redis { url } => {
            SyncBackend::redis(url, &config.channel, key, config.backend_timeout)
        }
        BackendConfig::InProcess => Ok(SyncBackend::in_process(key)),
        BackendConfig::LocalOnly => Ok(SyncBackend::local_only(key)),
    };
    backend.map_err(|e| ServerError::BackendUnavailable(e.to_string()))
}

/// The sync gateway.
///
/// ```ignore
/// let server = CounterServer::new(ServerConfig::default())?;
/// server.run().await?;
/// ```
pub struct CounterServer {
    context: Arc<HandlerContext>,
    handler: RequestHandler,
}

impl CounterServer {
    /// Creates a server, connecting the configured backend.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let backend = connect_backend(&config)?;
        Ok(Self::with_backend(config, backend))
    }

    /// Creates a server over an already assembled backend.
    pub fn with_backend(config: ServerConfig, backend: SyncBackend) -> Self {
        let context = Arc::new(HandlerContext::new(config, backend));
        let handler = RequestHandler::new(Arc::clone(&context));
        Self { context, handler }
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Returns the shared handler context.
    pub fn context(&self) -> Arc<HandlerContext> {
        Arc::clone(&self.context)
    }

    /// Returns the request handler.
    pub fn handler(&self) -> &RequestHandler {
        &self.handler
    }

    /// Returns the backend mode.
    pub fn mode(&self) -> BackendMode {
        self.context.mode()
    }

    /// Builds the router for this server.
    pub fn router(&self) -> Router {
        build_router(self.handler.clone())
    }

    /// Serves on `listener` until `shutdown` resolves.
    ///
    /// Open event streams end as soon as shutdown begins.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(%addr, mode = %self.mode(), "gateway listening");

        let context = Arc::clone(&self.context);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!(
                    open_streams = context.subscriber_count(),
                    "shutdown requested"
                );
                context.begin_shutdown();
            })
            .await?;

        info!("gateway stopped");
        Ok(())
    }

    /// Binds the configured address and serves until Ctrl-C.
    pub async fn run(self) -> ServerResult<()> {
        let listener = TcpListener::bind(self.config().bind_addr).await?;
        self.serve(listener, ctrl_c()).await
    }

    /// Binds `addr` and returns the listener with its actual address.
    pub async fn bind(addr: SocketAddr) -> ServerResult<(TcpListener, SocketAddr)> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        Ok((listener, local))
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
