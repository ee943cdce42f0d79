//! # Countboard Sync Gateway
//!
//! HTTP gateway in front of the shared counter store.
//!
//! ## Operations
//!
//! | Route            | Method | Operation                                   |
//! |------------------|--------|---------------------------------------------|
//! | `/counters`      | GET    | Fetch the current counters                  |
//! | `/counters`      | POST   | Save a counter set and notify subscribers   |
//! | `/events`        | GET    | Subscribe to changes (server-sent events)   |
//! | `/poll`          | GET    | Ask whether the stored marker has changed   |
//! | `/reset`         | POST   | Restore the reset roster                    |
//!
//! Every route is also mounted under `/api`.
//!
//! Backend outages never fail Fetch, Save or Poll. Subscribe answers
//! 503 when push is unavailable so clients fall back to polling.

#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod http;
mod server;

pub use config::{BackendConfig, ServerConfig, ENV_KV_TOKEN, ENV_KV_URL, ENV_REDIS_URL};
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use http::build_router;
pub use server::{connect_backend, CounterServer};
