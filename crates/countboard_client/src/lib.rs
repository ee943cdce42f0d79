//! # Countboard Client
//!
//! Client side of the shared counter board.
//!
//! This crate provides:
//! - The reconciler state machine (Loading → Ready) with self-echo
//!   suppression
//! - Local durability stores (in-memory and file-backed)
//! - The gateway transport trait with HTTP and mock implementations
//! - A session that picks push or poll and keeps the two in sync
//!
//! ## Transport selection
//!
//! A session first tries to subscribe. If the subscription is not
//! established within the subscribe timeout, or the gateway answers that
//! push is unavailable, it polls instead and retries the subscription
//! periodically. A push stream that drops switches back to polling. Only
//! one transport is active at a time.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod http;
mod local;
mod session;
mod state;
mod transport;

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use http::HttpTransport;
pub use local::{FileLocalStore, LocalStore, MemoryLocalStore};
pub use session::{ClientSession, TransportMode};
pub use state::{Reconciler, ReconcilerState, RemoteOutcome, OWN_MARKER_WINDOW};
pub use transport::{EventStream, GatewayTransport, MockTransport};
