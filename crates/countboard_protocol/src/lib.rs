//! # Countboard Protocol
//!
//! Data model and wire types shared by the counter board server and clients.
//!
//! This crate provides:
//! - [`Counter`] and [`CounterSet`] (ordered, unique names)
//! - [`UpdateMarker`] for change detection and self-echo suppression
//! - Request/response messages for Fetch, Save, Poll and Reset
//! - [`ChangeEvent`] broadcast to subscribers
//! - Server-sent event decoding ([`SseDecoder`])
//!
//! This is a pure protocol crate with no I/O operations. Every message is
//! JSON with camelCase field names.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod counter;
mod error;
mod marker;
mod messages;
mod sse;

pub use counter::{Counter, CounterSet, DEFAULT_ROSTER, RESET_ROSTER};
pub use error::{ProtocolError, ProtocolResult};
pub use marker::UpdateMarker;
pub use messages::{
    ChangeEvent, FetchResponse, PollResponse, ResetResponse, SaveRequest, SaveResponse,
    WireMessage,
};
pub use sse::{SseDecoder, SseFrame};

/// Key under which the counter record is stored, both server-side and in
/// client-local storage.
pub const STORAGE_KEY: &str = "asistencia-counters";

/// Pub/sub channel carrying change events.
pub const CHANNEL_NAME: &str = "counters-updates";
