//! # Countboard Store
//!
//! Persistence and change notification for the counter board.
//!
//! This crate provides:
//! - [`KvBackend`], an opaque string key-value store, with in-memory,
//!   Redis and managed REST implementations
//! - [`CounterStore`], which keeps the counter set and its update marker
//!   as one record and degrades to defaults when the backend is down
//! - [`ChangeNotifier`], the publish/subscribe channel for change events,
//!   with in-process and Redis push strategies
//! - [`SyncBackend`], the strategy object pairing a store with a notifier
//!
//! ## Backend modes
//!
//! | mode | store | push |
//! |------|-------|------|
//! | [`BackendMode::Managed`] | REST key-value | no (poll only) |
//! | [`BackendMode::Local`] | Redis | Redis pub/sub |
//! | [`BackendMode::InProcess`] | memory | in-process channels |
//! | [`BackendMode::LocalOnly`] | none | no |
//!
//! The mode is chosen once when the process starts.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod counter_store;
mod disabled;
mod error;
mod memory;
mod notifier;
mod redis_backend;
mod rest;
mod strategy;

pub use backend::KvBackend;
pub use counter_store::{CounterStore, StoredState};
pub use disabled::{DisabledKv, DisabledNotifier};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryKv;
pub use notifier::{ChangeNotifier, MemoryNotifier, Subscription};
pub use redis_backend::{RedisKv, RedisNotifier};
pub use rest::RestKv;
pub use strategy::{BackendMode, SyncBackend};
