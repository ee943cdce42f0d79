//! The counter store: one record holding the counter set and its marker.

use crate::backend::KvBackend;
use crate::error::{StoreError, StoreResult};
use countboard_protocol::{CounterSet, PollResponse, UpdateMarker, STORAGE_KEY};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// The persisted pair of counter set and update marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredState {
    /// Current counter set.
    pub data: CounterSet,
    /// Marker of the last write. Absent before the first write and after a
    /// reset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_id: Option<UpdateMarker>,
}

impl StoredState {
    /// The state of a board that was never written.
    pub fn initial() -> Self {
        Self {
            data: CounterSet::default_roster(),
            update_id: None,
        }
    }
}

/// Older deployments stored a bare counter array under the key.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRecord {
    Current(StoredState),
    Legacy(CounterSet),
}

/// Persists the counter set and marker as a single key-value record.
///
/// Every write replaces the whole record, so a reader never observes a
/// counter set paired with another write's marker. There is no version
/// check: concurrent writers race and the last one wins.
///
/// Two families of operations are offered:
/// - [`load`](Self::load) / [`store`](Self::store) surface backend errors
/// - [`read`](Self::read) / [`write`](Self::write) absorb them, returning the
///   default roster or pretending the write happened; clients keep a local
///   copy as the durability backstop
#[derive(Clone)]
pub struct CounterStore {
    backend: Arc<dyn KvBackend>,
    key: String,
}

impl CounterStore {
    /// Creates a store over `backend` using the default record key.
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self::with_key(backend, STORAGE_KEY)
    }

    /// Creates a store using a custom record key.
    pub fn with_key(backend: Arc<dyn KvBackend>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    /// Returns the record key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the backend tag, for logging.
    pub fn backend_tag(&self) -> &'static str {
        self.backend.backend_tag()
    }

    /// Reads the stored state, surfacing errors.
    ///
    /// A key that was never written yields [`StoredState::initial`].
    pub async fn load(&self) -> StoreResult<StoredState> {
        let Some(raw) = self.backend.get(&self.key).await? else {
            return Ok(StoredState::initial());
        };
        match serde_json::from_str::<StoredRecord>(&raw) {
            Ok(StoredRecord::Current(state)) => Ok(state),
            Ok(StoredRecord::Legacy(data)) => Ok(StoredState {
                data,
                update_id: None,
            }),
            Err(e) => Err(StoreError::Corrupted(e.to_string())),
        }
    }

    /// Reads the stored state, degrading to the initial state on failure.
    pub async fn read(&self) -> StoredState {
        self.read_degradable().await.0
    }

    /// Like [`read`](Self::read), also returning `true` when the read
    /// degraded. Callers tell clients to fall back to their local copy.
    pub async fn read_degradable(&self) -> (StoredState, bool) {
        match self.load().await {
            Ok(state) => (state, false),
            Err(e) => {
                warn!(
                    backend = self.backend_tag(),
                    error = %e,
                    "counter read failed, serving default roster"
                );
                (StoredState::initial(), true)
            }
        }
    }

    /// Replaces the stored state, surfacing errors.
    pub async fn store(&self, data: &CounterSet, marker: &UpdateMarker) -> StoreResult<()> {
        let record = StoredState {
            data: data.clone(),
            update_id: Some(marker.clone()),
        };
        let encoded =
            serde_json::to_string(&record).map_err(|e| StoreError::Corrupted(e.to_string()))?;
        self.backend.set(&self.key, &encoded).await?;
        debug!(backend = self.backend_tag(), update_id = %marker, "counters stored");
        Ok(())
    }

    /// Replaces the stored state; a backend failure is logged and dropped.
    pub async fn write(&self, data: &CounterSet, marker: &UpdateMarker) {
        if let Err(e) = self.store(data, marker).await {
            warn!(
                backend = self.backend_tag(),
                update_id = %marker,
                error = %e,
                "counter write failed, relying on client-local copy"
            );
        }
    }

    /// Restores the reset roster and clears the marker.
    ///
    /// Unlike [`write`](Self::write), failures are returned.
    pub async fn reset(&self) -> StoreResult<CounterSet> {
        let data = CounterSet::reset_roster();
        let record = StoredState {
            data: data.clone(),
            update_id: None,
        };
        let encoded =
            serde_json::to_string(&record).map_err(|e| StoreError::Corrupted(e.to_string()))?;
        self.backend.del(&self.key).await?;
        self.backend.set(&self.key, &encoded).await?;
        Ok(data)
    }

    /// Tells a poller whether a write newer than `last_seen` is stored.
    ///
    /// There is an update only when a marker is stored and it differs from
    /// `last_seen`. Backend failures read as "nothing new".
    pub async fn check_for_update(&self, last_seen: Option<&str>) -> PollResponse {
        let state = match self.load().await {
            Ok(state) => state,
            Err(e) => {
                debug!(backend = self.backend_tag(), error = %e, "poll check failed");
                return PollResponse::unchanged();
            }
        };
        match state.update_id {
            Some(marker) if Some(marker.as_str()) != last_seen => {
                PollResponse::updated(state.data, marker)
            }
            _ => PollResponse::unchanged(),
        }
    }
}
