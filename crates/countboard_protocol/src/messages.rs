//! Protocol messages exchanged between clients and the gateway.

use crate::counter::CounterSet;
use crate::error::ProtocolResult;
use crate::marker::UpdateMarker;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// JSON encoding shared by every message type.
pub trait WireMessage: Serialize + DeserializeOwned {
    /// Encodes self to a JSON string.
    fn encode(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes self from JSON bytes.
    fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Body of a Save request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    /// The complete counter set after the client's change.
    pub data: CounterSet,
    /// Marker generated by the client for this write.
    pub update_id: UpdateMarker,
}

impl SaveRequest {
    /// Creates a save request.
    pub fn new(data: CounterSet, update_id: UpdateMarker) -> Self {
        Self { data, update_id }
    }
}

/// Response to a Save request.
///
/// `success` means "accepted", not "durably persisted".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResponse {
    /// Whether the write was accepted.
    pub success: bool,
}

impl SaveResponse {
    /// An accepted save.
    pub fn accepted() -> Self {
        Self { success: true }
    }
}

/// Response to a Fetch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResponse {
    /// Current counter set.
    pub data: CounterSet,
    /// Marker of the last write, if any was stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_id: Option<UpdateMarker>,
    /// True when the server has no backend and clients should rely on
    /// their local storage.
    #[serde(default)]
    pub use_local_storage: bool,
}

/// A change broadcast to subscribers after every Save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// The counter set that was written.
    pub data: CounterSet,
    /// Marker of the write.
    pub update_id: UpdateMarker,
}

impl ChangeEvent {
    /// Creates a change event.
    pub fn new(data: CounterSet, update_id: UpdateMarker) -> Self {
        Self { data, update_id }
    }
}

impl From<SaveRequest> for ChangeEvent {
    fn from(request: SaveRequest) -> Self {
        Self::new(request.data, request.update_id)
    }
}

/// Response to a Poll request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    /// True if the stored marker differs from the one the caller last saw.
    pub has_update: bool,
    /// Current counter set, present only when `has_update` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<CounterSet>,
    /// Current marker, present only when `has_update` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_id: Option<UpdateMarker>,
}

impl PollResponse {
    /// Nothing new since the caller's marker.
    pub fn unchanged() -> Self {
        Self {
            has_update: false,
            data: None,
            update_id: None,
        }
    }

    /// A newer state is available.
    pub fn updated(data: CounterSet, update_id: UpdateMarker) -> Self {
        Self {
            has_update: true,
            data: Some(data),
            update_id: Some(update_id),
        }
    }

    /// Converts into a change event when the response carries an update.
    pub fn into_event(self) -> Option<ChangeEvent> {
        match (self.has_update, self.data, self.update_id) {
            (true, Some(data), Some(update_id)) => Some(ChangeEvent::new(data, update_id)),
            _ => None,
        }
    }
}

/// Response to a Reset request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetResponse {
    /// Whether the reset was applied.
    pub success: bool,
    /// Human-readable confirmation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResetResponse {
    /// A successful reset.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    /// A failed reset.
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

impl WireMessage for SaveRequest {}
impl WireMessage for SaveResponse {}
impl WireMessage for FetchResponse {}
impl WireMessage for ChangeEvent {}
impl WireMessage for PollResponse {}
impl WireMessage for ResetResponse {}
