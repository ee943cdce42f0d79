//! Client reconciler state machine.

use crate::error::{ClientError, ClientResult};
use countboard_protocol::{ChangeEvent, CounterSet, SaveRequest, UpdateMarker};
use std::collections::VecDeque;

/// How many of its own markers a client remembers for echo suppression.
pub const OWN_MARKER_WINDOW: usize = 32;

/// Lifecycle of a reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    /// Waiting for the initial Fetch.
    Loading,
    /// Seeded and accepting local and remote changes.
    Ready,
}

impl ReconcilerState {
    /// Returns true once seeded.
    pub fn is_ready(&self) -> bool {
        matches!(self, ReconcilerState::Ready)
    }
}

/// What happened to an inbound change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// Local state was replaced by the change.
    Applied,
    /// The change was this client's own write coming back.
    SelfEcho,
    /// Dropped because the reconciler was still loading.
    Ignored,
}

/// Merges optimistic local edits with changes from other clients.
///
/// Local edits apply immediately and are tagged with a fresh marker that the
/// reconciler remembers as its own. Inbound changes carrying one of those
/// markers are echoes of this client's writes and are dropped; anything else
/// replaces local state wholesale (last write wins).
#[derive(Debug, Clone)]
pub struct Reconciler {
    state: ReconcilerState,
    counters: CounterSet,
    own: VecDeque<UpdateMarker>,
    last_seen: Option<UpdateMarker>,
    latest: Option<UpdateMarker>,
}

impl Reconciler {
    /// Creates a reconciler showing the default roster until seeded.
    pub fn new() -> Self {
        Self {
            state: ReconcilerState::Loading,
            counters: CounterSet::default_roster(),
            own: VecDeque::with_capacity(OWN_MARKER_WINDOW),
            last_seen: None,
            latest: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> ReconcilerState {
        self.state
    }

    /// Current counters.
    pub fn counters(&self) -> &CounterSet {
        &self.counters
    }

    /// Marker of this client's most recent write.
    pub fn mine(&self) -> Option<&UpdateMarker> {
        self.own.back()
    }

    /// Marker of the last change applied from elsewhere.
    pub fn last_seen(&self) -> Option<&UpdateMarker> {
        self.last_seen.as_ref()
    }

    /// Marker to send with a poll: the newest marker this client knows,
    /// whether it wrote it or received it.
    pub fn poll_marker(&self) -> Option<&UpdateMarker> {
        self.latest.as_ref()
    }

    /// Returns true if `marker` was produced by this client.
    pub fn is_own(&self, marker: &UpdateMarker) -> bool {
        self.own.iter().any(|m| m == marker)
    }

    /// Seeds state from the initial load and becomes ready.
    pub fn seed(&mut self, counters: CounterSet, update_id: Option<UpdateMarker>) {
        self.counters = counters;
        if update_id.is_some() {
            self.last_seen = update_id.clone();
            self.latest = update_id;
        }
        self.state = ReconcilerState::Ready;
    }

    /// Applies a local edit and returns the Save to send.
    pub fn apply_delta(&mut self, name: &str, delta: i64) -> ClientResult<SaveRequest> {
        if !self.state.is_ready() {
            return Err(ClientError::NotReady);
        }
        self.counters.apply_delta(name, delta)?;

        let marker = UpdateMarker::generate();
        if self.own.len() == OWN_MARKER_WINDOW {
            self.own.pop_front();
        }
        self.own.push_back(marker.clone());
        self.latest = Some(marker.clone());

        Ok(SaveRequest::new(self.counters.clone(), marker))
    }

    /// Increments a counter.
    pub fn increment(&mut self, name: &str) -> ClientResult<SaveRequest> {
        self.apply_delta(name, 1)
    }

    /// Decrements a counter.
    pub fn decrement(&mut self, name: &str) -> ClientResult<SaveRequest> {
        self.apply_delta(name, -1)
    }

    /// Applies a change received from the gateway.
    pub fn apply_remote(&mut self, event: ChangeEvent) -> RemoteOutcome {
        if !self.state.is_ready() {
            return RemoteOutcome::Ignored;
        }
        if self.is_own(&event.update_id) {
            return RemoteOutcome::SelfEcho;
        }
        self.counters = event.data;
        self.last_seen = Some(event.update_id.clone());
        self.latest = Some(event.update_id);
        RemoteOutcome::Applied
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ready() -> Reconciler {
        let mut r = Reconciler::new();
        r.seed(CounterSet::default_roster(), None);
        r
    }

    fn remote(data: CounterSet, marker: &str) -> ChangeEvent {
        ChangeEvent::new(data, UpdateMarker::new(marker))
    }

    #[test]
    fn starts_loading() {
        let r = Reconciler::new();
        assert_eq!(r.state(), ReconcilerState::Loading);
        assert_eq!(r.counters(), &CounterSet::default_roster());
        assert!(r.mine().is_none());
    }

    #[test]
    fn local_edits_need_ready() {
        let mut r = Reconciler::new();
        assert!(matches!(r.increment("Flo"), Err(ClientError::NotReady)));
    }

    #[test]
    fn loading_ignores_remote() {
        let mut r = Reconciler::new();
        let mut data = CounterSet::default_roster();
        data.apply_delta("Flo", 5).unwrap();
        assert_eq!(r.apply_remote(remote(data, "x")), RemoteOutcome::Ignored);
        assert_eq!(r.counters(), &CounterSet::default_roster());
    }

    #[test]
    fn seed_records_marker() {
        let mut r = Reconciler::new();
        r.seed(CounterSet::reset_roster(), Some(UpdateMarker::new("m0")));
        assert!(r.state().is_ready());
        assert_eq!(r.counters(), &CounterSet::reset_roster());
        assert_eq!(r.last_seen(), Some(&UpdateMarker::new("m0")));
        assert_eq!(r.poll_marker(), Some(&UpdateMarker::new("m0")));
    }

    #[test]
    fn increment_twice_builds_save() {
        let mut r = ready();
        r.increment("Ara").unwrap();
        let save = r.increment("Ara").unwrap();

        assert_eq!(save.data.count("Ara"), Some(2));
        assert_eq!(save.data.count("Flo"), Some(0));
        assert_eq!(save.data.len(), 4);
        assert_eq!(r.mine(), Some(&save.update_id));
        assert_eq!(r.poll_marker(), Some(&save.update_id));
    }

    #[test]
    fn decrement_can_go_negative() {
        let mut r = ready();
        let save = r.decrement("Isi").unwrap();
        assert_eq!(save.data.count("Isi"), Some(-1));
    }

    #[test]
    fn unknown_counter() {
        let mut r = ready();
        assert!(matches!(
            r.increment("Zed"),
            Err(ClientError::UnknownCounter(ref n)) if n == "Zed"
        ));
        assert!(r.mine().is_none());
    }

    #[test]
    fn own_echo_is_dropped() {
        let mut r = ready();
        let save = r.increment("Flo").unwrap();
        let event = ChangeEvent::from(save);
        assert_eq!(r.apply_remote(event), RemoteOutcome::SelfEcho);
        assert!(r.last_seen().is_none());
    }

    #[test]
    fn foreign_change_replaces_state() {
        let mut r = ready();
        r.increment("Flo").unwrap();

        let mut data = CounterSet::default_roster();
        data.apply_delta("Anto", 7).unwrap();
        assert_eq!(
            r.apply_remote(remote(data.clone(), "other")),
            RemoteOutcome::Applied
        );
        assert_eq!(r.counters(), &data);
        assert_eq!(r.last_seen(), Some(&UpdateMarker::new("other")));
        assert_eq!(r.poll_marker(), Some(&UpdateMarker::new("other")));
    }

    #[test]
    fn stale_own_echo_is_dropped() {
        let mut r = ready();
        let first = r.increment("Flo").unwrap();
        r.increment("Flo").unwrap();

        assert_eq!(
            r.apply_remote(ChangeEvent::from(first)),
            RemoteOutcome::SelfEcho
        );
        assert_eq!(r.counters().count("Flo"), Some(2));
    }

    #[test]
    fn own_marker_window_is_bounded() {
        let mut r = ready();
        let first = r.increment("Flo").unwrap();
        for _ in 0..OWN_MARKER_WINDOW {
            r.increment("Flo").unwrap();
        }
        assert!(!r.is_own(&first.update_id));
    }

    proptest! {
        #[test]
        fn echoes_never_disturb_local_state(
            edits in prop::collection::vec((0usize..4, prop::bool::ANY), 1..=OWN_MARKER_WINDOW),
        ) {
            let names = ["Flo", "Ara", "Anto", "Isi"];
            let mut r = ready();
            let mut saves = Vec::new();
            for (idx, up) in edits {
                let save = if up {
                    r.increment(names[idx]).unwrap()
                } else {
                    r.decrement(names[idx]).unwrap()
                };
                saves.push(save);
            }
            let final_state = r.counters().clone();

            for save in saves {
                prop_assert_eq!(
                    r.apply_remote(ChangeEvent::from(save)),
                    RemoteOutcome::SelfEcho
                );
                prop_assert_eq!(r.counters(), &final_state);
            }
            prop_assert!(r.last_seen().is_none());
        }

        #[test]
        fn foreign_events_always_apply(counts in prop::collection::vec(-50i64..50, 4)) {
            let mut r = ready();
            r.increment("Flo").unwrap();

            let mut data = CounterSet::default_roster();
            for (name, count) in ["Flo", "Ara", "Anto", "Isi"].iter().zip(&counts) {
                data.apply_delta(name, *count).unwrap();
            }
            prop_assert_eq!(
                r.apply_remote(ChangeEvent::new(data.clone(), UpdateMarker::generate())),
                RemoteOutcome::Applied
            );
            prop_assert_eq!(r.counters(), &data);
        }
    }
}
