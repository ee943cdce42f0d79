//! Counters and the ordered counter set.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Roster used the first time the board is read.
pub const DEFAULT_ROSTER: [&str; 4] = ["Flo", "Ara", "Anto", "Isi"];

/// Roster restored by the reset operation.
///
/// Note that this is not the same as [`DEFAULT_ROSTER`]: "Anto" is dropped.
/// Existing deployments rely on this, so it is kept as is.
pub const RESET_ROSTER: [&str; 3] = ["Flo", "Ara", "Isi"];

/// A single named counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Counter {
    /// Identity key, unique within a set.
    pub name: String,
    /// Current value. May go below zero.
    pub count: i64,
}

impl Counter {
    /// Creates a counter.
    pub fn new(name: impl Into<String>, count: i64) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

/// An ordered set of counters with unique names.
///
/// Insertion order is display order. The set is always persisted and
/// transmitted as one unit; on the wire it is a plain JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Counter>", into = "Vec<Counter>")]
pub struct CounterSet {
    counters: Vec<Counter>,
}

impl CounterSet {
    /// Builds a set, rejecting duplicate names.
    pub fn new(counters: Vec<Counter>) -> ProtocolResult<Self> {
        let mut seen = HashSet::with_capacity(counters.len());
        for counter in &counters {
            if !seen.insert(counter.name.as_str()) {
                return Err(ProtocolError::DuplicateName(counter.name.clone()));
            }
        }
        Ok(Self { counters })
    }

    /// Builds a zeroed set from a list of names.
    ///
    /// Repeated names keep their first occurrence.
    pub fn zeroed<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut counters: Vec<Counter> = Vec::new();
        for name in names {
            if !counters.iter().any(|c| c.name == name) {
                counters.push(Counter::new(name, 0));
            }
        }
        Self { counters }
    }

    /// The roster a board starts with.
    pub fn default_roster() -> Self {
        Self::zeroed(DEFAULT_ROSTER)
    }

    /// The roster restored by a reset.
    pub fn reset_roster() -> Self {
        Self::zeroed(RESET_ROSTER)
    }

    /// Returns the counters in display order.
    pub fn as_slice(&self) -> &[Counter] {
        &self.counters
    }

    /// Iterates over the counters in display order.
    pub fn iter(&self) -> impl Iterator<Item = &Counter> {
        self.counters.iter()
    }

    /// Returns the number of counters.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Returns true if the set has no counters.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Looks up a counter by name.
    pub fn get(&self, name: &str) -> Option<&Counter> {
        self.counters.iter().find(|c| c.name == name)
    }

    /// Returns the value of a counter by name.
    pub fn count(&self, name: &str) -> Option<i64> {
        self.get(name).map(|c| c.count)
    }

    /// Adds `delta` to the named counter and returns its new value.
    ///
    /// Arithmetic saturates at the `i64` bounds.
    pub fn apply_delta(&mut self, name: &str, delta: i64) -> ProtocolResult<i64> {
        let counter = self
            .counters
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| ProtocolError::UnknownCounter(name.to_string()))?;
        counter.count = counter.count.saturating_add(delta);
        Ok(counter.count)
    }

    /// Adds `delta` to the counter at `index` (display order).
    pub fn apply_delta_at(&mut self, index: usize, delta: i64) -> ProtocolResult<i64> {
        let counter = self
            .counters
            .get_mut(index)
            .ok_or_else(|| ProtocolError::UnknownCounter(format!("#{index}")))?;
        counter.count = counter.count.saturating_add(delta);
        Ok(counter.count)
    }

    /// Consumes the set, returning the counters.
    pub fn into_inner(self) -> Vec<Counter> {
        self.counters
    }
}

impl TryFrom<Vec<Counter>> for CounterSet {
    type Error = ProtocolError;

    fn try_from(counters: Vec<Counter>) -> ProtocolResult<Self> {
        Self::new(counters)
    }
}

impl From<CounterSet> for Vec<Counter> {
    fn from(set: CounterSet) -> Self {
        set.counters
    }
}

impl<'a> IntoIterator for &'a CounterSet {
    type Item = &'a Counter;
    type IntoIter = std::slice::Iter<'a, Counter>;

    fn into_iter(self) -> Self::IntoIter {
        self.counters.iter()
    }
}
