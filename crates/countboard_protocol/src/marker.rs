//! Update markers.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

const SUFFIX_LEN: usize = 9;
const SUFFIX_CHARSET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Opaque per-write token used for change detection.
///
/// Markers are only ever compared for equality. The generated form is
/// `<unix-millis>-<9 base36 chars>`, but peers must not rely on that shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateMarker(String);

impl UpdateMarker {
    /// Wraps an existing marker string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh marker.
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let mut rng = rand::thread_rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char)
            .collect();
        Self(format!("{millis}-{suffix}"))
    }

    /// Returns the marker as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UpdateMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UpdateMarker {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UpdateMarker {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_shape() {
        let marker = UpdateMarker::generate();
        let (millis, suffix) = marker.as_str().split_once('-').unwrap();
        assert!(millis.parse::<u128>().is_ok());
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix.bytes().all(|b| SUFFIX_CHARSET.contains(&b)));
    }

    #[test]
    fn generated_markers_are_distinct() {
        let markers: HashSet<_> = (0..1000).map(|_| UpdateMarker::generate()).collect();
        assert_eq!(markers.len(), 1000);
    }

    #[test]
    fn serializes_as_string() {
        let marker = UpdateMarker::new("m1");
        assert_eq!(serde_json::to_string(&marker).unwrap(), "\"m1\"");
        assert_eq!(marker.as_str(), "m1");
    }
}
