//! Client-local durability store.
//!
//! Every local change is mirrored here so a client that cannot reach the
//! gateway at load time still starts from its last known counters.

use crate::error::{ClientError, ClientResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A string key-value store local to one client.
pub trait LocalStore: Send + Sync {
    /// Reads a value.
    fn get_item(&self, key: &str) -> ClientResult<Option<String>>;

    /// Writes a value, replacing any previous one.
    fn set_item(&self, key: &str, value: &str) -> ClientResult<()>;
}

/// Local store kept in memory.
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryLocalStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryLocalStore {
    fn get_item(&self, key: &str) -> ClientResult<Option<String>> {
        Ok(self.items.read().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> ClientResult<()> {
        self.items.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Local store keeping one file per key in a directory.
#[derive(Debug, Clone)]
pub struct FileLocalStore {
    dir: PathBuf,
}

impl FileLocalStore {
    /// Opens a store in `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> ClientResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Returns the directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> ClientResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(ClientError::LocalStore(format!("invalid key: {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl LocalStore for FileLocalStore {
    fn get_item(&self, key: &str) -> ClientResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> ClientResult<()> {
        let path = self.path_for(key)?;
        // Write then rename so readers never see a torn value.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryLocalStore::new();
        assert_eq!(store.get_item("k").unwrap(), None);
        store.set_item("k", "v1").unwrap();
        store.set_item("k", "v2").unwrap();
        assert_eq!(store.get_item("k").unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempdir().unwrap();

        let store = FileLocalStore::open(dir.path()).unwrap();
        assert_eq!(store.get_item("asistencia-counters").unwrap(), None);
        store
            .set_item("asistencia-counters", r#"[{"name":"Flo","count":1}]"#)
            .unwrap();

        let reopened = FileLocalStore::open(dir.path()).unwrap();
        assert_eq!(
            reopened.get_item("asistencia-counters").unwrap().as_deref(),
            Some(r#"[{"name":"Flo","count":1}]"#)
        );
        assert!(dir.path().join("asistencia-counters.json").exists());
    }

    #[test]
    fn file_store_creates_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = FileLocalStore::open(&nested).unwrap();
        store.set_item("k", "v").unwrap();
        assert_eq!(store.dir(), nested.as_path());
    }

    #[test]
    fn file_store_rejects_path_keys() {
        let dir = tempdir().unwrap();
        let store = FileLocalStore::open(dir.path()).unwrap();
        for key in ["", "../escape", "a/b", ".hidden"] {
            assert!(matches!(
                store.set_item(key, "v"),
                Err(ClientError::LocalStore(_))
            ));
        }
    }
}
