//! Key-value state shared between pipeline stages.
//!
//! Stages receive a `&dyn KvStore` instead of reaching for process-wide
//! globals. Single-key operations are atomic; a read-modify-write across
//! two calls is not, so concurrent writers to the same key race.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug)]
pub enum StoreError {
    /// Backing storage could not be read or written
    Io(String),
    /// Stored value could not be (de)serialized
    Serde(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(msg) => write!(f, "store I/O error: {}", msg),
            StoreError::Serde(msg) => write!(f, "store serialization error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;
    fn put(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError>;
    /// Returns true when a value was removed.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

/// Typed read through any store.
pub fn get_as<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Option<T>, StoreError> {
    match store.get(key)? {
        Some(v) => serde_json::from_value(v)
            .map(Some)
            .map_err(|e| StoreError::Serde(e.to_string())),
        None => Ok(None),
    }
}

/// Typed write through any store.
pub fn put_as<T: Serialize>(store: &dyn KvStore, key: &str, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_value(value).map_err(|e| StoreError::Serde(e.to_string()))?;
    store.put(key, json)
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, serde_json::Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.write().remove(key).is_some())
    }
}

// ============================================================================
// Directory-backed
// ============================================================================

/// One JSON file per key under a directory. Survives process restarts.
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

impl KvStore for DirStore {
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| StoreError::Io(e.to_string()))?;
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| StoreError::Serde(e.to_string()))
    }

    fn put(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StoreError::Io(e.to_string()))?;
        let json = serde_json::to_string_pretty(&value).map_err(|e| StoreError::Serde(e.to_string()))?;
        std::fs::write(self.path_for(key), json).map_err(|e| StoreError::Io(e.to_string()))
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exercise(store: &dyn KvStore) {
        assert_eq!(store.get("a").unwrap(), None);
        store.put("a", json!({"n": 1})).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(json!({"n": 1})));
        store.put("a", json!(2)).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(json!(2)));
        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        exercise(&store);
        assert!(store.is_empty());
    }

    #[test]
    fn test_memory_store_clones_share_state() {
        let a = MemoryStore::new();
        let b = a.clone();
        a.put("k", json!("v")).unwrap();
        assert_eq!(b.get("k").unwrap(), Some(json!("v")));
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_dir_store() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirStore::new(tmp.path().join("records"));
        exercise(&store);
    }

    #[test]
    fn test_dir_store_sanitizes_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirStore::new(tmp.path());
        store.put("../escape/key", json!(1)).unwrap();
        assert!(tmp.path().join(".._escape_key.json").exists());
        assert_eq!(store.get("../escape/key").unwrap(), Some(json!(1)));
    }

    #[test]
    fn test_typed_helpers() {
        let store = MemoryStore::new();
        put_as(&store, "nums", &vec![1, 2, 3]).unwrap();
        let back: Option<Vec<i32>> = get_as(&store, "nums").unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));
        assert!(get_as::<String>(&store, "nums").is_err());
    }
}
