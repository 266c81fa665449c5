//! In-memory blob backend for testing.

use crate::backend::{normalize, BlobBackend};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory blob backend.
///
/// Stores every blob in a sorted map keyed by normalized path. Suitable for:
/// - Unit tests
/// - Ephemeral stores (e.g. the scratch table built during squash)
///
/// # Example
///
/// ```rust
/// use mmmeta_storage::{BlobBackend, InMemoryBackend};
///
/// let backend = InMemoryBackend::new();
/// backend.save("a/b", b"data").unwrap();
/// assert_eq!(backend.load("a/b").unwrap(), b"data");
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    fn key(path: &str) -> StorageResult<String> {
        Ok(normalize(path)?.join("/"))
    }

    fn prefix(path: &str) -> StorageResult<String> {
        let key = Self::key(path)?;
        Ok(if key.is_empty() { key } else { format!("{key}/") })
    }
}

impl BlobBackend for InMemoryBackend {
    fn location(&self) -> String {
        "memory".to_string()
    }

    fn exists(&self, path: &str) -> bool {
        let (Ok(key), Ok(prefix)) = (Self::key(path), Self::prefix(path)) else {
            return false;
        };
        if key.is_empty() {
            return true;
        }
        let blobs = self.blobs.read();
        blobs.contains_key(&key) || blobs.keys().any(|k| k.starts_with(&prefix))
    }

    fn load(&self, path: &str) -> StorageResult<Vec<u8>> {
        let key = Self::key(path)?;
        self.blobs
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(path, self.location()))
    }

    fn save(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        let key = Self::key(path)?;
        if key.is_empty() {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        self.blobs.write().insert(key, data.to_vec());
        Ok(())
    }

    fn children(&self, path: &str) -> StorageResult<Vec<String>> {
        let prefix = Self::prefix(path)?;
        Ok(self
            .blobs
            .read()
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    fn delete(&self, path: &str) -> StorageResult<()> {
        let key = Self::key(path)?;
        let prefix = Self::prefix(path)?;
        self.blobs
            .write()
            .retain(|k, _| k != &key && !k.starts_with(&prefix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert!(backend.is_empty());
        assert!(backend.children(".").unwrap().is_empty());
    }

    #[test]
    fn memory_save_load() {
        let backend = InMemoryBackend::new();
        backend.save("./db/x.append", b"abc").unwrap();

        assert_eq!(backend.load("db/x.append").unwrap(), b"abc");
        assert!(backend.exists("db"));
        assert!(backend.exists("db/x.append"));
        assert!(!backend.exists("db/y"));
    }

    #[test]
    fn memory_load_missing_fails() {
        let backend = InMemoryBackend::new();
        assert!(matches!(
            backend.load("missing"),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn memory_children_relative() {
        let backend = InMemoryBackend::new();
        backend.save("db/2", b"").unwrap();
        backend.save("db/1", b"").unwrap();
        backend.save("dbx", b"").unwrap();

        assert_eq!(backend.children("db").unwrap(), vec!["1", "2"]);
        assert_eq!(backend.children("").unwrap().len(), 3);
    }

    #[test]
    fn memory_delete_prefix() {
        let backend = InMemoryBackend::new();
        backend.save("db/1", b"").unwrap();
        backend.save("db/2", b"").unwrap();
        backend.save("keep", b"").unwrap();

        backend.delete("db").unwrap();
        assert_eq!(backend.len(), 1);
        assert!(backend.exists("keep"));
    }
}
