//! Small key/value store for timestamps and markers.
//!
//! Each key is one blob under the store directory holding a typed cell
//! (see [`Value::to_cell`]). Untyped content, such as a hand-written
//! date, is read through [`Value::cast`].

use crate::error::{CoreError, CoreResult};
use crate::value::{self, Value};
use chrono::NaiveDateTime;
use mmmeta_storage::BlobBackend;
use std::sync::Arc;

/// Key updated by every [`KvStore::touch`].
pub const STORE_LAST_UPDATED: &str = "store_last_updated";

/// Key/value store over a blob directory.
#[derive(Clone)]
pub struct KvStore {
    backend: Arc<dyn BlobBackend>,
    dir: String,
}

impl KvStore {
    /// Opens the store under `dir`.
    pub fn new(backend: Arc<dyn BlobBackend>, dir: impl Into<String>) -> Self {
        Self {
            backend,
            dir: dir.into(),
        }
    }

    fn path(&self, key: &str) -> CoreResult<String> {
        if key.is_empty() || key == "." || key == ".." || key.contains(['/', '\\']) {
            return Err(CoreError::IllegalKey {
                key: key.to_string(),
            });
        }
        Ok(format!("{}/{key}", self.dir))
    }

    /// Reads a value; `None` if the key was never set.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalKey`] or a read error.
    pub fn get(&self, key: &str) -> CoreResult<Option<Value>> {
        let path = self.path(key)?;
        if !self.backend.exists(&path) {
            return Ok(None);
        }
        let text = self.backend.load_string(&path)?;
        Ok(Some(
            Value::from_cell(&text).unwrap_or_else(|_| Value::cast(&text)),
        ))
    }

    /// Reads a timestamp; `None` if unset or not a timestamp.
    ///
    /// # Errors
    ///
    /// Same as [`KvStore::get`].
    pub fn get_timestamp(&self, key: &str) -> CoreResult<Option<NaiveDateTime>> {
        Ok(self.get(key)?.as_ref().and_then(Value::as_timestamp))
    }

    /// Stores a value, returning it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalKey`] or a write error.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> CoreResult<Value> {
        let path = self.path(key)?;
        let value = value.into();
        self.backend.save(&path, value.to_cell().as_bytes())?;
        Ok(value)
    }

    /// Stores the current time under `key` and [`STORE_LAST_UPDATED`].
    ///
    /// # Errors
    ///
    /// Same as [`KvStore::set`].
    pub fn touch(&self, key: &str) -> CoreResult<NaiveDateTime> {
        let ts = value::now();
        self.set(key, ts)?;
        self.set(STORE_LAST_UPDATED, ts)?;
        Ok(ts)
    }

    /// All keys, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub fn keys(&self) -> CoreResult<Vec<String>> {
        Ok(self
            .backend
            .children(&self.dir)?
            .into_iter()
            .filter(|k| !k.contains('/'))
            .collect())
    }

    /// All `(key, value)` pairs, sorted by key.
    ///
    /// # Errors
    ///
    /// Returns an error if a key cannot be read.
    pub fn entries(&self) -> CoreResult<Vec<(String, Value)>> {
        let mut entries = Vec::new();
        for key in self.keys()? {
            if let Some(value) = self.get(&key)? {
                entries.push((key, value));
            }
        }
        Ok(entries)
    }
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStore")
            .field("location", &self.backend.location())
            .field("dir", &self.dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmmeta_storage::InMemoryBackend;

    fn store() -> KvStore {
        KvStore::new(Arc::new(InMemoryBackend::new()), "_store")
    }

    #[test]
    fn get_missing_is_none() {
        assert_eq!(store().get("nothing").unwrap(), None);
    }

    #[test]
    fn values_keep_their_type() {
        let store = store();
        store.set("count", 3i64).unwrap();
        store.set("name", "abc").unwrap();
        store.set("code", "007").unwrap();
        assert_eq!(store.get("count").unwrap(), Some(Value::Integer(3)));
        assert_eq!(store.get("name").unwrap(), Some(Value::from("abc")));
        assert_eq!(store.get("code").unwrap(), Some(Value::from("007")));
    }

    #[test]
    fn untyped_content_is_cast() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.save("_store/since", b"2024-01-01").unwrap();
        let store = KvStore::new(backend, "_store");
        assert!(store.get_timestamp("since").unwrap().is_some());
    }

    #[test]
    fn touch_updates_store_marker() {
        let store = store();
        let ts = store.touch("meta_last_updated").unwrap();
        assert_eq!(store.get_timestamp("meta_last_updated").unwrap(), Some(ts));
        assert_eq!(store.get_timestamp(STORE_LAST_UPDATED).unwrap(), Some(ts));
        assert_eq!(
            store.keys().unwrap(),
            vec!["meta_last_updated".to_string(), STORE_LAST_UPDATED.to_string()]
        );
        assert_eq!(store.entries().unwrap()[0].1, Value::Timestamp(ts));
    }

    #[test]
    fn rejects_illegal_keys() {
        let store = store();
        for key in ["", "a/b", "..", "."] {
            let err = store.set(key, 1i64).unwrap_err();
            assert!(matches!(err, CoreError::IllegalKey { .. }), "{key}");
        }
    }
}
