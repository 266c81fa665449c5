//! Keyed record tables.
//!
//! A [`Table`] holds exactly one record per unique-key value. Tables live in
//! memory; [`TableFile`] persists them as CBOR snapshots through a blob
//! backend, replacing the whole file atomically on every commit.
//!
//! ## Unique-key migration
//!
//! A snapshot remembers the key it was written with. Loading it under a
//! different key rebuilds the table keyed by the new field. Rows that lack
//! the new field, or collide with an earlier row under it, are rejected one
//! by one with a warning; the rest migrate.

use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use crate::value::Value;
use mmmeta_storage::BlobBackend;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Snapshot format version.
const TABLE_FORMAT_VERSION: u16 = 1;

/// Generic keyed record store.
pub trait RecordStore {
    /// The field rows are keyed on.
    fn unique_key(&self) -> &str;

    /// Gets the row whose unique field equals `id`.
    fn get(&self, id: &Value) -> Option<&Record>;

    /// Inserts a row, or merges its fields into the existing row.
    ///
    /// Returns true if a new row was inserted.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingUniqueKey`] if the unique field is
    /// absent or null.
    fn upsert(&mut self, record: Record) -> CoreResult<bool>;

    /// Rows matching `predicate`, in key order.
    fn find<'a>(
        &'a self,
        predicate: &'a dyn Fn(&Record) -> bool,
    ) -> Box<dyn Iterator<Item = &'a Record> + 'a>;

    /// All rows in key order.
    fn all(&self) -> Box<dyn Iterator<Item = &Record> + '_>;

    /// Number of rows.
    fn count(&self) -> usize;

    /// Removes every row.
    fn drop_table(&mut self);
}

/// An in-memory table keyed by the canonical text of a unique field.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    unique: String,
    rows: BTreeMap<String, Record>,
}

impl Table {
    /// Creates an empty table keyed on `unique`.
    pub fn new(unique: impl Into<String>) -> Self {
        Self {
            unique: unique.into(),
            rows: BTreeMap::new(),
        }
    }

    /// Returns the key under which `record` is stored.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingUniqueKey`] if the field is absent or null.
    pub fn key_of(&self, record: &Record) -> CoreResult<String> {
        record
            .get(&self.unique)
            .filter(|v| !v.is_null())
            .map(Value::canonical)
            .ok_or_else(|| CoreError::MissingUniqueKey {
                key: self.unique.clone(),
            })
    }

    /// Gets a row by its canonical key.
    pub fn get_by_key(&self, key: &str) -> Option<&Record> {
        self.rows.get(key)
    }

    /// Gets a mutable row by its canonical key.
    pub fn get_mut_by_key(&mut self, key: &str) -> Option<&mut Record> {
        self.rows.get_mut(key)
    }

    /// Inserts `record`, replacing any existing row wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingUniqueKey`] if the unique field is
    /// absent or null.
    pub fn replace(&mut self, record: Record) -> CoreResult<Option<Record>> {
        let key = self.key_of(&record)?;
        Ok(self.rows.insert(key, record))
    }

    /// Canonical keys of all rows.
    pub fn keys(&self) -> BTreeSet<String> {
        self.rows.keys().cloned().collect()
    }

    /// Iterates `(key, row)` pairs in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Record> {
        self.rows.iter()
    }

    /// Iterates `(key, row)` pairs with mutable rows, in key order.
    ///
    /// Callers must not change a row's unique field through this.
    pub fn iter_mut(&mut self) -> btree_map::IterMut<'_, String, Record> {
        self.rows.iter_mut()
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rebuilds this table keyed on `unique`.
    ///
    /// Rows without the new field or colliding under it are rejected
    /// individually and logged; they never abort the migration.
    #[must_use]
    pub fn migrate(self, unique: &str) -> Table {
        if unique == self.unique {
            return self;
        }
        warn!(
            from = %self.unique,
            to = %unique,
            rows = self.rows.len(),
            "unique key changed, migrating table"
        );

        let mut migrated = Table::new(unique);
        for record in self.rows.into_values() {
            let key = match migrated.key_of(&record) {
                Ok(key) => key,
                Err(err) => {
                    warn!("rejecting row during key migration: {err}");
                    continue;
                }
            };
            if migrated.rows.contains_key(&key) {
                let err = CoreError::KeyMigrationCollision {
                    key: unique.to_string(),
                    id: key,
                };
                warn!("rejecting row during key migration: {err}");
                continue;
            }
            migrated.rows.insert(key, record);
        }
        migrated
    }
}

impl RecordStore for Table {
    fn unique_key(&self) -> &str {
        &self.unique
    }

    fn get(&self, id: &Value) -> Option<&Record> {
        if id.is_null() {
            return None;
        }
        self.rows.get(&id.canonical())
    }

    fn upsert(&mut self, record: Record) -> CoreResult<bool> {
        let key = self.key_of(&record)?;
        match self.rows.get_mut(&key) {
            Some(existing) => {
                existing.merge(&record);
                Ok(false)
            }
            None => {
                self.rows.insert(key, record);
                Ok(true)
            }
        }
    }

    fn find<'a>(
        &'a self,
        predicate: &'a dyn Fn(&Record) -> bool,
    ) -> Box<dyn Iterator<Item = &'a Record> + 'a> {
        Box::new(self.rows.values().filter(move |r| predicate(r)))
    }

    fn all(&self) -> Box<dyn Iterator<Item = &Record> + '_> {
        Box::new(self.rows.values())
    }

    fn count(&self) -> usize {
        self.rows.len()
    }

    fn drop_table(&mut self) {
        self.rows.clear();
    }
}

#[derive(Serialize, Deserialize)]
struct TableSnapshot {
    format_version: u16,
    unique_key: String,
    rows: Vec<Record>,
}

/// A table persisted as one blob.
#[derive(Clone)]
pub struct TableFile {
    backend: Arc<dyn BlobBackend>,
    path: String,
}

impl TableFile {
    /// Creates a handle for the table stored at `path` in `backend`.
    pub fn new(backend: Arc<dyn BlobBackend>, path: impl Into<String>) -> Self {
        Self {
            backend,
            path: path.into(),
        }
    }

    /// Path of the blob within the backend.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns true if the table has been committed at least once.
    pub fn exists(&self) -> bool {
        self.backend.exists(&self.path)
    }

    /// Loads the table keyed on `unique`; a missing blob is an empty table.
    ///
    /// If the snapshot was keyed differently the table is migrated and the
    /// migrated table committed before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be read or decoded.
    pub fn load(&self, unique: &str) -> CoreResult<Table> {
        if !self.backend.exists(&self.path) {
            return Ok(Table::new(unique));
        }
        let bytes = self.backend.load(&self.path)?;
        let snapshot: TableSnapshot = ciborium::from_reader(bytes.as_slice())
            .map_err(|e| CoreError::codec(format!("decoding {}: {e}", self.path)))?;
        if snapshot.format_version != TABLE_FORMAT_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported table format version {} in {}",
                snapshot.format_version, self.path
            )));
        }

        let mut table = Table::new(snapshot.unique_key);
        for record in snapshot.rows {
            // Rows were keyed when written; a failure here means corruption
            table.replace(record)?;
        }
        debug!(path = %self.path, rows = table.count(), "loaded table");

        if table.unique_key() != unique {
            let table = table.migrate(unique);
            self.commit(&table)?;
            return Ok(table);
        }
        Ok(table)
    }

    /// Atomically replaces the persisted table with `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write fails.
    pub fn commit(&self, table: &Table) -> CoreResult<()> {
        let snapshot = TableSnapshot {
            format_version: TABLE_FORMAT_VERSION,
            unique_key: table.unique.clone(),
            rows: table.rows.values().cloned().collect(),
        };
        let mut bytes = Vec::new();
        ciborium::into_writer(&snapshot, &mut bytes)
            .map_err(|e| CoreError::codec(format!("encoding {}: {e}", self.path)))?;
        self.backend.save(&self.path, &bytes)?;
        debug!(path = %self.path, rows = snapshot.rows.len(), "committed table");
        Ok(())
    }

    /// Deletes the persisted table.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn remove(&self) -> CoreResult<()> {
        self.backend.delete(&self.path)?;
        Ok(())
    }
}

impl std::fmt::Debug for TableFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableFile")
            .field("location", &self.backend.location())
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use mmmeta_storage::InMemoryBackend;

    fn row(pairs: &[(&str, &str)]) -> Record {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn upsert_inserts_then_merges() {
        let mut table = Table::new("id");
        assert!(table.upsert(row(&[("id", "a"), ("title", "x")])).unwrap());
        assert!(!table.upsert(row(&[("id", "a"), ("extra", "y")])).unwrap());

        let stored = table.get(&Value::from("a")).unwrap();
        assert_eq!(stored.get("title"), Some(&Value::from("x")));
        assert_eq!(stored.get("extra"), Some(&Value::from("y")));
        assert_eq!(table.count(), 1);
    }

    #[test]
    fn upsert_requires_unique_key() {
        let mut table = Table::new("id");
        let err = table.upsert(row(&[("title", "x")])).unwrap_err();
        assert!(matches!(err, CoreError::MissingUniqueKey { .. }));

        let mut null_id = Record::new();
        null_id.insert("id", Value::Null);
        assert!(table.upsert(null_id).is_err());
    }

    #[test]
    fn integer_and_text_ids_share_canonical_key() {
        let mut table = Table::new("uid");
        table.upsert([("uid", 7i64)].into_iter().collect()).unwrap();
        assert!(table.get(&Value::from("7")).is_some());
        assert!(table.get(&Value::Integer(7)).is_some());
    }

    #[test]
    fn find_filters_in_key_order() {
        let mut table = Table::new("id");
        for (id, kind) in [("c", "x"), ("a", "x"), ("b", "y")] {
            table.upsert(row(&[("id", id), ("kind", kind)])).unwrap();
        }

        let pred = |r: &Record| r.get("kind") == Some(&Value::from("x"));
        let ids: Vec<String> = table
            .find(&pred)
            .map(|r| r.get("id").unwrap().canonical())
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn drop_table_clears_rows() {
        let mut table = Table::new("id");
        table.upsert(row(&[("id", "a")])).unwrap();
        table.drop_table();
        assert_eq!(table.count(), 0);
        assert!(table.all().next().is_none());
    }

    #[test]
    fn migrate_rekeys_and_rejects_collisions() {
        let mut table = Table::new("content_hash");
        table
            .upsert(row(&[("content_hash", "h1"), ("_file_name", "a.pdf")]))
            .unwrap();
        table
            .upsert(row(&[("content_hash", "h2"), ("_file_name", "a.pdf")]))
            .unwrap();
        table
            .upsert(row(&[("content_hash", "h3"), ("_file_name", "b.pdf")]))
            .unwrap();
        table.upsert(row(&[("content_hash", "h4")])).unwrap();

        let migrated = table.migrate("_file_name");
        assert_eq!(migrated.unique_key(), "_file_name");
        assert_eq!(migrated.count(), 2);
        // First row in old key order wins
        assert_eq!(
            migrated.get(&Value::from("a.pdf")).unwrap().get("content_hash"),
            Some(&Value::from("h1"))
        );
        assert!(migrated.get(&Value::from("b.pdf")).is_some());
    }

    #[test]
    fn table_file_round_trip() {
        let backend: Arc<dyn BlobBackend> = Arc::new(InMemoryBackend::new());
        let file = TableFile::new(Arc::clone(&backend), "meta.db");
        assert!(!file.exists());
        assert_eq!(file.load("id").unwrap().count(), 0);

        let ts = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_micro_opt(7, 8, 9, 10)
            .unwrap();
        let mut table = Table::new("id");
        let mut record = row(&[("id", "a")]);
        record.insert("n", 3i64);
        record.insert("f", 1.5);
        record.insert("ok", true);
        record.insert("at", ts);
        record.insert("none", Value::Null);
        table.upsert(record.clone()).unwrap();
        file.commit(&table).unwrap();

        let loaded = file.load("id").unwrap();
        assert_eq!(loaded, table);
        assert_eq!(loaded.get(&Value::from("a")), Some(&record));
    }

    #[test]
    fn table_file_migrates_on_key_change() {
        let backend: Arc<dyn BlobBackend> = Arc::new(InMemoryBackend::new());
        let file = TableFile::new(Arc::clone(&backend), "state.db");

        let mut table = Table::new("id");
        table.upsert(row(&[("id", "1"), ("name", "x")])).unwrap();
        table.upsert(row(&[("id", "2"), ("name", "y")])).unwrap();
        file.commit(&table).unwrap();

        let migrated = file.load("name").unwrap();
        assert_eq!(migrated.unique_key(), "name");
        assert!(migrated.get(&Value::from("y")).is_some());

        // Persisted under the new key
        let reloaded = TableFile::new(backend, "state.db").load("name").unwrap();
        assert_eq!(reloaded, migrated);
    }

    #[test]
    fn table_file_rejects_garbage() {
        let backend: Arc<dyn BlobBackend> = Arc::new(InMemoryBackend::new());
        backend.save("meta.db", b"not cbor at all").unwrap();
        let err = TableFile::new(backend, "meta.db").load("id").unwrap_err();
        assert!(matches!(err, CoreError::Codec { .. }));
    }
}
