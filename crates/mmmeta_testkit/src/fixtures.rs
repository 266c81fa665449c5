//! Test fixtures and metadir helpers.

use mmmeta_core::{fields, AppendLog, Metadir, RecordStore, Table, Value};
use mmmeta_storage::InMemoryBackend;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A metadir in a temporary directory, removed on drop.
///
/// Metadata files live directly in the temporary directory, next to
/// `_mmmeta`.
pub struct TestMetadir {
    /// The opened metadir.
    pub metadir: Metadir,
    temp_dir: TempDir,
}

impl TestMetadir {
    /// Creates a metadir whose `config.yml` holds `config`.
    pub fn new(config: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let metadir_path = temp_dir.path().join(mmmeta_core::METADIR_NAME);
        fs::create_dir_all(&metadir_path).expect("Failed to create metadir");
        fs::write(metadir_path.join("config.yml"), config).expect("Failed to write config");
        let metadir = Metadir::open(temp_dir.path()).expect("Failed to open metadir");
        Self { metadir, temp_dir }
    }

    /// Creates a metadir keyed on `id`.
    pub fn keyed_on_id() -> Self {
        Self::new("metadata:\n  unique: id\n")
    }

    /// The directory holding the metadata files.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes a metadata file.
    pub fn write_json(&self, name: &str, json: &serde_json::Value) {
        fs::write(self.root().join(name), json.to_string()).expect("Failed to write json");
    }

    /// Writes an artifact file.
    pub fn write_file(&self, name: &str, data: &[u8]) {
        fs::write(self.root().join(name), data).expect("Failed to write file");
    }

    /// Removes a file from the files root.
    pub fn remove(&self, name: &str) {
        fs::remove_file(self.root().join(name)).expect("Failed to remove file");
    }
}

impl std::ops::Deref for TestMetadir {
    type Target = Metadir;

    fn deref(&self) -> &Self::Target {
        &self.metadir
    }
}

/// An append log over an in-memory backend.
pub fn memory_log(unique: &str) -> AppendLog {
    AppendLog::new(Arc::new(InMemoryBackend::new()), "db", unique)
}

/// Replays `log` into a fresh table.
pub fn replay(log: &AppendLog, unique: &str) -> Table {
    let mut table = Table::new(unique);
    log.load(&mut table).expect("Failed to replay log");
    table
}

/// Asserts both tables hold the same rows under value equivalence.
///
/// `__seen` is ignored on both sides, since the log never carries it.
pub fn assert_tables_equivalent(left: &Table, right: &Table) {
    assert_eq!(left.keys(), right.keys(), "row keys differ");

    for (l, r) in left.all().zip(right.all()) {
        let names = l.keys().chain(r.keys()).filter(|name| *name != fields::SEEN);
        for name in names {
            assert!(
                Value::equivalent(l.get(name), r.get(name)),
                "field {name} differs: {:?} vs {:?}",
                l.get(name),
                r.get(name)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmmeta_core::{GenerateOptions, Record};

    #[test]
    fn test_metadir_generates_from_root() {
        let dir = TestMetadir::keyed_on_id();
        dir.write_json("a.json", &serde_json::json!({"id": "a", "title": "x"}));

        let stats = dir.generate(GenerateOptions::default()).unwrap();
        assert_eq!(stats.added, 1);
        assert!(dir.meta_record("a").unwrap().is_some());
    }

    #[test]
    fn memory_log_replays_written_rows() {
        let log = memory_log("id");
        let row: Record = [("id", "a"), ("title", "x")].into_iter().collect();
        log.write(&[row]).unwrap();

        let table = replay(&log, "id");
        assert_eq!(table.count(), 1);
    }

    #[test]
    fn equivalence_ignores_null_and_seen() {
        let mut left = Table::new("id");
        let mut right = Table::new("id");
        let mut a: Record = [("id", "a")].into_iter().collect();
        left.upsert(a.clone()).unwrap();
        a.insert("note", Value::Null);
        a.insert(fields::SEEN, mmmeta_core::now());
        right.upsert(a).unwrap();

        assert_tables_equivalent(&left, &right);
    }
}
