//! The metadir: stores, log and configuration behind one handle.
//!
//! A full synchronization cycle is [`Metadir::generate`] followed by
//! [`Metadir::update`]. Each reconciliation works on an in-memory copy of
//! its table and commits it with one atomic file replace after the log
//! step is written.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mmmeta_core::{GenerateOptions, Metadir, StateOptions};
//!
//! let metadir = Metadir::open("./data")?;
//! let stats = metadir.generate(GenerateOptions::default())?;
//! println!("{stats}");
//! metadir.update(StateOptions::default())?;
//! ```

use crate::config::Config;
use crate::dir::{MetadirDir, LOG_DIR, META_DB, STATE_DB, STORE_DIR};
use crate::error::{CoreError, CoreResult};
use crate::kv::{KvStore, STORE_LAST_UPDATED};
use crate::log::{self, AppendLog, StepName};
use crate::reconcile::{
    MetaOptions, MetaReconciler, ReconcileStats, StateOptions, StateReconciler,
};
use crate::record::{fields, Record};
use crate::source::{JsonMetadataSource, MetadataSource, RawFileSource};
use crate::table::{RecordStore, Table, TableFile};
use crate::validate::{ValidationError, Validator};
use crate::value::{self, Value};
use chrono::{Duration, NaiveDateTime};
use mmmeta_storage::FileBackend;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Store key holding the newest cycle timestamp.
const LAST_CYCLE: &str = "last_cycle";
/// Store key touched after `generate`.
pub const META_LAST_UPDATED: &str = "meta_last_updated";
/// Store key touched after `update`.
pub const STATE_LAST_UPDATED: &str = "state_last_updated";

/// Options for [`Metadir::generate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Drop the meta store first.
    pub replace: bool,
    /// Soft-delete meta rows absent from the source.
    pub ensure_liveness: bool,
    /// Soft-delete meta rows whose artifact file is missing.
    pub ensure_files: bool,
    /// Describe raw files instead of reading JSON metadata.
    pub raw_files: bool,
}

impl From<GenerateOptions> for MetaOptions {
    fn from(opts: GenerateOptions) -> Self {
        MetaOptions {
            replace: opts.replace,
            ensure_liveness: opts.ensure_liveness,
            ensure_files: opts.ensure_files,
            raw_files: opts.raw_files,
        }
    }
}

/// Summary returned by [`Metadir::inspect`].
#[derive(Debug, Clone, PartialEq)]
pub struct Inspection {
    /// The `_mmmeta` directory.
    pub path: PathBuf,
    /// Root of the artifact and metadata files.
    pub files_root: PathBuf,
    /// Unique key in effect.
    pub unique: String,
    /// Rows in the meta store.
    pub meta_rows: usize,
    /// Rows in the state store.
    pub state_rows: usize,
    /// Soft-deleted rows in the state store.
    pub deleted: usize,
    /// Steps in the log.
    pub log_steps: usize,
    /// Key/value store contents.
    pub store: Vec<(String, Value)>,
}

impl fmt::Display for Inspection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "path: {}", self.path.display())?;
        writeln!(f, "files_root: {}", self.files_root.display())?;
        writeln!(f, "unique: {}", self.unique)?;
        writeln!(f, "files: {}", self.state_rows)?;
        writeln!(f, "meta: {}", self.meta_rows)?;
        writeln!(f, "deleted: {}", self.deleted)?;
        write!(f, "log steps: {}", self.log_steps)?;
        for (key, value) in &self.store {
            write!(f, "\n{key}: {value}")?;
        }
        Ok(())
    }
}

/// A metadir opened for exclusive use.
#[derive(Debug)]
pub struct Metadir {
    dir: MetadirDir,
    files_root: PathBuf,
    config: Config,
    meta: TableFile,
    state: TableFile,
    log: AppendLog,
    store: KvStore,
}

impl Metadir {
    /// Opens the metadir at `base`, with files under `base` too.
    ///
    /// # Errors
    ///
    /// See [`Metadir::open_with`].
    pub fn open(base: impl AsRef<Path>) -> CoreResult<Self> {
        let base = base.as_ref();
        Self::open_with(base, base)
    }

    /// Opens the metadir at `base` reading files from `files_root`.
    ///
    /// Creates `<base>/_mmmeta` if needed and loads its `config.yml`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MetadirLocked`] if another handle is open, or
    /// an error if the configuration cannot be read.
    pub fn open_with(base: impl AsRef<Path>, files_root: impl AsRef<Path>) -> CoreResult<Self> {
        let dir = MetadirDir::open(base.as_ref())?;
        let config = dir.load_config()?;
        Ok(Self::assemble(dir, files_root.as_ref().to_path_buf(), config))
    }

    /// Replaces the configuration read from disk.
    #[must_use]
    pub fn with_config(self, config: Config) -> Self {
        Self::assemble(self.dir, self.files_root, config)
    }

    fn assemble(dir: MetadirDir, files_root: PathBuf, config: Config) -> Self {
        let backend = dir.backend();
        Self {
            meta: TableFile::new(backend.clone(), META_DB),
            state: TableFile::new(backend.clone(), STATE_DB),
            log: AppendLog::new(backend.clone(), LOG_DIR, config.unique.clone()),
            store: KvStore::new(backend, STORE_DIR),
            dir,
            files_root,
            config,
        }
    }

    /// The configuration in effect.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The `_mmmeta` directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Root of the artifact and metadata files.
    pub fn files_root(&self) -> &Path {
        &self.files_root
    }

    /// The change log.
    pub fn log(&self) -> &AppendLog {
        &self.log
    }

    /// The timestamp key/value store.
    pub fn store(&self) -> &KvStore {
        &self.store
    }

    /// Reconciles the files root into the meta store.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the files root does not exist, or
    /// an error if the log or table cannot be written.
    pub fn generate(&self, opts: GenerateOptions) -> CoreResult<ReconcileStats> {
        info!("Updating metadata for `{}` ...", self.files_root.display());
        if opts.raw_files {
            let source = RawFileSource::open(&self.files_root)?;
            self.generate_from(&source, opts)
        } else {
            let source = JsonMetadataSource::open(&self.files_root)?;
            self.generate_from(&source, opts)
        }
    }

    /// Reconciles the candidates of `source` into the meta store.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be listed or a write fails.
    pub fn generate_from(
        &self,
        source: &dyn MetadataSource,
        opts: GenerateOptions,
    ) -> CoreResult<ReconcileStats> {
        let candidates = source.candidates()?;
        let files = if opts.ensure_files {
            Some(FileBackend::open_existing(&self.files_root)?)
        } else {
            None
        };
        let ts = self.next_cycle()?;
        let mut table = self.meta.load(&self.config.unique)?;

        let mut reconciler = MetaReconciler::new(&self.config, &self.log);
        if let Some(files) = &files {
            reconciler = reconciler.with_files(files);
        }
        let stats = reconciler.reconcile(&mut table, candidates, ts, opts.into())?;

        self.meta.commit(&table)?;
        self.store.touch(META_LAST_UPDATED)?;
        info!("Now {} files in meta database.", table.count());
        Ok(stats)
    }

    /// Reconciles the meta store into the state store.
    ///
    /// # Errors
    ///
    /// Returns an error if a table cannot be read or written.
    pub fn update(&self, opts: StateOptions) -> CoreResult<ReconcileStats> {
        info!("Updating state for `{}` ...", self.path().display());
        let ts = self.next_cycle()?;
        let meta = self.meta.load(&self.config.unique)?;
        let mut state = self.state.load(&self.config.unique)?;

        let stats = StateReconciler::new(&self.config).reconcile(&meta, &mut state, ts, opts);

        self.state.commit(&state)?;
        self.store.touch(STATE_LAST_UPDATED)?;
        info!("Now {} files in state database.", state.count());
        Ok(stats)
    }

    /// Writes a squashed log step; `None` if the log is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if replay or the write fails.
    pub fn squash(&self) -> CoreResult<Option<StepName>> {
        self.log.squash()
    }

    /// Rebuilds the meta store from the log. Returns the rows applied.
    ///
    /// With `replace` the meta store is emptied first; otherwise log rows
    /// are merged into it.
    ///
    /// # Errors
    ///
    /// Returns an error if replay or the commit fails.
    pub fn load_log_into_meta(&self, replace: bool) -> CoreResult<usize> {
        let mut table = if replace {
            Table::new(self.config.unique.clone())
        } else {
            self.meta.load(&self.config.unique)?
        };
        let applied = self.log.load(&mut table)?;
        self.meta.commit(&table)?;
        self.store.touch(META_LAST_UPDATED)?;
        info!("Loaded {applied} log rows into meta database.");
        Ok(applied)
    }

    /// Gets a state row by unique id.
    ///
    /// # Errors
    ///
    /// Returns an error if the state store cannot be read.
    pub fn get(&self, id: impl Into<Value>) -> CoreResult<Option<Record>> {
        let state = self.state.load(&self.config.unique)?;
        Ok(state.get(&id.into()).cloned())
    }

    /// Gets a meta row by unique id.
    ///
    /// # Errors
    ///
    /// Returns an error if the meta store cannot be read.
    pub fn meta_record(&self, id: impl Into<Value>) -> CoreResult<Option<Record>> {
        let meta = self.meta.load(&self.config.unique)?;
        Ok(meta.get(&id.into()).cloned())
    }

    /// State rows matching `predicate`, in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the state store cannot be read.
    pub fn find(&self, predicate: impl Fn(&Record) -> bool) -> CoreResult<Vec<Record>> {
        let state = self.state.load(&self.config.unique)?;
        Ok(state.find(&predicate).cloned().collect())
    }

    /// Validates a record against the configured required keys.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingKeys`] naming the absent keys.
    pub fn validate(&self, record: &Record) -> Result<(), ValidationError> {
        Validator::new(&self.config).validate(record)
    }

    /// Merges `update` into a state row and stamps `__state_last_updated`.
    ///
    /// Engine-owned fields and the unique field in `update` are ignored.
    /// Returns the updated row.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if no state row has this id.
    pub fn update_state_record(
        &self,
        id: impl Into<Value>,
        update: Record,
    ) -> CoreResult<Record> {
        let id = id.into();
        let mut state = self.state.load(&self.config.unique)?;
        let key = id.canonical();
        let unique = self.config.unique.clone();
        let row = state
            .get_mut_by_key(&key)
            .ok_or_else(|| CoreError::not_found(format!("state record `{key}`")))?;

        let mut update = update;
        update.retain(|name, _| name != unique && !fields::is_reserved(name));
        row.merge(&update);
        row.insert(fields::STATE_LAST_UPDATED, value::now());
        let row = row.clone();

        self.state.commit(&state)?;
        self.store.touch(STATE_LAST_UPDATED)?;
        Ok(row)
    }

    /// Renders the configured output URLs for a state row.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown id, or a template error.
    pub fn public_urls(&self, id: impl Into<Value>) -> CoreResult<BTreeMap<String, String>> {
        let id = id.into();
        let row = self
            .get(id.clone())?
            .ok_or_else(|| CoreError::not_found(format!("state record `{id}`")))?;
        self.config.public_urls(&row)
    }

    /// Number of rows in the state store.
    ///
    /// # Errors
    ///
    /// Returns an error if the state store cannot be read.
    pub fn len(&self) -> CoreResult<usize> {
        Ok(self.state.load(&self.config.unique)?.count())
    }

    /// Returns true if the state store has no rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the state store cannot be read.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Row counts, paths and store contents.
    ///
    /// # Errors
    ///
    /// Returns an error if a store cannot be read.
    pub fn inspect(&self) -> CoreResult<Inspection> {
        let meta = self.meta.load(&self.config.unique)?;
        let state = self.state.load(&self.config.unique)?;
        Ok(Inspection {
            path: self.path().to_path_buf(),
            files_root: self.files_root.clone(),
            unique: self.config.unique.clone(),
            meta_rows: meta.count(),
            state_rows: state.count(),
            deleted: state.find(&Record::is_deleted).count(),
            log_steps: self.log.steps()?.len(),
            store: self.store.entries()?,
        })
    }

    /// Writes the state store as CSV, adding the output-URL columns.
    ///
    /// Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns an error if the state store cannot be read or the write
    /// fails.
    pub fn dump(&self, mut out: impl Write) -> CoreResult<usize> {
        let state = self.state.load(&self.config.unique)?;
        let rows: Vec<Record> = state
            .all()
            .map(|row| {
                let mut row = row.clone();
                // Rows lacking a template field simply get no URL
                if let Ok(urls) = self.config.public_urls(&row) {
                    for (name, url) in urls {
                        row.insert(name, url);
                    }
                }
                row
            })
            .collect();
        if rows.is_empty() {
            return Ok(0);
        }
        out.write_all(&log::encode_plain(&self.config.unique, &rows)?)?;
        out.flush()?;
        Ok(rows.len())
    }

    /// Stores the current time under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error for an illegal key or a failed write.
    pub fn touch(&self, key: &str) -> CoreResult<NaiveDateTime> {
        self.store.touch(key)
    }

    /// When `generate` last completed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn meta_last_updated(&self) -> CoreResult<Option<NaiveDateTime>> {
        self.store.get_timestamp(META_LAST_UPDATED)
    }

    /// When the state store last changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn state_last_updated(&self) -> CoreResult<Option<NaiveDateTime>> {
        self.store.get_timestamp(STATE_LAST_UPDATED)
    }

    /// The newest of all recorded timestamps.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn last_touched(&self) -> CoreResult<Option<NaiveDateTime>> {
        Ok([
            self.store.get_timestamp(STORE_LAST_UPDATED)?,
            self.meta_last_updated()?,
            self.state_last_updated()?,
        ]
        .into_iter()
        .flatten()
        .max())
    }

    /// Allocates a cycle timestamp strictly after the previous one.
    fn next_cycle(&self) -> CoreResult<NaiveDateTime> {
        let mut ts = value::now();
        if let Some(last) = self.store.get_timestamp(LAST_CYCLE)? {
            if ts <= last {
                ts = last + Duration::microseconds(1);
            }
        }
        self.store.set(LAST_CYCLE, ts)?;
        Ok(ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RecordSource;
    use tempfile::tempdir;

    fn source(rows: &[&[(&str, &str)]]) -> RecordSource {
        rows.iter()
            .map(|pairs| pairs.iter().map(|(k, v)| (*k, *v)).collect())
            .collect()
    }

    #[test]
    fn cycle_timestamps_increase() {
        let temp = tempdir().unwrap();
        let metadir = Metadir::open(temp.path()).unwrap();
        let a = metadir.next_cycle().unwrap();
        let b = metadir.next_cycle().unwrap();
        assert!(a < b);
    }

    #[test]
    fn generate_then_update() {
        let temp = tempdir().unwrap();
        let metadir = Metadir::open(temp.path())
            .unwrap()
            .with_config(Config::new().unique("id"));

        let stats = metadir
            .generate_from(
                &source(&[&[("id", "a"), ("title", "x")], &[("id", "b")]]),
                GenerateOptions::default(),
            )
            .unwrap();
        assert_eq!(stats.as_tuple(), (0, 2, 0, 0));
        assert!(metadir.meta_last_updated().unwrap().is_some());
        assert_eq!(metadir.len().unwrap(), 0);

        let stats = metadir.update(StateOptions::default()).unwrap();
        assert_eq!(stats.added, 2);
        assert_eq!(metadir.len().unwrap(), 2);
        assert!(metadir.get("a").unwrap().unwrap().has(fields::STATE_ADDED));
        assert!(metadir.meta_record("a").unwrap().unwrap().has(fields::META_ADDED));
        assert!(metadir.last_touched().unwrap() >= metadir.meta_last_updated().unwrap());
    }

    #[test]
    fn update_state_record_merges_and_stamps() {
        let temp = tempdir().unwrap();
        let metadir = Metadir::open(temp.path())
            .unwrap()
            .with_config(Config::new().unique("id"));
        metadir
            .generate_from(&source(&[&[("id", "a")]]), GenerateOptions::default())
            .unwrap();
        metadir.update(StateOptions::default()).unwrap();

        let mut update = Record::new();
        update.insert("imported", true);
        update.insert("id", "hijack");
        update.insert(fields::DELETED, 1i64);
        let row = metadir.update_state_record("a", update).unwrap();
        assert_eq!(row.get("imported"), Some(&Value::Bool(true)));
        assert_eq!(row.get("id"), Some(&Value::from("a")));
        assert!(!row.is_deleted());

        let err = metadir.update_state_record("zzz", Record::new()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn dump_writes_csv_with_urls() {
        let temp = tempdir().unwrap();
        let metadir = Metadir::open(temp.path()).unwrap().with_config(
            Config::new()
                .unique("id")
                .public("url", "https://host/{id}.pdf"),
        );
        metadir
            .generate_from(&source(&[&[("id", "a")]]), GenerateOptions::default())
            .unwrap();
        metadir.update(StateOptions::default()).unwrap();

        let mut out = Vec::new();
        assert_eq!(metadir.dump(&mut out).unwrap(), 1);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("id,"));
        assert!(text.lines().nth(1).unwrap().starts_with("a,"));
        assert!(text.contains("https://host/a.pdf"));

        let urls = metadir.public_urls("a").unwrap();
        assert_eq!(urls["url"], "https://host/a.pdf");
    }

    #[test]
    fn inspect_reports_counts() {
        let temp = tempdir().unwrap();
        let metadir = Metadir::open(temp.path())
            .unwrap()
            .with_config(Config::new().unique("id"));
        metadir
            .generate_from(&source(&[&[("id", "a")]]), GenerateOptions::default())
            .unwrap();

        let inspection = metadir.inspect().unwrap();
        assert_eq!(inspection.meta_rows, 1);
        assert_eq!(inspection.state_rows, 0);
        assert_eq!(inspection.log_steps, 1);
        let text = inspection.to_string();
        assert!(text.contains("meta: 1"));
        assert!(text.contains(META_LAST_UPDATED));
    }

    #[test]
    fn generate_from_missing_root_is_not_found() {
        let temp = tempdir().unwrap();
        let metadir = Metadir::open_with(temp.path(), temp.path().join("missing")).unwrap();
        let err = metadir.generate(GenerateOptions::default()).unwrap_err();
        assert!(err.is_not_found());
        assert!(metadir.log().steps().unwrap().is_empty());
    }
}
