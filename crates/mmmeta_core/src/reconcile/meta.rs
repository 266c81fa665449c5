//! Metadata reconciler.

use super::{changed_fields, ReconcileStats, REASON_FILE_MISSING, REASON_META_MISSING};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::log::AppendLog;
use crate::record::{fields, Record};
use crate::source::RAW_FILE_PATH;
use crate::table::{RecordStore, Table};
use crate::validate::Validator;
use crate::value::Value;
use chrono::NaiveDateTime;
use mmmeta_storage::BlobBackend;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{error, info, warn};

/// Options for one metadata reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetaOptions {
    /// Drop the meta store before ingesting.
    pub replace: bool,
    /// Soft-delete rows absent from the candidates.
    pub ensure_liveness: bool,
    /// Soft-delete rows whose artifact file is missing.
    pub ensure_files: bool,
    /// Rows describe raw files; the artifact is found through
    /// `file_path` instead of the configured file-name key.
    pub raw_files: bool,
}

/// What changed on a row in this cycle.
enum Change {
    /// The row is new; log it whole.
    Added,
    /// These fields changed.
    Fields(BTreeSet<String>),
}

impl Change {
    fn extend<I: IntoIterator<Item = S>, S: Into<String>>(&mut self, names: I) {
        if let Change::Fields(set) = self {
            set.extend(names.into_iter().map(Into::into));
        }
    }
}

/// Ingests candidate records into the meta store and logs the changes.
pub struct MetaReconciler<'a> {
    config: &'a Config,
    validator: Validator,
    log: &'a AppendLog,
    files: Option<&'a dyn BlobBackend>,
}

impl<'a> MetaReconciler<'a> {
    /// Creates a reconciler writing changes to `log`.
    pub fn new(config: &'a Config, log: &'a AppendLog) -> Self {
        Self {
            config,
            validator: Validator::new(config),
            log,
            files: None,
        }
    }

    /// Sets the backend artifact files are checked against.
    #[must_use]
    pub fn with_files(mut self, files: &'a dyn BlobBackend) -> Self {
        self.files = Some(files);
        self
    }

    /// Reconciles `candidates` into `table` at cycle timestamp `ts`.
    ///
    /// Invalid candidates are counted and skipped. The changed rows are
    /// written to the log as one step before this returns; committing
    /// `table` is up to the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if `ensure_files` is set without a files backend,
    /// or if writing the log step fails.
    pub fn reconcile<I>(
        &self,
        table: &mut Table,
        candidates: I,
        ts: NaiveDateTime,
        opts: MetaOptions,
    ) -> CoreResult<ReconcileStats>
    where
        I: IntoIterator<Item = CoreResult<Record>>,
    {
        let files = match (opts.ensure_files, self.files) {
            (true, None) => {
                return Err(CoreError::config(
                    "checking files requires a files root",
                ))
            }
            (true, Some(files)) => Some(files),
            (false, _) => None,
        };

        if opts.replace {
            table.drop_table();
        }

        let keys = self.config.keys();
        let mut stats = ReconcileStats::default();
        let mut changes: BTreeMap<String, Change> = BTreeMap::new();

        for candidate in candidates {
            let candidate = match candidate {
                Ok(candidate) => candidate,
                Err(err) => {
                    error!("Invalid candidate: {err}");
                    stats.invalid += 1;
                    continue;
                }
            };
            if let Err(err) = self.validator.validate(&candidate) {
                error!("{err}");
                stats.invalid += 1;
                continue;
            }
            let mut candidate = if self.config.restricts_fields() {
                candidate.project(keys.iter().map(String::as_str))
            } else {
                candidate
            };
            candidate.retain(|name, _| !fields::is_reserved(name));
            let key = table.key_of(&candidate)?;

            match table.get_mut_by_key(&key) {
                Some(existing) => {
                    let mut changed = changed_fields(&candidate, existing, fields::is_reserved);
                    if existing.revive() {
                        changed.extend(fields::DELETION.iter().map(|f| (*f).to_string()));
                    }
                    existing.merge(&candidate);
                    if opts.ensure_liveness {
                        existing.insert(fields::SEEN, ts);
                    }
                    if changed.is_empty() {
                        stats.skipped += 1;
                    } else {
                        existing.insert(fields::META_LAST_UPDATED, ts);
                        stats.updated += 1;
                        changes
                            .entry(key)
                            .or_insert_with(|| Change::Fields(BTreeSet::new()))
                            .extend(changed);
                    }
                }
                None => {
                    candidate.insert(fields::META_ADDED, ts);
                    candidate.insert(fields::META_LAST_UPDATED, ts);
                    if opts.ensure_liveness {
                        candidate.insert(fields::SEEN, ts);
                    }
                    table.replace(candidate)?;
                    stats.added += 1;
                    changes.insert(key, Change::Added);
                }
            }
        }

        if opts.ensure_liveness {
            for (key, row) in table.iter_mut() {
                let stale = row
                    .get(fields::SEEN)
                    .and_then(Value::as_timestamp)
                    .map_or(true, |seen| seen < ts);
                if stale && !row.is_deleted() {
                    soft_delete(row, ts, REASON_META_MISSING);
                    stats.deleted += 1;
                    mark_deleted(&mut changes, key);
                }
            }
        }

        if let Some(files) = files {
            let file_field = if opts.raw_files {
                RAW_FILE_PATH
            } else {
                self.config.file_name.as_str()
            };
            for (key, row) in table.iter_mut() {
                if row.is_deleted() {
                    continue;
                }
                let present = row
                    .get(file_field)
                    .filter(|v| !v.is_null())
                    .is_some_and(|name| files.exists(&name.canonical()));
                if !present {
                    soft_delete(row, ts, REASON_FILE_MISSING);
                    stats.deleted += 1;
                    mark_deleted(&mut changes, key);
                }
            }
        }

        self.log.write(&diff_rows(table, &changes))?;

        info!("Updated {}", stats.updated);
        info!("Added {}", stats.added);
        info!("Skipped {} not changed files", stats.skipped);
        if stats.invalid > 0 {
            warn!("{} invalid files", stats.invalid);
        }
        if stats.deleted > 0 {
            warn!("{} soft deleted files", stats.deleted);
        }
        Ok(stats)
    }
}

/// Builds one log row per changed row.
fn diff_rows(table: &Table, changes: &BTreeMap<String, Change>) -> Vec<Record> {
    let unique = table.unique_key();
    changes
        .iter()
        .filter_map(|(key, change)| {
            let row = table.get_by_key(key)?;
            let diff = match change {
                Change::Added => {
                    let mut diff = row.clone();
                    diff.remove(fields::SEEN);
                    diff
                }
                Change::Fields(names) => {
                    let mut diff = row.project(
                        names
                            .iter()
                            .map(String::as_str)
                            .chain([unique, fields::META_LAST_UPDATED]),
                    );
                    let listed: Vec<&str> = names.iter().map(String::as_str).collect();
                    diff.insert(fields::MMMETA_KEYS, listed.join(","));
                    diff
                }
            };
            Some(diff)
        })
        .collect()
}

fn soft_delete(row: &mut Record, ts: NaiveDateTime, reason: &str) {
    row.soft_delete(ts, reason);
    row.insert(fields::META_LAST_UPDATED, ts);
}

fn mark_deleted(changes: &mut BTreeMap<String, Change>, key: &str) {
    changes
        .entry(key.to_string())
        .or_insert_with(|| Change::Fields(BTreeSet::new()))
        .extend(fields::DELETION.iter().copied());
}
