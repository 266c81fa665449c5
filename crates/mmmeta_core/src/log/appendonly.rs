//! Append-only log backend.

use super::step::{self, split_keys, StepKind, StepName};
use crate::error::CoreResult;
use crate::record::{fields, Record};
use crate::table::{RecordStore, Table};
use crate::value;
use chrono::Duration;
use mmmeta_storage::BlobBackend;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Directory of immutable log steps in a blob backend.
#[derive(Clone)]
pub struct AppendLog {
    backend: Arc<dyn BlobBackend>,
    dir: String,
    unique: String,
}

impl AppendLog {
    /// Opens the log stored under `dir`, keyed on `unique`.
    pub fn new(
        backend: Arc<dyn BlobBackend>,
        dir: impl Into<String>,
        unique: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            dir: dir.into(),
            unique: unique.into(),
        }
    }

    /// Directory holding the steps.
    pub fn dir(&self) -> &str {
        &self.dir
    }

    /// All steps, oldest first. Unrelated files are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub fn steps(&self) -> CoreResult<Vec<StepName>> {
        let mut steps: Vec<StepName> = self
            .backend
            .children(&self.dir)?
            .into_iter()
            .filter_map(|name| match StepName::parse(&name) {
                Ok(step) => Some(step),
                Err(_) => {
                    debug!(file = %name, "ignoring non-step file in log");
                    None
                }
            })
            .collect();
        steps.sort();
        Ok(steps)
    }

    /// Steps needed to rebuild the current state, oldest first.
    ///
    /// Walks back from the newest step until a squashed step is included,
    /// or to the start of the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub fn replay_steps(&self) -> CoreResult<Vec<StepName>> {
        let mut selected = Vec::new();
        for step in self.steps()?.into_iter().rev() {
            selected.push(step);
            if step.is_squashed() {
                break;
            }
        }
        selected.reverse();
        Ok(selected)
    }

    /// Writes `rows` as a new `append` step.
    ///
    /// Returns `None` without touching storage when `rows` is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write fails.
    pub fn write(&self, rows: &[Record]) -> CoreResult<Option<StepName>> {
        self.write_kind(rows, StepKind::Append)
    }

    /// Writes `rows` as a new step of `kind`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write fails.
    pub fn write_kind(&self, rows: &[Record], kind: StepKind) -> CoreResult<Option<StepName>> {
        if rows.is_empty() {
            return Ok(None);
        }
        let name = self.next_name(kind)?;
        let data = step::encode(&self.unique, rows)?;
        self.backend.save(&self.path_of(&name), &data)?;
        debug!(step = %name, rows = rows.len(), "wrote log step");
        Ok(Some(name))
    }

    /// Loads the rows of a single step.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for a missing step, or a decoding error.
    pub fn load_step(&self, name: &StepName) -> CoreResult<Vec<Record>> {
        let data = self.backend.load(&self.path_of(name))?;
        step::decode(&data)
    }

    /// Replays history into `target`. Returns the number of rows applied.
    ///
    /// A row carrying `__mmmeta_keys` applies only those fields, the
    /// unique key and the meta bookkeeping timestamps, so minimal diffs
    /// never clobber fields they did not touch. Rows without a unique
    /// value are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a step cannot be read or decoded.
    pub fn load(&self, target: &mut dyn RecordStore) -> CoreResult<usize> {
        let unique = target.unique_key().to_string();
        let mut applied = 0;
        for name in self.replay_steps()? {
            let rows = self.load_step(&name)?;
            debug!(step = %name, rows = rows.len(), "replaying log step");
            for row in rows {
                let row = restrict_to_keys(row, &unique);
                match target.upsert(row) {
                    Ok(_) => applied += 1,
                    Err(err) => warn!(step = %name, "skipping log row: {err}"),
                }
            }
        }
        Ok(applied)
    }

    /// Writes a `squashed` step consolidating all replayable history.
    ///
    /// Superseded steps are left in place. Returns `None` when the log
    /// holds no rows.
    ///
    /// # Errors
    ///
    /// Returns an error if replay or the write fails.
    pub fn squash(&self) -> CoreResult<Option<StepName>> {
        let mut table = Table::new(self.unique.clone());
        self.load(&mut table)?;
        let rows: Vec<Record> = table.all().cloned().collect();
        let name = self.write_kind(&rows, StepKind::Squashed)?;
        if let Some(name) = &name {
            info!(step = %name, rows = rows.len(), "squashed log");
        }
        Ok(name)
    }

    fn next_name(&self, kind: StepKind) -> CoreResult<StepName> {
        let mut ts = value::now();
        if let Some(last) = self.steps()?.last() {
            if ts <= last.ts {
                ts = last.ts + Duration::microseconds(1);
            }
        }
        Ok(StepName::new(ts, kind))
    }

    fn path_of(&self, name: &StepName) -> String {
        format!("{}/{}", self.dir, name)
    }
}

/// Applies the `__mmmeta_keys` restriction and strips the hint.
fn restrict_to_keys(mut row: Record, unique: &str) -> Record {
    let Some(raw) = row.remove(fields::MMMETA_KEYS) else {
        return row;
    };
    let keys: BTreeSet<String> = split_keys(&raw.canonical());
    row.retain(|name, _| {
        name == unique || keys.contains(name) || fields::is_meta_bookkeeping(name)
    });
    row
}

impl std::fmt::Debug for AppendLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppendLog")
            .field("location", &self.backend.location())
            .field("dir", &self.dir)
            .field("unique", &self.unique)
            .finish()
    }
}
