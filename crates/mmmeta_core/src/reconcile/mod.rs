//! Reconciliation of candidate records into the meta and state stores.
//!
//! Both reconcilers mutate an in-memory [`Table`](crate::Table) and leave
//! committing it to the caller. The meta reconciler writes its log step
//! before returning, so the log is always at least as new as the table.

mod meta;
mod state;

pub use meta::{MetaOptions, MetaReconciler};
pub use state::{StateOptions, StateReconciler};

use crate::record::Record;
use crate::value::Value;
use std::collections::BTreeSet;
use std::fmt;

/// Soft-delete reason for meta rows absent from the latest candidates.
pub const REASON_META_MISSING: &str = "meta-missing";
/// Soft-delete reason for meta rows whose artifact file vanished.
pub const REASON_FILE_MISSING: &str = "file-missing";
/// Soft-delete reason for state rows without a live meta row.
pub const REASON_STATE_MISSING: &str = "state-missing";

/// Counters returned by a reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Existing rows whose fields changed.
    pub updated: usize,
    /// New rows.
    pub added: usize,
    /// Candidates rejected by validation or decoding.
    pub invalid: usize,
    /// Rows soft-deleted in this cycle.
    pub deleted: usize,
    /// Existing rows with no changes.
    pub skipped: usize,
}

impl ReconcileStats {
    /// `(updated, added, invalid, deleted)`.
    pub fn as_tuple(&self) -> (usize, usize, usize, usize) {
        (self.updated, self.added, self.invalid, self.deleted)
    }

    /// Returns true if nothing was added, updated or deleted.
    pub fn is_unchanged(&self) -> bool {
        self.updated == 0 && self.added == 0 && self.deleted == 0
    }
}

impl fmt::Display for ReconcileStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "updated={} added={} invalid={} deleted={} skipped={}",
            self.updated, self.added, self.invalid, self.deleted, self.skipped
        )
    }
}

/// Fields of `candidate` whose values differ from `existing`.
///
/// Fields only present in `existing` are not changes; merging keeps them.
pub fn changed_fields(
    candidate: &Record,
    existing: &Record,
    ignore: impl Fn(&str) -> bool,
) -> BTreeSet<String> {
    candidate
        .iter()
        .filter(|(name, _)| !ignore(name.as_str()))
        .filter(|(name, value)| !Value::equivalent(Some(*value), existing.get(name)))
        .map(|(name, _)| name.clone())
        .collect()
}
