//! State reconciler.
//!
//! Propagates the meta store into the state store. State rows are merged
//! field by field, so fields written by downstream tooling survive every
//! cycle unless `cleanup` is requested.

use super::{changed_fields, ReconcileStats, REASON_STATE_MISSING};
use crate::config::Config;
use crate::record::{fields, Record};
use crate::table::{RecordStore, Table};
use crate::validate::Validator;
use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use tracing::{error, info, warn};

/// Options for one state reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateOptions {
    /// Drop the state store first.
    pub replace: bool,
    /// Strip every field that is neither configured nor `_`-prefixed.
    pub cleanup: bool,
}

/// Reconciles the state store from the meta store.
pub struct StateReconciler<'a> {
    config: &'a Config,
    validator: Validator,
}

impl<'a> StateReconciler<'a> {
    /// Creates a reconciler for `config`.
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            validator: Validator::new(config),
        }
    }

    /// Reconciles `state` from `meta` at cycle timestamp `ts`.
    ///
    /// A state row is soft-deleted when its id is absent from `meta` or
    /// the meta row is deleted. Committing `state` is up to the caller.
    pub fn reconcile(
        &self,
        meta: &Table,
        state: &mut Table,
        ts: NaiveDateTime,
        opts: StateOptions,
    ) -> ReconcileStats {
        if opts.replace {
            state.drop_table();
        }
        if opts.cleanup {
            let keys = self.config.keys();
            for (_, row) in state.iter_mut() {
                row.retain(|name, _| keys.contains(name) || name.starts_with('_'));
            }
        }

        let mut stats = ReconcileStats::default();
        let mut seen: BTreeSet<&str> = BTreeSet::new();

        for (key, meta_row) in meta.iter() {
            seen.insert(key);

            if meta_row.is_deleted() {
                if let Some(row) = state.get_mut_by_key(key) {
                    if !row.is_deleted() {
                        soft_delete(row, ts);
                        stats.deleted += 1;
                    }
                }
                continue;
            }
            if let Err(err) = self.validator.validate(meta_row) {
                error!("{err}");
                stats.invalid += 1;
                continue;
            }

            let mut candidate = meta_row.clone();
            candidate.retain(|name, _| name != fields::SEEN && !fields::DELETION.contains(&name));

            match state.get_mut_by_key(key) {
                Some(row) => {
                    let changed = changed_fields(&candidate, row, fields::is_reserved);
                    let revived = row.revive();
                    row.merge(&candidate);
                    if changed.is_empty() && !revived {
                        stats.skipped += 1;
                    } else {
                        row.insert(fields::STATE_LAST_UPDATED, ts);
                        stats.updated += 1;
                    }
                }
                None => {
                    candidate.insert(fields::STATE_ADDED, ts);
                    candidate.insert(fields::STATE_LAST_UPDATED, ts);
                    match state.replace(candidate) {
                        Ok(_) => stats.added += 1,
                        Err(err) => {
                            error!("{err}");
                            stats.invalid += 1;
                        }
                    }
                }
            }
        }

        for (key, row) in state.iter_mut() {
            if !seen.contains(key.as_str()) && !row.is_deleted() {
                soft_delete(row, ts);
                stats.deleted += 1;
            }
        }

        info!("Updated {}", stats.updated);
        info!("Added {}", stats.added);
        info!("Skipped {} not changed files", stats.skipped);
        if stats.invalid > 0 {
            warn!("{} invalid files", stats.invalid);
        }
        if stats.deleted > 0 {
            warn!("{} soft deleted files", stats.deleted);
        }
        stats
    }
}

fn soft_delete(row: &mut Record, ts: NaiveDateTime) {
    row.soft_delete(ts, REASON_STATE_MISSING);
    row.insert(fields::STATE_LAST_UPDATED, ts);
}
