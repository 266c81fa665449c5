//! Records and engine-owned fields.

use crate::error::{CoreError, CoreResult};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};
use std::collections::BTreeSet;

/// Names of the fields the engine owns.
///
/// Candidates never set these; any value they carry is discarded on ingest.
pub mod fields {
    /// When the row first entered the meta store.
    pub const META_ADDED: &str = "__meta_added";
    /// When the row's metadata last changed.
    pub const META_LAST_UPDATED: &str = "__meta_last_updated";
    /// When the row first entered the state store.
    pub const STATE_ADDED: &str = "__state_added";
    /// When the row last changed in the state store.
    pub const STATE_LAST_UPDATED: &str = "__state_last_updated";
    /// Soft-delete flag (`1` deleted, `0` or absent live).
    pub const DELETED: &str = "__deleted";
    /// When the row was soft-deleted.
    pub const DELETED_AT: &str = "__deleted_at";
    /// Why the row was soft-deleted.
    pub const DELETED_REASON: &str = "__deleted_reason";
    /// Liveness marker: the cycle that last saw this row.
    pub const SEEN: &str = "__seen";
    /// Log hint naming exactly which fields a row changes.
    pub const MMMETA_KEYS: &str = "__mmmeta_keys";

    /// All engine-owned field names.
    pub const RESERVED: &[&str] = &[
        META_ADDED,
        META_LAST_UPDATED,
        STATE_ADDED,
        STATE_LAST_UPDATED,
        DELETED,
        DELETED_AT,
        DELETED_REASON,
        SEEN,
        MMMETA_KEYS,
    ];

    /// The soft-delete fields.
    pub const DELETION: &[&str] = &[DELETED, DELETED_AT, DELETED_REASON];

    /// Returns true if `name` is engine-owned.
    pub fn is_reserved(name: &str) -> bool {
        RESERVED.contains(&name)
    }

    /// Returns true for the meta store's own timestamps.
    pub fn is_meta_bookkeeping(name: &str) -> bool {
        name == META_ADDED || name == META_LAST_UPDATED
    }
}

/// Separator between nested JSON keys in flattened field names.
pub const NESTED_SEPARATOR: char = ':';

/// An ordered mapping of field name to [`Value`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a JSON object, flattening nested objects to `outer:inner`.
    ///
    /// # Errors
    ///
    /// Returns an invalid format error if `json` is not an object.
    pub fn from_json(json: &serde_json::Value) -> CoreResult<Self> {
        let serde_json::Value::Object(map) = json else {
            return Err(CoreError::invalid_format("metadata must be a JSON object"));
        };
        let mut record = Record::new();
        flatten_into(&mut record, None, map);
        Ok(record)
    }

    /// Returns the value of `name`, if present.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns true if `name` is present and not null.
    pub fn has(&self, name: &str) -> bool {
        self.fields.get(name).is_some_and(|v| !v.is_null())
    }

    /// Sets a field, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    /// Removes a field.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Keeps only the fields for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &Value) -> bool) {
        self.fields.retain(|k, v| keep(k, v));
    }

    /// Overwrites this record's fields with every field of `other`.
    ///
    /// Fields only present here are kept.
    pub fn merge(&mut self, other: &Record) {
        for (k, v) in &other.fields {
            self.fields.insert(k.clone(), v.clone());
        }
    }

    /// Returns a copy holding only the named fields.
    #[must_use]
    pub fn project<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Record {
        let wanted: BTreeSet<&str> = names.into_iter().collect();
        self.fields
            .iter()
            .filter(|(k, _)| wanted.contains(k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Returns true if the row carries a truthy `__deleted`.
    pub fn is_deleted(&self) -> bool {
        self.get(fields::DELETED).is_some_and(Value::is_truthy)
    }

    /// Marks the row soft-deleted at `ts` for `reason`.
    pub fn soft_delete(&mut self, ts: chrono::NaiveDateTime, reason: &str) {
        self.insert(fields::DELETED, 1i64);
        self.insert(fields::DELETED_AT, ts);
        self.insert(fields::DELETED_REASON, reason);
    }

    /// Clears a soft deletion. Returns true if the row was deleted.
    pub fn revive(&mut self) -> bool {
        if !self.is_deleted() {
            return false;
        }
        self.insert(fields::DELETED, 0i64);
        self.insert(fields::DELETED_AT, Value::Null);
        self.insert(fields::DELETED_REASON, Value::Null);
        true
    }

    /// Iterates over fields in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.fields.iter()
    }

    /// Iterates over field names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn flatten_into(
    record: &mut Record,
    prefix: Option<&str>,
    map: &serde_json::Map<String, serde_json::Value>,
) {
    for (key, value) in map {
        let name = match prefix {
            Some(p) => format!("{p}{NESTED_SEPARATOR}{key}"),
            None => key.clone(),
        };
        match value {
            serde_json::Value::Object(inner) => flatten_into(record, Some(&name), inner),
            scalar => {
                record.insert(name, Value::from_json(scalar));
            }
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
