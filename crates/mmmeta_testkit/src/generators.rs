//! Property-based test generators using proptest.
//!
//! Text values deliberately include the empty string and text that reads
//! like a number, boolean or date, since those must stay text in the log.

use mmmeta_core::{Record, Value};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Unique key used by generated candidates.
pub const GENERATED_UNIQUE: &str = "id";

/// Strategy for unique values drawn from a small pool, so cycles collide.
///
/// `"007"` and `"7"` are distinct ids.
pub fn id_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "007", "7", "true", "2024-01-01"])
        .prop_map(str::to_string)
}

/// Strategy for text, biased towards values that look typed.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::sample::select(vec![
            "", " ", "0", "007", "-1", "1.5", "1e3", "true", "False", "null", "2024-01-01",
            "2024-01-01T10:00:00", "n:", "s:x", "a,b", "\"quoted\"", "line\nbreak",
        ])
        .prop_map(str::to_string),
        "\\PC{0,8}",
    ]
}

/// Strategy for non-reserved field names.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("f_[a-d]").expect("Invalid regex")
}

/// Strategy for field values.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        (-1000i64..1000).prop_map(Value::Integer),
        (-1.0e6f64..1.0e6).prop_map(Value::Float),
        any::<bool>().prop_map(Value::Bool),
        text_strategy().prop_map(Value::Text),
        Just(Value::Null),
    ]
}

/// Strategy for a single candidate record carrying `id`.
pub fn candidate_strategy() -> impl Strategy<Value = Record> {
    (
        id_strategy(),
        prop::collection::btree_map(field_name_strategy(), value_strategy(), 0..4),
    )
        .prop_map(|(id, fields)| {
            let mut record: Record = fields.into_iter().collect();
            record.insert(GENERATED_UNIQUE, id);
            record
        })
}

/// Strategy for one cycle's candidates, at most one per unique value.
pub fn batch_strategy() -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(candidate_strategy(), 0..6).prop_map(|records| {
        let by_id: BTreeMap<String, Record> = records
            .into_iter()
            .filter_map(|r| {
                let id = r.get(GENERATED_UNIQUE)?.canonical();
                Some((id, r))
            })
            .collect();
        by_id.into_values().collect()
    })
}

/// Strategy for a sequence of cycles.
pub fn cycles_strategy() -> impl Strategy<Value = Vec<Vec<Record>>> {
    prop::collection::vec(batch_strategy(), 1..6)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::test_runner::TestRunner;

    #[test]
    fn generated_values_survive_typed_cells() {
        let mut runner = TestRunner::default();
        runner
            .run(&value_strategy(), |value| {
                prop_assert_eq!(Value::from_cell(&value.to_cell()).unwrap(), value);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn batches_have_distinct_ids() {
        let mut runner = TestRunner::default();
        runner
            .run(&batch_strategy(), |batch| {
                let mut ids: Vec<String> = batch
                    .iter()
                    .map(|r| r.get(GENERATED_UNIQUE).unwrap().canonical())
                    .collect();
                let total = ids.len();
                ids.dedup();
                prop_assert_eq!(ids.len(), total);
                Ok(())
            })
            .unwrap();
    }
}
