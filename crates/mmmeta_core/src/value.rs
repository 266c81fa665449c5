//! Scalar field values.
//!
//! Every record field holds one [`Value`]. Values have a single canonical
//! text form (used for URL templates and change detection) and one
//! explicit coercion rule, [`Value::cast`], for reading untyped text.
//!
//! Persisted cells use a typed form instead, `<tag>:<canonical>`, so that
//! every value reads back exactly:
//!
//! | Tag | Type |
//! |-----|------|
//! | `n` | null |
//! | `b` | bool |
//! | `i` | integer |
//! | `f` | float |
//! | `s` | text |
//! | `t` | timestamp |

use crate::error::{CoreError, CoreResult};
use chrono::{NaiveDate, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical timestamp format: sortable, microsecond precision.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Accepted input formats for timestamps, tried in order.
const TIMESTAMP_INPUT_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// A typed scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value (equivalent to an absent field).
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed 64-bit integer.
    Integer(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Naive (UTC) timestamp.
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Coerces a text cell into a typed value.
    ///
    /// Rules, first match wins (surrounding whitespace is ignored for
    /// detection only):
    /// - empty → `Null`
    /// - `true` / `false` (any case) → `Bool`
    /// - base-10 integer in `i64` range → `Integer`
    /// - finite decimal float → `Float`
    /// - ISO-8601 datetime or `YYYY-MM-DD` date → `Timestamp`
    /// - anything else → `Text`, unmodified
    #[must_use]
    pub fn cast(raw: &str) -> Self {
        let s = raw.trim();
        if s.is_empty() {
            return Value::Null;
        }
        if s.eq_ignore_ascii_case("true") {
            return Value::Bool(true);
        }
        if s.eq_ignore_ascii_case("false") {
            return Value::Bool(false);
        }
        if let Ok(n) = s.parse::<i64>() {
            return Value::Integer(n);
        }
        if looks_numeric(s) {
            if let Ok(f) = s.parse::<f64>() {
                if f.is_finite() {
                    return Value::Float(f);
                }
            }
        }
        if let Some(ts) = parse_timestamp(s) {
            return Value::Timestamp(ts);
        }
        Value::Text(raw.to_string())
    }

    /// Returns the canonical text form. `Null` renders as the empty string.
    #[must_use]
    pub fn canonical(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Integer(n) => n.to_string(),
            // Debug keeps the decimal point ("1.0"), so floats survive a cast
            Value::Float(f) => format!("{f:?}"),
            Value::Text(s) => s.clone(),
            Value::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// Compares two optional values for change detection.
    ///
    /// Absent and `Null` are the same; everything else compares by
    /// canonical text. Falsy values (`0`, `""`, `false`) are not null.
    #[must_use]
    pub fn equivalent(a: Option<&Value>, b: Option<&Value>) -> bool {
        fn norm(v: Option<&Value>) -> Option<String> {
            match v {
                None | Some(Value::Null) => None,
                Some(v) => Some(v.canonical()),
            }
        }
        norm(a) == norm(b)
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true for non-zero integers, `true`, and non-empty text.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Timestamp(_) => true,
        }
    }

    /// Get this value as text, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as a timestamp, if it is one.
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Converts a decoded JSON scalar.
    ///
    /// Arrays are kept as their compact JSON text. Objects are not scalars;
    /// callers flatten them first (see [`crate::Record::from_json`]).
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }

    /// Renders the typed cell form, e.g. `s:007` or `i:7`.
    #[must_use]
    pub fn to_cell(&self) -> String {
        let tag = match self {
            Value::Null => 'n',
            Value::Bool(_) => 'b',
            Value::Integer(_) => 'i',
            Value::Float(_) => 'f',
            Value::Text(_) => 's',
            Value::Timestamp(_) => 't',
        };
        format!("{tag}:{}", self.canonical())
    }

    /// Parses a typed cell written by [`Value::to_cell`].
    ///
    /// Text after the `s:` tag is taken verbatim, never coerced.
    ///
    /// # Errors
    ///
    /// Returns an invalid format error for an unknown tag or a payload
    /// that does not parse as its tagged type.
    pub fn from_cell(cell: &str) -> CoreResult<Self> {
        let invalid = || CoreError::invalid_format(format!("not a typed cell: {cell:?}"));
        let (tag, payload) = cell.split_once(':').ok_or_else(invalid)?;
        let value = match tag {
            "n" if payload.is_empty() => Value::Null,
            "b" => Value::Bool(payload.parse().map_err(|_| invalid())?),
            "i" => Value::Integer(payload.parse().map_err(|_| invalid())?),
            "f" => Value::Float(payload.parse().map_err(|_| invalid())?),
            "s" => Value::Text(payload.to_string()),
            "t" => Value::Timestamp(parse_timestamp(payload).ok_or_else(invalid)?),
            _ => return Err(invalid()),
        };
        Ok(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        i64::try_from(n).map_or(Value::Float(n as f64), Value::Integer)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(ts: NaiveDateTime) -> Self {
        Value::Timestamp(ts)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

fn looks_numeric(s: &str) -> bool {
    let mut digits = false;
    for c in s.chars() {
        match c {
            '0'..='9' => digits = true,
            '+' | '-' | '.' | 'e' | 'E' => {}
            _ => return false,
        }
    }
    digits
}

/// Current UTC time at microsecond precision.
pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(6)
}

/// Parses an ISO-8601 datetime or a plain date (midnight).
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    for fmt in TIMESTAMP_INPUT_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32, s: u32, micro: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 3, 4)
            .unwrap()
            .and_hms_micro_opt(h, m, s, micro)
            .unwrap()
    }

    #[test]
    fn cast_scalars() {
        assert_eq!(Value::cast(""), Value::Null);
        assert_eq!(Value::cast("  "), Value::Null);
        assert_eq!(Value::cast("True"), Value::Bool(true));
        assert_eq!(Value::cast("false"), Value::Bool(false));
        assert_eq!(Value::cast("42"), Value::Integer(42));
        assert_eq!(Value::cast(" -7 "), Value::Integer(-7));
        assert_eq!(Value::cast("1.5"), Value::Float(1.5));
        assert_eq!(Value::cast("1.0"), Value::Float(1.0));
        assert_eq!(Value::cast("1e3"), Value::Float(1000.0));
    }

    #[test]
    fn cast_rejects_float_words() {
        assert_eq!(Value::cast("inf"), Value::Text("inf".into()));
        assert_eq!(Value::cast("NaN"), Value::Text("NaN".into()));
        assert_eq!(Value::cast("e"), Value::Text("e".into()));
    }

    #[test]
    fn cast_timestamps() {
        assert_eq!(
            Value::cast("2021-03-04T05:06:07.000008"),
            Value::Timestamp(ts(5, 6, 7, 8))
        );
        assert_eq!(
            Value::cast("2021-03-04 05:06:07"),
            Value::Timestamp(ts(5, 6, 7, 0))
        );
        assert_eq!(Value::cast("2021-03-04"), Value::Timestamp(ts(0, 0, 0, 0)));
    }

    #[test]
    fn cast_keeps_text_untrimmed() {
        assert_eq!(Value::cast(" hello "), Value::Text(" hello ".into()));
        assert_eq!(
            Value::cast("0011d580dcdff07f"),
            Value::Text("0011d580dcdff07f".into())
        );
    }

    #[test]
    fn canonical_forms_cast_back() {
        let values = [
            Value::Bool(true),
            Value::Integer(-3),
            Value::Float(2.0),
            Value::Float(0.1),
            Value::Text("abc".into()),
            Value::Timestamp(ts(23, 59, 59, 999_999)),
        ];
        for v in values {
            assert_eq!(Value::cast(&v.canonical()), v, "{v:?}");
        }
        assert_eq!(Value::Null.canonical(), "");
    }

    #[test]
    fn typed_cells_keep_text_as_text() {
        let values = [
            Value::Null,
            Value::Bool(false),
            Value::Integer(7),
            Value::Float(1.0),
            Value::Text(String::new()),
            Value::Text("007".into()),
            Value::Text("true".into()),
            Value::Text("2024-01-01".into()),
            Value::Text("i:7".into()),
            Value::Timestamp(ts(1, 2, 3, 4)),
        ];
        for v in values {
            assert_eq!(Value::from_cell(&v.to_cell()).unwrap(), v, "{v:?}");
        }
        assert_eq!(Value::Text("007".into()).to_cell(), "s:007");
        assert_eq!(Value::Null.to_cell(), "n:");
    }

    #[test]
    fn typed_cells_reject_garbage() {
        assert!(Value::from_cell("007").is_err());
        assert!(Value::from_cell("x:1").is_err());
        assert!(Value::from_cell("i:seven").is_err());
        assert!(Value::from_cell("n:x").is_err());
        assert!(Value::from_cell("t:yesterday").is_err());
    }

    #[test]
    fn equivalence_treats_null_as_absent() {
        assert!(Value::equivalent(None, Some(&Value::Null)));
        assert!(Value::equivalent(Some(&Value::Integer(1)), Some(&Value::Text("1".into()))));
        assert!(!Value::equivalent(None, Some(&Value::Integer(0))));
        assert!(!Value::equivalent(Some(&Value::Null), Some(&Value::Text(String::new()))));
        assert!(!Value::equivalent(Some(&Value::Bool(false)), None));
    }

    #[test]
    fn from_json_scalars() {
        let json: serde_json::Value =
            serde_json::json!({"a": 1, "b": 1.5, "c": "x", "d": null, "e": [1, 2], "f": true});
        assert_eq!(Value::from_json(&json["a"]), Value::Integer(1));
        assert_eq!(Value::from_json(&json["b"]), Value::Float(1.5));
        assert_eq!(Value::from_json(&json["c"]), Value::Text("x".into()));
        assert_eq!(Value::from_json(&json["d"]), Value::Null);
        assert_eq!(Value::from_json(&json["e"]), Value::Text("[1,2]".into()));
        assert_eq!(Value::from_json(&json["f"]), Value::Bool(true));
    }

    #[test]
    fn truthiness() {
        assert!(Value::Integer(1).is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Text(String::new()).is_truthy());
    }
}
