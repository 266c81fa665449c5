//! Log step naming and encoding.
//!
//! A step is a CSV file with a header row. The unique key is always the
//! first column; the remaining columns are the sorted union of every
//! row's fields. Each present field is written as a typed cell (see
//! [`Value::to_cell`]), so a step reads back exactly as written.
//!
//! An empty cell means the field is absent from that row. Null is written
//! as `n:` and empty text as `s:`.

use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use crate::value::Value;
use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use std::fmt;

/// Step file timestamp format; sorts lexically and is path-safe.
const STEP_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6f";

/// Kind of a log step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StepKind {
    /// A batch of full or partial rows from one reconciliation.
    Append,
    /// A consolidated checkpoint of all prior history.
    Squashed,
}

impl StepKind {
    /// File-name suffix for this kind.
    pub fn suffix(self) -> &'static str {
        match self {
            StepKind::Append => "append",
            StepKind::Squashed => "squashed",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "append" => Some(StepKind::Append),
            "squashed" => Some(StepKind::Squashed),
            _ => None,
        }
    }
}

/// Name of a step: its creation timestamp plus kind.
///
/// Orders chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StepName {
    /// Creation timestamp.
    pub ts: NaiveDateTime,
    /// Step kind.
    pub kind: StepKind,
}

impl StepName {
    /// Creates a step name.
    pub fn new(ts: NaiveDateTime, kind: StepKind) -> Self {
        Self { ts, kind }
    }

    /// Parses a file name such as `20240506T070809.000010.append`.
    ///
    /// # Errors
    ///
    /// Returns an invalid format error for anything else.
    pub fn parse(name: &str) -> CoreResult<Self> {
        let invalid = || CoreError::invalid_format(format!("not a log step name: {name}"));
        let (stamp, suffix) = name.rsplit_once('.').ok_or_else(invalid)?;
        let kind = StepKind::from_suffix(suffix).ok_or_else(invalid)?;
        let ts = NaiveDateTime::parse_from_str(stamp, STEP_TIMESTAMP_FORMAT)
            .map_err(|_| invalid())?;
        Ok(Self { ts, kind })
    }

    /// Returns true for a squashed step.
    pub fn is_squashed(&self) -> bool {
        self.kind == StepKind::Squashed
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            self.ts.format(STEP_TIMESTAMP_FORMAT),
            self.kind.suffix()
        )
    }
}

/// Splits a `__mmmeta_keys` cell into field names.
pub fn split_keys(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Encodes rows as a step: CSV with `unique` as the first column and
/// typed cells.
///
/// # Errors
///
/// Returns an error if the CSV writer fails.
pub fn encode(unique: &str, rows: &[Record]) -> CoreResult<Vec<u8>> {
    encode_with(unique, rows, Value::to_cell)
}

/// Encodes rows as plain CSV holding canonical text, for export.
///
/// Not readable by [`decode`].
///
/// # Errors
///
/// Returns an error if the CSV writer fails.
pub fn encode_plain(unique: &str, rows: &[Record]) -> CoreResult<Vec<u8>> {
    encode_with(unique, rows, Value::canonical)
}

fn encode_with(
    unique: &str,
    rows: &[Record],
    render: fn(&Value) -> String,
) -> CoreResult<Vec<u8>> {
    let columns: BTreeSet<&str> = rows
        .iter()
        .flat_map(Record::keys)
        .filter(|k| *k != unique)
        .collect();
    let header: Vec<&str> = std::iter::once(unique).chain(columns).collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&header)?;
    for row in rows {
        writer.write_record(
            header
                .iter()
                .map(|col| row.get(col).map(render).unwrap_or_default()),
        )?;
    }
    writer
        .into_inner()
        .map_err(|e| CoreError::Io(e.into_error()))
}

/// Decodes a CSV step back into rows.
///
/// # Errors
///
/// Returns an error if the data is not valid CSV or a cell is not a
/// typed cell.
pub fn decode(data: &[u8]) -> CoreResult<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(false)
        .from_reader(data);
    let header = reader.headers()?.clone();

    let mut rows = Vec::new();
    for result in reader.records() {
        let cells = result?;
        let mut row = Record::new();
        for (name, cell) in header.iter().zip(cells.iter()) {
            if !cell.is_empty() {
                row.insert(name, Value::from_cell(cell)?);
            }
        }
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fields;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_micro_opt(7, 8, 9, 10)
            .unwrap()
    }

    #[test]
    fn step_name_round_trip() {
        let name = StepName::new(ts(), StepKind::Append);
        assert_eq!(name.to_string(), "20240506T070809.000010.append");
        assert_eq!(StepName::parse(&name.to_string()).unwrap(), name);

        let squashed = StepName::new(ts(), StepKind::Squashed);
        assert!(StepName::parse(&squashed.to_string()).unwrap().is_squashed());
    }

    #[test]
    fn step_name_rejects_other_files() {
        assert!(StepName::parse("notes.txt").is_err());
        assert!(StepName::parse("20240506T070809.000010.tmp").is_err());
        assert!(StepName::parse("yesterday.append").is_err());
    }

    #[test]
    fn step_names_sort_chronologically() {
        let earlier = StepName::new(ts(), StepKind::Squashed);
        let later = StepName::new(ts() + chrono::Duration::microseconds(1), StepKind::Append);
        assert!(earlier < later);
    }

    #[test]
    fn unique_column_comes_first() {
        let rows: Vec<Record> = vec![
            [("id", "a"), ("title", "x")].into_iter().collect(),
            [("id", "b"), ("author", "y")].into_iter().collect(),
        ];
        let data = encode("id", &rows).unwrap();
        let text = String::from_utf8(data).unwrap();
        assert_eq!(text.lines().next(), Some("id,author,title"));
        assert_eq!(text.lines().nth(1), Some("s:a,,s:x"));
    }

    #[test]
    fn plain_encoding_has_untagged_cells() {
        let rows: Vec<Record> = vec![[("id", "a"), ("title", "x")].into_iter().collect()];
        let text = String::from_utf8(encode_plain("id", &rows).unwrap()).unwrap();
        assert_eq!(text, "id,title\na,x\n");
    }

    #[test]
    fn decode_omits_empty_cells() {
        let rows = decode(b"id,author,title\ns:a,,s:x\n").unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].get("author").is_none());
        assert_eq!(rows[0].get("title"), Some(&Value::from("x")));
    }

    #[test]
    fn decode_keeps_explicit_nulls() {
        let rows = decode(b"id,__mmmeta_keys,title\ns:a,s:title,n:\n").unwrap();
        assert_eq!(rows[0].get("title"), Some(&Value::Null));
        assert_eq!(rows[0].get(fields::MMMETA_KEYS), Some(&Value::from("title")));
    }

    #[test]
    fn decode_reads_typed_cells() {
        let rows = decode(
            b"id,n,f,ok,at,text\ni:1,i:42,f:1.5,b:true,t:2024-05-06T07:08:09.000010,s:hello world\n",
        )
        .unwrap();
        let row = &rows[0];
        assert_eq!(row.get("id"), Some(&Value::Integer(1)));
        assert_eq!(row.get("n"), Some(&Value::Integer(42)));
        assert_eq!(row.get("f"), Some(&Value::Float(1.5)));
        assert_eq!(row.get("ok"), Some(&Value::Bool(true)));
        assert_eq!(row.get("at"), Some(&Value::Timestamp(ts())));
        assert_eq!(row.get("text"), Some(&Value::from("hello world")));
    }

    #[test]
    fn decode_rejects_untyped_cells() {
        assert!(decode(b"id,title\n007,x\n").is_err());
    }

    #[test]
    fn text_that_looks_typed_stays_text() {
        let rows: Vec<Record> = vec![[
            ("id", "007"),
            ("title", ""),
            ("flag", "true"),
            ("day", "2024-01-01"),
            ("ratio", "1.5"),
        ]
        .into_iter()
        .collect()];
        let decoded = decode(&encode("id", &rows).unwrap()).unwrap();
        assert_eq!(decoded, rows);
        assert_eq!(decoded[0].get("title"), Some(&Value::from("")));
    }

    #[test]
    fn nulls_survive_without_keys_hint() {
        let mut row: Record = [("id", "a")].into_iter().collect();
        row.insert("note", Value::Null);
        let decoded = decode(&encode("id", &[row.clone()]).unwrap()).unwrap();
        assert_eq!(decoded, vec![row]);
    }

    #[test]
    fn quoting_survives() {
        let rows: Vec<Record> = vec![[("id", "a"), ("title", "x, \"y\"\nz")]
            .into_iter()
            .collect()];
        let decoded = decode(&encode("id", &rows).unwrap()).unwrap();
        assert_eq!(decoded, rows);
    }

    #[test]
    fn split_keys_ignores_blanks() {
        let keys = split_keys("title, author,,");
        assert_eq!(keys.into_iter().collect::<Vec<_>>(), vec!["author", "title"]);
    }
}
