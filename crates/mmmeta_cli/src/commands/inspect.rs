//! Inspect command implementation.

use mmmeta_core::{Inspection, Metadir};
use serde::Serialize;
use std::collections::BTreeMap;

/// Metadir inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// The `_mmmeta` directory.
    pub path: String,
    /// Root of the metadata files.
    pub files_root: String,
    /// Unique key in effect.
    pub unique: String,
    /// Rows in the state store.
    pub files: usize,
    /// Rows in the meta store.
    pub meta: usize,
    /// Soft-deleted rows in the state store.
    pub deleted: usize,
    /// Number of log steps.
    pub log_steps: usize,
    /// Key/value store contents, in canonical form.
    pub store: BTreeMap<String, String>,
}

impl From<Inspection> for InspectResult {
    fn from(inspection: Inspection) -> Self {
        Self {
            path: inspection.path.display().to_string(),
            files_root: inspection.files_root.display().to_string(),
            unique: inspection.unique,
            files: inspection.state_rows,
            meta: inspection.meta_rows,
            deleted: inspection.deleted,
            log_steps: inspection.log_steps,
            store: inspection
                .store
                .into_iter()
                .map(|(key, value)| (key, value.canonical()))
                .collect(),
        }
    }
}

/// Runs the inspect command.
pub fn run(metadir: &Metadir, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let inspection = metadir.inspect()?;

    match format {
        "json" => {
            let result = InspectResult::from(inspection);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => println!("{inspection}"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmmeta_core::Value;
    use std::path::PathBuf;

    #[test]
    fn json_result_flattens_store() {
        let inspection = Inspection {
            path: PathBuf::from("/data/_mmmeta"),
            files_root: PathBuf::from("/data"),
            unique: "id".to_string(),
            meta_rows: 3,
            state_rows: 2,
            deleted: 1,
            log_steps: 4,
            store: vec![("last_updated".to_string(), Value::from("x"))],
        };
        let result = InspectResult::from(inspection);
        assert_eq!(result.files, 2);
        assert_eq!(result.meta, 3);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["store"]["last_updated"], "x");
        assert_eq!(json["unique"], "id");
    }
}
