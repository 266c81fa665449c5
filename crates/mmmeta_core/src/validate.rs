//! Candidate validation.

use crate::config::Config;
use crate::record::Record;
use std::collections::BTreeSet;
use thiserror::Error;

/// A record failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Required keys are absent or null.
    #[error("Missing keys: {}", join(.0))]
    MissingKeys(BTreeSet<String>),
}

fn join(keys: &BTreeSet<String>) -> String {
    keys.iter().cloned().collect::<Vec<_>>().join(", ")
}

/// Checks candidates against the configured required keys.
#[derive(Debug, Clone)]
pub struct Validator {
    required: BTreeSet<String>,
}

impl Validator {
    /// Builds a validator for the unique key, the file-name key and the
    /// configured required keys.
    pub fn new(config: &Config) -> Self {
        Self {
            required: config.required_keys(),
        }
    }

    /// Validates a record. A null value counts as absent.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingKeys`] naming every absent key.
    pub fn validate(&self, record: &Record) -> Result<(), ValidationError> {
        let missing: BTreeSet<String> = self
            .required
            .iter()
            .filter(|key| !record.has(key))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::MissingKeys(missing))
        }
    }

    /// The keys this validator requires.
    pub fn required(&self) -> &BTreeSet<String> {
        &self.required
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn validator() -> Validator {
        Validator::new(
            &Config::new()
                .file_name("_file_name")
                .required(["foreign_id"]),
        )
    }

    #[test]
    fn valid_record_passes() {
        let record: Record = [
            ("content_hash", "abc"),
            ("_file_name", "abc.pdf"),
            ("foreign_id", "1"),
        ]
        .into_iter()
        .collect();
        assert!(validator().validate(&record).is_ok());
    }

    #[test]
    fn reports_every_missing_key() {
        let record: Record = [("foo", "bar")].into_iter().collect();
        let err = validator().validate(&record).unwrap_err();

        let ValidationError::MissingKeys(keys) = &err;
        assert_eq!(keys.len(), 3);
        assert!(err.to_string().starts_with("Missing keys"));
        assert!(err.to_string().contains("foreign_id"));
    }

    #[test]
    fn null_counts_as_missing() {
        let mut record: Record = [
            ("content_hash", "abc"),
            ("_file_name", "abc.pdf"),
        ]
        .into_iter()
        .collect();
        record.insert("foreign_id", Value::Null);

        let Err(ValidationError::MissingKeys(keys)) = validator().validate(&record) else {
            panic!("expected failure");
        };
        assert_eq!(keys.into_iter().collect::<Vec<_>>(), vec!["foreign_id"]);
    }

    #[test]
    fn default_config_requires_unique_only() {
        let validator = Validator::new(&Config::default());
        assert_eq!(validator.required().len(), 1);
        let record: Record = [("content_hash", "x")].into_iter().collect();
        assert!(validator.validate(&record).is_ok());
    }
}
