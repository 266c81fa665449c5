//! Error types for mmmeta core.

use crate::validate::ValidationError;
use mmmeta_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in mmmeta core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[source] StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A path or key does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// Table snapshot could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// Log step could not be written or parsed.
    #[error("log step error: {0}")]
    Csv(#[from] csv::Error),

    /// Metadata file is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// A record is missing required keys.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A row carries no value for the table's unique key.
    #[error("row has no value for unique key `{key}`")]
    MissingUniqueKey {
        /// The unique key name.
        key: String,
    },

    /// Two rows share a value under a new unique key during migration.
    #[error("duplicate value `{id}` for unique key `{key}`")]
    KeyMigrationCollision {
        /// The new unique key.
        key: String,
        /// The colliding value.
        id: String,
    },

    /// A key/value store key is not allowed.
    #[error("illegal key: {key}")]
    IllegalKey {
        /// The rejected key.
        key: String,
    },

    /// An output template references a field the record lacks.
    #[error("template `{template}` references missing field `{field}`")]
    Template {
        /// The template.
        template: String,
        /// The missing field.
        field: String,
    },

    /// Another process holds the metadir lock.
    #[error("metadir locked: another process has exclusive access")]
    MetadirLocked,

    /// Invalid persisted data.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },
}

impl CoreError {
    /// Creates a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Returns true if this error reports a missing path or key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound { .. })
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { path, location } => Self::NotFound {
                what: format!("`{path}` in `{location}`"),
            },
            other => Self::Storage(other),
        }
    }
}
