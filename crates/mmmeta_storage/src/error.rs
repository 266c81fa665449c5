//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The requested path does not exist in the backend.
    ///
    /// Every backend reports a missing blob with this variant.
    #[error("path `{path}` not found in storage `{location}`")]
    NotFound {
        /// The requested relative path.
        path: String,
        /// Where the backend lives.
        location: String,
    },

    /// The path escapes the backend root or is otherwise unusable.
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl StorageError {
    /// Creates a not found error.
    pub fn not_found(path: impl Into<String>, location: impl Into<String>) -> Self {
        Self::NotFound {
            path: path.into(),
            location: location.into(),
        }
    }

    /// Returns true if this error reports a missing path.
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::NotFound { .. } => true,
            StorageError::Io(err) => err.kind() == io::ErrorKind::NotFound,
            StorageError::InvalidPath(_) => false,
        }
    }
}
