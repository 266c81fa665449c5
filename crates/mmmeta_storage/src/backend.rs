//! Blob backend trait definition.

use crate::error::{StorageError, StorageResult};

/// A blob store rooted at some location (a local directory, a bucket).
///
/// Paths are relative and `/`-separated. `"."` and `""` name the root.
///
/// # Invariants
///
/// - `load` returns exactly the bytes of the last successful `save`
/// - `save` is atomic: readers see either the old or the new content
/// - `load` of a missing path fails with [`StorageError::NotFound`]
/// - `children` lists files only, sorted, relative to the given path
/// - Backends must be `Send + Sync`
///
/// # Implementors
///
/// - [`super::FileBackend`] - Local directory
/// - [`super::InMemoryBackend`] - For testing
pub trait BlobBackend: Send + Sync {
    /// Returns a human-readable description of where this backend lives.
    fn location(&self) -> String;

    /// Checks whether a file or directory exists at `path`.
    ///
    /// Invalid paths (absolute, or escaping the root) never exist.
    fn exists(&self, path: &str) -> bool;

    /// Loads the full content stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if nothing is stored at `path`,
    /// or an I/O error.
    fn load(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Atomically replaces the content at `path`, creating parents as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or an I/O error occurs.
    fn save(&self, path: &str, data: &[u8]) -> StorageResult<()>;

    /// Lists all files below `path`, recursively, as paths relative to `path`.
    ///
    /// A missing directory has no children.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    fn children(&self, path: &str) -> StorageResult<Vec<String>>;

    /// Deletes everything at `path` (a file, or a directory recursively).
    ///
    /// Deleting a missing path is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn delete(&self, path: &str) -> StorageResult<()>;

    /// Loads the content at `path` as UTF-8 text with surrounding
    /// whitespace trimmed.
    ///
    /// # Errors
    ///
    /// Same as [`BlobBackend::load`]; invalid UTF-8 is an I/O error.
    fn load_string(&self, path: &str) -> StorageResult<String> {
        let bytes = self.load(path)?;
        let text = String::from_utf8(bytes).map_err(|e| {
            StorageError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        Ok(text.trim().to_string())
    }
}

/// Normalizes a relative path into its `/`-separated components.
///
/// `"."` components and empty segments are dropped.
///
/// # Errors
///
/// Returns [`StorageError::InvalidPath`] for absolute paths and `..`
/// components.
pub fn normalize(path: &str) -> StorageResult<Vec<&str>> {
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    let mut parts = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => return Err(StorageError::InvalidPath(path.to_string())),
            other => parts.push(other),
        }
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_drops_dots() {
        assert_eq!(normalize("./db//a.append").unwrap(), vec!["db", "a.append"]);
        assert!(normalize(".").unwrap().is_empty());
        assert!(normalize("").unwrap().is_empty());
    }

    #[test]
    fn normalize_rejects_escapes() {
        assert!(normalize("../x").is_err());
        assert!(normalize("/etc/passwd").is_err());
        assert!(normalize("a/../../b").is_err());
    }
}
