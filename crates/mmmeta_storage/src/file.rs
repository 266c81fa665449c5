//! File-based blob backend for persistent storage.

use crate::backend::{normalize, BlobBackend};
use crate::error::{StorageError, StorageResult};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Suffix for temporary files during atomic writes; only these are
/// hidden from listings.
const TEMP_SUFFIX: &str = ".mmmeta-tmp";

/// A blob backend over a local directory.
///
/// # Durability
///
/// `save` follows the write-then-rename pattern:
/// 1. Write to a temporary sibling file
/// 2. Sync the temporary file to disk
/// 3. Rename it over the target
/// 4. Fsync the parent directory so the rename is durable
///
/// # Example
///
/// ```no_run
/// use mmmeta_storage::{BlobBackend, FileBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("./data/_mmmeta")).unwrap();
/// backend.save("_store/foo", b"bar").unwrap();
/// assert_eq!(backend.load_string("_store/foo").unwrap(), "bar");
/// ```
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Opens a backend rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, or if `root`
    /// exists but is not a directory.
    pub fn open(root: &Path) -> StorageResult<Self> {
        if !root.exists() {
            fs::create_dir_all(root)?;
        }
        if !root.is_dir() {
            return Err(StorageError::InvalidPath(format!(
                "not a directory: {}",
                root.display()
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Opens a backend over an existing directory without creating it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if `root` is not a directory.
    pub fn open_existing(root: &Path) -> StorageResult<Self> {
        if !root.is_dir() {
            return Err(StorageError::not_found(
                root.display().to_string(),
                "local filesystem",
            ));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Returns the root directory of this backend.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a relative path to an absolute filesystem path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidPath`] for paths escaping the root.
    pub fn resolve(&self, path: &str) -> StorageResult<PathBuf> {
        let mut full = self.root.clone();
        for part in normalize(path)? {
            full.push(part);
        }
        Ok(full)
    }

    #[cfg(unix)]
    fn sync_directory(dir: &Path) -> StorageResult<()> {
        File::open(dir)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(_dir: &Path) -> StorageResult<()> {
        // NTFS journaling covers rename durability
        Ok(())
    }
}

impl BlobBackend for FileBackend {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.exists()).unwrap_or(false)
    }

    fn load(&self, path: &str) -> StorageResult<Vec<u8>> {
        let full = self.resolve(path)?;
        if !full.is_file() {
            return Err(StorageError::not_found(path, self.location()));
        }
        Ok(fs::read(full)?)
    }

    fn save(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        let full = self.resolve(path)?;
        let parent = full
            .parent()
            .ok_or_else(|| StorageError::InvalidPath(path.to_string()))?
            .to_path_buf();
        fs::create_dir_all(&parent)?;

        let mut temp_name = full.as_os_str().to_os_string();
        temp_name.push(TEMP_SUFFIX);
        let temp_path = PathBuf::from(temp_name);

        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &full)?;
        Self::sync_directory(&parent)?;
        Ok(())
    }

    fn children(&self, path: &str) -> StorageResult<Vec<String>> {
        let dir = self.resolve(path)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in WalkDir::new(&dir).follow_links(false) {
            let entry = entry.map_err(|e| StorageError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name.ends_with(TEMP_SUFFIX) {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&dir) {
                let rel: Vec<String> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                names.push(rel.join("/"));
            }
        }
        names.sort();
        Ok(names)
    }

    fn delete(&self, path: &str) -> StorageResult<()> {
        let full = self.resolve(path)?;
        if full.is_dir() && !full.is_symlink() {
            fs::remove_dir_all(&full)?;
        } else if full.exists() || full.is_symlink() {
            fs::remove_file(&full)?;
        }
        Ok(())
    }
}
