//! Metadir directory management.
//!
//! This module handles the file system layout of a metadir:
//!
//! ```text
//! <base>/_mmmeta/
//! ├─ config.yml        # Optional configuration
//! ├─ LOCK              # Advisory lock for single-writer
//! ├─ meta.db           # Meta store snapshot
//! ├─ state.db          # State store snapshot
//! ├─ db/               # Append-only log steps
//! └─ _store/           # Timestamp key/value store
//! ```
//!
//! The LOCK file ensures only one process works on the metadir at a time.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::source::METADIR_NAME;
use fs2::FileExt;
use mmmeta_storage::{BlobBackend, FileBackend};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// File names within the metadir.
const LOCK_FILE: &str = "LOCK";
pub(crate) const CONFIG_FILE: &str = "config.yml";
pub(crate) const META_DB: &str = "meta.db";
pub(crate) const STATE_DB: &str = "state.db";
pub(crate) const LOG_DIR: &str = "db";
pub(crate) const STORE_DIR: &str = "_store";

/// An opened `_mmmeta` directory holding the exclusive lock.
///
/// # Thread Safety
///
/// Only one `MetadirDir` can exist per directory at a time, across
/// processes. The lock is released on drop.
#[derive(Debug)]
pub struct MetadirDir {
    base: PathBuf,
    backend: Arc<FileBackend>,
    _lock_file: File,
}

impl MetadirDir {
    /// Opens or creates `<base>/_mmmeta` and takes the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `base` exists but is not a directory
    /// - Another process holds the lock (returns `MetadirLocked`)
    /// - I/O errors occur
    pub fn open(base: &Path) -> CoreResult<Self> {
        let path = base.join(METADIR_NAME);
        let backend = FileBackend::open(&path)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        // Non-blocking; a held lock fails immediately
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::MetadirLocked);
        }
        debug!(path = %path.display(), "opened metadir");

        Ok(Self {
            base: base.to_path_buf(),
            backend: Arc::new(backend),
            _lock_file: lock_file,
        })
    }

    /// The directory containing `_mmmeta`.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// The `_mmmeta` directory itself.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.backend.root()
    }

    /// Blob backend rooted at the `_mmmeta` directory.
    #[must_use]
    pub fn backend(&self) -> Arc<dyn BlobBackend> {
        self.backend.clone()
    }

    /// Path of the configuration file.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.path().join(CONFIG_FILE)
    }

    /// Loads `config.yml`; a missing file yields the default config.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed YAML.
    pub fn load_config(&self) -> CoreResult<Config> {
        if !self.backend.exists(CONFIG_FILE) {
            return Ok(Config::default());
        }
        let text = self.backend.load_string(CONFIG_FILE)?;
        Config::from_yaml(&text)
    }
}
