//! Metadata sources.
//!
//! A source yields candidate records for the meta reconciler. Decoding
//! failures are yielded as `Err` items so the reconciler can count them
//! as invalid without aborting the cycle.

use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use chrono::{DateTime, NaiveDateTime, Utc};
use mmmeta_storage::{BlobBackend, FileBackend};
use sha1::{Digest, Sha1};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Name of the metadir directory inside a files root; never a source.
pub const METADIR_NAME: &str = "_mmmeta";

/// Field of a [`RawFileSource`] record holding the path below the root.
pub const RAW_FILE_PATH: &str = "file_path";

/// Iterator over candidate records.
pub type Candidates<'a> = Box<dyn Iterator<Item = CoreResult<Record>> + 'a>;

/// Something that yields candidate records.
pub trait MetadataSource {
    /// Lists the candidates.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be listed at all.
    fn candidates(&self) -> CoreResult<Candidates<'_>>;
}

/// Relative paths of every file under the root, skipping the metadir.
fn listing(files: &FileBackend) -> CoreResult<Vec<String>> {
    let prefix = format!("{METADIR_NAME}/");
    Ok(files
        .children(".")?
        .into_iter()
        .filter(|path| !path.starts_with(&prefix))
        .collect())
}

/// Every `*.json` file under a files root, decoded as one record.
#[derive(Debug)]
pub struct JsonMetadataSource {
    files: FileBackend,
}

impl JsonMetadataSource {
    /// Opens an existing files root.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if `root` does not exist.
    pub fn open(root: &Path) -> CoreResult<Self> {
        Ok(Self {
            files: FileBackend::open_existing(root)?,
        })
    }

    fn decode(&self, path: &str) -> CoreResult<Record> {
        let bytes = self.files.load(path)?;
        let json: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::invalid_format(format!("{path}: {e}")))?;
        Record::from_json(&json).map_err(|e| CoreError::invalid_format(format!("{path}: {e}")))
    }
}

impl MetadataSource for JsonMetadataSource {
    fn candidates(&self) -> CoreResult<Candidates<'_>> {
        let paths: Vec<String> = listing(&self.files)?
            .into_iter()
            .filter(|path| path.ends_with(".json"))
            .collect();
        Ok(Box::new(paths.into_iter().map(move |path| self.decode(&path))))
    }
}

/// Every regular file under a files root, described by its attributes.
///
/// Records carry `file_name` (base name), `file_path` (relative to the
/// root), `file_size`, `created_at`, `modified_at` and `content_hash`
/// (lowercase hex SHA-1 of the content).
#[derive(Debug)]
pub struct RawFileSource {
    files: FileBackend,
}

impl RawFileSource {
    /// Opens an existing files root.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if `root` does not exist.
    pub fn open(root: &Path) -> CoreResult<Self> {
        Ok(Self {
            files: FileBackend::open_existing(root)?,
        })
    }

    fn describe(&self, path: &str) -> CoreResult<Record> {
        let full = self.files.resolve(path)?;
        let meta = fs::metadata(&full)?;
        let modified = meta.modified()?;
        let created = meta.created().unwrap_or(modified);
        let name = Path::new(path)
            .file_name()
            .map_or_else(|| path.to_string(), |n| n.to_string_lossy().into_owned());

        let mut record = Record::new();
        record.insert("file_name", name);
        record.insert(RAW_FILE_PATH, path);
        record.insert("file_size", meta.len());
        record.insert("created_at", naive_utc(created));
        record.insert("modified_at", naive_utc(modified));
        record.insert("content_hash", hash_file(&full)?);
        Ok(record)
    }
}

impl MetadataSource for RawFileSource {
    fn candidates(&self) -> CoreResult<Candidates<'_>> {
        let paths = listing(&self.files)?;
        Ok(Box::new(paths.into_iter().map(move |path| self.describe(&path))))
    }
}

/// Candidates held in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordSource {
    records: Vec<Record>,
}

impl RecordSource {
    /// Wraps `records`.
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl FromIterator<Record> for RecordSource {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl MetadataSource for RecordSource {
    fn candidates(&self) -> CoreResult<Candidates<'_>> {
        Ok(Box::new(self.records.iter().cloned().map(Ok)))
    }
}

/// Lowercase hex SHA-1 of a file's content.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read.
pub fn hash_file(path: &Path) -> CoreResult<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn naive_utc(time: SystemTime) -> NaiveDateTime {
    DateTime::<Utc>::from(time).naive_utc()
}
