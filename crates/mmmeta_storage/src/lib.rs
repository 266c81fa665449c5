//! # mmmeta Storage
//!
//! Blob storage backends for mmmeta.
//!
//! Backends are **opaque blob stores** addressed by relative, `/`-separated
//! paths. They do not interpret what they store: tables, log steps and
//! timestamp markers are all formatted by `mmmeta_core`.
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - A directory on the local filesystem
//! - [`InMemoryBackend`] - For testing and ephemeral metadirs
//!
//! ## Example
//!
//! ```rust
//! use mmmeta_storage::{BlobBackend, InMemoryBackend};
//!
//! let backend = InMemoryBackend::new();
//! backend.save("db/step.append", b"id\n1\n").unwrap();
//! assert!(backend.exists("db/step.append"));
//! assert_eq!(backend.children("db").unwrap(), vec!["step.append".to_string()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{normalize, BlobBackend};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
