//! # mmmeta Core
//!
//! Metadata inventory and reconciliation engine.
//!
//! This crate provides:
//! - Typed records keyed by a configurable unique field
//! - A meta store mirroring the latest ingested metadata
//! - A state store that downstream tooling may annotate freely
//! - An append-only change log with squash checkpoints
//! - Liveness-based soft deletion and unique-key migration
//!
//! ## Example
//!
//! ```rust,no_run
//! use mmmeta_core::{GenerateOptions, Metadir, StateOptions};
//!
//! # fn main() -> mmmeta_core::CoreResult<()> {
//! let metadir = Metadir::open("./data")?;
//! let generated = metadir.generate(GenerateOptions {
//!     ensure_liveness: true,
//!     ..GenerateOptions::default()
//! })?;
//! let updated = metadir.update(StateOptions::default())?;
//! println!("meta: {generated}\nstate: {updated}");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod error;
mod kv;
pub mod log;
mod metadir;
pub mod reconcile;
mod record;
mod source;
mod table;
mod validate;
mod value;

pub use config::{Config, DEFAULT_UNIQUE};
pub use dir::MetadirDir;
pub use error::{CoreError, CoreResult};
pub use kv::{KvStore, STORE_LAST_UPDATED};
pub use log::{AppendLog, StepKind, StepName};
pub use metadir::{GenerateOptions, Inspection, Metadir, META_LAST_UPDATED, STATE_LAST_UPDATED};
pub use reconcile::{
    MetaOptions, MetaReconciler, ReconcileStats, StateOptions, StateReconciler,
};
pub use record::{fields, Record, NESTED_SEPARATOR};
pub use source::{
    hash_file, Candidates, JsonMetadataSource, MetadataSource, RawFileSource, RecordSource,
    METADIR_NAME,
};
pub use table::{RecordStore, Table, TableFile};
pub use validate::{ValidationError, Validator};
pub use value::{now, parse_timestamp, Value, TIMESTAMP_FORMAT};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
