//! # mmmeta Testkit
//!
//! Test utilities for mmmeta.
//!
//! This crate provides:
//! - Temporary metadirs with metadata-file helpers
//! - Property-based generators for candidate batches using proptest
//! - Table comparison under the engine's value equivalence
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mmmeta_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_metadir() {
//!     let dir = TestMetadir::new("metadata:\n  unique: id\n");
//!     dir.write_json("a.json", &serde_json::json!({"id": "a"}));
//!     dir.generate(Default::default()).unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
