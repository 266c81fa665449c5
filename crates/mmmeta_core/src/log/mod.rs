//! Append-only change log.
//!
//! The log is a directory of immutable steps. Reconcilers append one step
//! per cycle holding the rows they changed; [`AppendLog::squash`] writes a
//! checkpoint consolidating all history so replay only needs the steps
//! since the newest checkpoint.
//!
//! ## Invariants
//!
//! - Steps are never modified or deleted by the engine
//! - Step timestamps are strictly increasing
//! - Replaying from the newest squashed step yields the same rows as
//!   replaying the full history

mod appendonly;
mod step;

pub use appendonly::AppendLog;
pub use step::{decode, encode, encode_plain, split_keys, StepKind, StepName};
