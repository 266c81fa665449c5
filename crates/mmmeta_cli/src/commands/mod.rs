//! CLI command implementations.

pub mod dump;
pub mod generate;
pub mod inspect;
pub mod load;
pub mod squash;
pub mod update;
