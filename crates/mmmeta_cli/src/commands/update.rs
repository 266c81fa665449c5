//! Update command implementation.

use mmmeta_core::{Metadir, StateOptions};

/// Runs the update command.
pub fn run(
    metadir: &Metadir,
    replace: bool,
    cleanup: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let stats = metadir.update(StateOptions { replace, cleanup })?;

    println!("Updated state for {:?}", metadir.path());
    println!("  Updated: {}", stats.updated);
    println!("  Added:   {}", stats.added);
    println!("  Invalid: {}", stats.invalid);
    println!("  Deleted: {}", stats.deleted);
    println!("  Skipped: {}", stats.skipped);
    println!("  Now {} files in state database", metadir.len()?);
    Ok(())
}
