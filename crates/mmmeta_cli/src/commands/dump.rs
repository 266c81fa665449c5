//! Dump command implementation.

use mmmeta_core::Metadir;
use std::io;

/// Runs the dump command.
pub fn run(metadir: &Metadir) -> Result<(), Box<dyn std::error::Error>> {
    let stdout = io::stdout();
    let rows = metadir.dump(stdout.lock())?;
    if rows == 0 {
        eprintln!("State store is empty");
    }
    Ok(())
}
