//! Generate command implementation.

use mmmeta_core::{GenerateOptions, Metadir};

/// Runs the generate command.
pub fn run(
    metadir: &Metadir,
    replace: bool,
    ensure: bool,
    ensure_files: bool,
    no_meta: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let stats = metadir.generate(GenerateOptions {
        replace,
        ensure_liveness: ensure,
        ensure_files,
        raw_files: no_meta,
    })?;

    println!("Generated metadata for {:?}", metadir.files_root());
    println!("  Updated: {}", stats.updated);
    println!("  Added:   {}", stats.added);
    println!("  Invalid: {}", stats.invalid);
    println!("  Deleted: {}", stats.deleted);
    println!("  Skipped: {}", stats.skipped);
    Ok(())
}
