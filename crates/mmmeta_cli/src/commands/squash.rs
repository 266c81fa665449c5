//! Squash command implementation.

use mmmeta_core::Metadir;

/// Runs the squash command.
pub fn run(metadir: &Metadir) -> Result<(), Box<dyn std::error::Error>> {
    match metadir.squash()? {
        Some(step) => {
            println!("✓ Wrote checkpoint {step}");
            println!(
                "  {} steps in {:?}; superseded steps are kept",
                metadir.log().steps()?.len(),
                metadir.path().join(metadir.log().dir())
            );
        }
        None => println!("Log is empty - nothing to squash"),
    }
    Ok(())
}
