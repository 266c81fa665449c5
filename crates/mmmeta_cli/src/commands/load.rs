//! Load command implementation.

use mmmeta_core::Metadir;

/// Runs the load command.
pub fn run(metadir: &Metadir, replace: bool) -> Result<(), Box<dyn std::error::Error>> {
    let replay = metadir.log().replay_steps()?;
    if replay.is_empty() {
        return Err(format!("No log steps found in {:?}", metadir.path()).into());
    }

    let applied = metadir.load_log_into_meta(replace)?;
    println!("Loaded {} steps ({applied} rows) into the meta store", replay.len());
    Ok(())
}
