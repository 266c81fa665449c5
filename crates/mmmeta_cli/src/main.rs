//! mmmeta CLI
//!
//! Command-line interface for keeping a metadir in sync with its files.
//!
//! # Commands
//!
//! - `generate` - Reconcile metadata files into the meta store
//! - `update` - Reconcile the meta store into the state store
//! - `squash` - Write a consolidated log checkpoint
//! - `load` - Rebuild the meta store from the log
//! - `inspect` - Display metadir statistics
//! - `dump` - Print the state store as CSV

mod commands;

use clap::{Parser, Subcommand};
use mmmeta_core::Metadir;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Keep a metadata inventory in sync with a directory of files.
#[derive(Parser)]
#[command(name = "mmmeta")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base path for reading meta info and storing state
    #[arg(global = true, long, env = "MMMETA")]
    metadir: Option<PathBuf>,

    /// Base path of the files to generate the metadir from
    #[arg(global = true, long, env = "MMMETA_FILES_ROOT")]
    files_root: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile metadata files into the meta store
    Generate {
        /// Completely replace the meta store
        #[arg(long)]
        replace: bool,

        /// Soft-delete records whose metadata file disappeared
        #[arg(long)]
        ensure: bool,

        /// Soft-delete records whose artifact file is missing
        #[arg(long)]
        ensure_files: bool,

        /// Read the files themselves instead of JSON metadata
        #[arg(long)]
        no_meta: bool,
    },

    /// Reconcile the meta store into the state store
    Update {
        /// Completely replace the state store
        #[arg(long)]
        replace: bool,

        /// Drop state fields that are neither configured nor `_`-prefixed
        #[arg(long)]
        cleanup: bool,
    },

    /// Write a consolidated log checkpoint
    Squash,

    /// Rebuild the meta store from the log
    Load {
        /// Empty the meta store before loading
        #[arg(long)]
        replace: bool,
    },

    /// Display metadir statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the state store as CSV
    Dump,

    /// Show version information
    Version,
}

fn open(cli: &Cli) -> Result<Metadir, Box<dyn std::error::Error>> {
    let base = cli.metadir.clone().unwrap_or_else(|| PathBuf::from("."));
    let files_root = cli.files_root.clone().unwrap_or_else(|| base.clone());
    debug!(metadir = %base.display(), files_root = %files_root.display(), "opening metadir");
    Ok(Metadir::open_with(base, files_root)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Generate {
            replace,
            ensure,
            ensure_files,
            no_meta,
        } => {
            let metadir = open(&cli)?;
            commands::generate::run(&metadir, *replace, *ensure, *ensure_files, *no_meta)?;
        }
        Commands::Update { replace, cleanup } => {
            let metadir = open(&cli)?;
            commands::update::run(&metadir, *replace, *cleanup)?;
        }
        Commands::Squash => {
            let metadir = open(&cli)?;
            commands::squash::run(&metadir)?;
        }
        Commands::Load { replace } => {
            let metadir = open(&cli)?;
            commands::load::run(&metadir, *replace)?;
        }
        Commands::Inspect { format } => {
            let metadir = open(&cli)?;
            commands::inspect::run(&metadir, format)?;
        }
        Commands::Dump => {
            let metadir = open(&cli)?;
            commands::dump::run(&metadir)?;
        }
        Commands::Version => {
            println!("mmmeta CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("mmmeta Core v{}", mmmeta_core::VERSION);
        }
    }

    Ok(())
}
