//! docsync CLI - mirror directories of JSON files into a document database.
//!
//! Provides commands for:
//! - `watch`: Sync every collection directory and keep watching for changes
//! - `sync`: Sync every collection directory once and exit

mod commands;
mod error;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{SyncArgs, WatchArgs};
use output::Output;

/// Application version from Cargo.toml.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// docsync - mirror JSON files into a document database.
#[derive(Parser)]
#[command(name = "docsync", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync all collections and watch them for changes.
    Watch(WatchArgs),
    /// Sync all collections once and exit.
    Sync(SyncArgs),
}

impl Commands {
    fn verbose(&self) -> bool {
        match self {
            Self::Watch(args) => args.common.verbose,
            Self::Sync(args) => args.common.verbose,
        }
    }
}

/// Build the log filter.
///
/// --verbose enables INFO level, otherwise use `RUST_LOG` or default to WARN.
/// Per-file failures are only reported through logs, so WARN is the floor.
fn env_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    if verbose {
        return EnvFilter::new("info");
    }
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}

/// Describe a failure to load an environment file. A missing file is fine.
fn env_file_warning(result: &Result<PathBuf, dotenvy::Error>) -> Option<String> {
    match result {
        Err(err) if !err.not_found() => Some(format!("Failed to load environment file: {err}")),
        _ => None,
    }
}

fn main() {
    let output = Output::new();

    // Local overrides first; dotenvy never replaces variables that are already set.
    for result in [dotenvy::from_filename(".env.local"), dotenvy::dotenv()] {
        if let Some(warning) = env_file_warning(&result) {
            output.warning(&warning);
        }
    }

    let cli = Cli::parse();

    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(cli.command.verbose(), rust_log.as_deref()))
        .init();

    let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    let result = match cli.command {
        Commands::Watch(args) => rt.block_on(args.execute(VERSION)),
        Commands::Sync(args) => rt.block_on(args.execute()),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
