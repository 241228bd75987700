//! CLI command implementations.

pub(crate) mod sync;
pub(crate) mod watch;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use docsync_config::{CliSettings, Config};
use docsync_store::SqliteStore;
use docsync_sync::{Orchestrator, SupervisorOptions};

use crate::error::CliError;
use crate::output::Output;

pub(crate) use sync::SyncArgs;
pub(crate) use watch::WatchArgs;

/// Arguments shared by every command.
#[derive(Args)]
pub(crate) struct CommonArgs {
    /// Path to configuration file (default: auto-discover docsync.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root data directory; each subdirectory is a collection (overrides config).
    #[arg(short, long)]
    root_dir: Option<PathBuf>,

    /// Database connection string (overrides config).
    #[arg(long, env = "DOCSYNC_DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Debounce window for file changes in milliseconds (overrides config).
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Enable verbose output (log every synced file).
    #[arg(short, long)]
    pub verbose: bool,
}

impl CommonArgs {
    /// Load configuration with CLI overrides applied.
    fn load_config(self) -> Result<Config, CliError> {
        let cli_settings = CliSettings {
            root_dir: self.root_dir,
            database_url: self.database_url,
            debounce_ms: self.debounce_ms,
        };
        Ok(Config::load(self.config.as_deref(), Some(&cli_settings))?)
    }

    /// Load configuration and build the orchestrator it describes.
    pub(crate) fn orchestrator(self, output: &Output) -> Result<Orchestrator, CliError> {
        let config = self.load_config()?;
        let url = config.require_database_url()?;

        output.info(&format!(
            "Data directory: {}",
            config.data_resolved.root_dir.display()
        ));
        if let Some(path) = &config.config_path {
            output.info(&format!("Config: {}", path.display()));
        }

        let store =
            SqliteStore::new(url).with_max_connections(config.database.max_connections);
        let options = SupervisorOptions {
            debounce: Duration::from_millis(config.watch.debounce_ms),
            max_consecutive_failures: config.sync.max_consecutive_failures,
        };
        Ok(
            Orchestrator::new(&config.data_resolved.root_dir, Arc::new(store))
                .with_options(options),
        )
    }
}
