//! `docsync watch` command implementation.

use clap::Args;

use super::CommonArgs;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the watch command.
#[derive(Args)]
pub(crate) struct WatchArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

impl WatchArgs {
    /// Execute the watch command.
    ///
    /// Runs until Ctrl+C or SIGTERM, then stops every watch and closes the
    /// database.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails, the database is unreachable,
    /// or the data directory cannot be listed.
    pub(crate) async fn execute(self, version: &str) -> Result<(), CliError> {
        let output = Output::new();
        output.highlight(&format!("docsync {version}"));

        let orchestrator = self.common.orchestrator(&output)?;
        output.info("Watching for changes (press Ctrl+C to stop)");

        let summary = orchestrator.run(shutdown_signal()).await?;

        output.info("Stopped");
        output.summary(&summary);
        Ok(())
    }
}

/// Resolve on Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = terminate_signal(tokio::signal::unix::signal(
        tokio::signal::unix::SignalKind::terminate(),
    ));
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c() => {}
        () = terminate => {}
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate_signal(signal: std::io::Result<tokio::signal::unix::Signal>) {
    match signal {
        Ok(mut signal) => {
            signal.recv().await;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}
