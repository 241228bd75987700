//! `docsync sync` command implementation.

use clap::Args;

use super::CommonArgs;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the sync command.
#[derive(Args)]
pub(crate) struct SyncArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

impl SyncArgs {
    /// Execute the sync command.
    ///
    /// Failed files are reported but do not fail the command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails, the database is unreachable,
    /// or the data directory cannot be listed.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let orchestrator = self.common.orchestrator(&output)?;
        let summary = orchestrator.sync_once().await?;

        output.summary(&summary);
        if summary.failed() > 0 {
            output.warning("Some files failed to sync; run with --verbose for details");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: SyncArgs,
    }

    #[test]
    fn test_parses_overrides() {
        let cli = TestCli::parse_from([
            "docsync",
            "--root-dir",
            "data",
            "--database-url",
            "sqlite://test.db",
            "--debounce-ms",
            "250",
            "-v",
        ]);

        let common = cli.args.common;
        assert!(common.verbose);
        assert_eq!(common.root_dir.as_deref(), Some(std::path::Path::new("data")));
        assert_eq!(common.database_url.as_deref(), Some("sqlite://test.db"));
        assert_eq!(common.debounce_ms, Some(250));
    }
}
