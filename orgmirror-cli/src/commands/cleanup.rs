//! Cleanup command - run the retention sweeps without a backup

use chrono::Utc;
use clap::Args;
use orgmirror_core::{Cleanup, Config, Secrets};

use super::backup::print_cleanup;
use super::{git_port, open_store};

/// Delete expired abandoned branches, stale branches and stale repositories
#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Print the cleanup report as JSON
    #[arg(long)]
    pub json: bool,
}

impl CleanupArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        if !config.tracker.enabled {
            anyhow::bail!("Retention tracking is disabled; nothing to clean up");
        }

        let secrets = Secrets::load()?;
        let git = git_port(config, &secrets);
        let store = open_store(config).await?;

        let report = Cleanup::new(&git, &store, &config.backup.path, config.tracker.policy())
            .run(Utc::now())
            .await;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_cleanup(&report);
        }

        Ok(())
    }
}
