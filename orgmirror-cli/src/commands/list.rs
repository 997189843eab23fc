//! List command - repositories per organization

use clap::Args;
use orgmirror_core::{Config, HostingApi, Secrets};

use super::github_client;

/// List repositories of the configured organizations
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only this organization (need not be enabled in config)
    pub organization: Option<String>,
}

impl ListArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let secrets = Secrets::load()?;
        let client = github_client(config, &secrets)?;

        let organizations = match &self.organization {
            Some(org) => vec![org.clone()],
            None => config.enabled_organizations(),
        };

        if organizations.is_empty() {
            println!("No organizations enabled.");
            return Ok(());
        }

        for org in &organizations {
            let repositories = client.repositories(org).await?;

            println!("{} ({} repositories)", org, repositories.len());
            for repo in &repositories {
                println!(
                    "  {} <- {}",
                    repo.full_name,
                    repo.url(config.backup.clone_via_ssh)
                );
            }
            println!();
        }

        Ok(())
    }
}
