//! Status command - show what the retention store tracks

use chrono::{DateTime, Utc};
use clap::Args;
use orgmirror_core::Config;
use orgmirror_db::{TrackedBranch, TrackedRepository};
use serde::Serialize;

use super::{format_duration, open_store};

/// Show tracked repositories and branches
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Also list each repository's branches
    #[arg(short, long)]
    pub branches: bool,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct RepositoryStatus {
    #[serde(flatten)]
    repository: TrackedRepository,
    branches: Vec<TrackedBranch>,
}

impl StatusArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        if !config.tracker.enabled {
            println!("Retention tracking is disabled.");
            return Ok(());
        }

        let store = open_store(config).await?;
        let mut statuses = Vec::new();
        for repository in store.repositories().await? {
            let branches = store.branches(repository.id).await?;
            statuses.push(RepositoryStatus {
                repository,
                branches,
            });
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&statuses)?);
            return Ok(());
        }

        if statuses.is_empty() {
            println!("No tracked repositories.");
            return Ok(());
        }

        let now = Utc::now();
        println!("Tracked repositories:");
        println!();

        for status in &statuses {
            let repo = &status.repository;
            let abandoned = status.branches.iter().filter(|b| b.abandoned).count();

            println!("  {}", repo.full_name());
            println!("      Last seen: {} ago", ago(now, repo.last_seen_at));
            println!("      Tracked since: {} ago", ago(now, repo.created_at));
            println!(
                "      Branches: {} ({} abandoned)",
                status.branches.len(),
                abandoned
            );

            if self.branches {
                for branch in &status.branches {
                    if branch.abandoned {
                        println!(
                            "        {} [abandoned {} ago]",
                            branch.name,
                            ago(now, branch.created_at)
                        );
                    } else {
                        println!(
                            "        {} [seen {} ago]",
                            branch.name,
                            ago(now, branch.last_seen_at)
                        );
                    }
                }
            }

            println!();
        }

        Ok(())
    }
}

fn ago(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
    format_duration((now - then).num_seconds().max(0))
}
