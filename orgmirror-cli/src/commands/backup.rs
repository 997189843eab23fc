//! Backup command - mirror every configured organization

use clap::Args;
use orgmirror_core::backup::BackupRunner;
use orgmirror_core::cleanup::CleanupReport;
use orgmirror_core::{CancelFlag, Config, RunReport, Secrets};

use super::{format_duration, git_port, github_client, open_store};

/// Mirror all configured organizations
#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Skip the retention cleanup after the backup
    #[arg(long)]
    pub no_cleanup: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

impl BackupArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        if config.enabled_organizations().is_empty() {
            anyhow::bail!(
                "No organizations enabled. Add them under [organizations] in {}",
                Config::default_config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "the config file".to_string())
            );
        }

        let secrets = Secrets::load()?;
        let client = github_client(config, &secrets)?;
        let git = git_port(config, &secrets);
        let store = open_store(config).await?;

        let cancel = CancelFlag::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupted - stopping after the current repository");
                on_signal.cancel();
            }
        });

        let report = BackupRunner::new(&client, &git, &store, config)
            .with_cancel_flag(cancel)
            .run(!self.no_cleanup)
            .await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }

        Ok(())
    }
}

fn print_report(report: &RunReport) {
    let selection = &report.organizations;

    if !selection.unselected.is_empty() {
        println!(
            "Warning: not backing up organizations {} (not enabled in config)",
            selection.unselected.join(", ")
        );
    }
    if !selection.missing.is_empty() {
        println!(
            "Warning: configured organizations not accessible: {}",
            selection.missing.join(", ")
        );
    }

    println!();
    println!(
        "Processed {} repositories in {} organizations in {}",
        report.repositories,
        selection.selected.len(),
        format_duration(report.duration_secs as i64)
    );
    println!(
        "  cloned: {}, updated: {}, skipped: {}",
        report.cloned, report.updated, report.skipped
    );
    println!(
        "  branches created: {}, fast-forwarded: {}, reset: {}, abandoned: {}, failed: {}",
        report.branches_created,
        report.branches_fast_forwarded,
        report.branches_reset,
        report.branches_abandoned,
        report.branches_failed
    );

    if report.cancelled {
        println!("Backup cancelled before all repositories were processed");
    }

    if let Some(cleanup) = &report.cleanup {
        print_cleanup(cleanup);
    }

    if !report.failed.is_empty() {
        println!();
        println!("Failed repositories:");
        for failed in &report.failed {
            println!("  {}: {}", failed.repository, failed.error);
        }
    }
}

/// Human-readable cleanup summary, shared with the cleanup command
pub fn print_cleanup(report: &CleanupReport) {
    println!();

    for warning in &report.warnings {
        println!(
            "Warning: {} will be deleted after {} (last seen {})",
            warning.repository,
            warning.deleted_after.format("%Y-%m-%d %H:%M"),
            warning.last_seen_at.format("%Y-%m-%d %H:%M")
        );
    }

    let sweeps = [
        ("abandoned branches", &report.abandoned_branches),
        ("stale branches", &report.stale_branches),
        ("stale repositories", &report.stale_repositories),
    ];

    for (label, sweep) in sweeps {
        if sweep.deleted.is_empty() && sweep.failed.is_empty() {
            continue;
        }
        println!("Deleted {} {}", sweep.deleted.len(), label);
        for deleted in &sweep.deleted {
            println!("  - {}", deleted);
        }
        for failed in &sweep.failed {
            println!("  ! {}: {}", failed.target, failed.error);
        }
    }

    println!(
        "Cleanup: {} deleted, {} failed",
        report.deleted(),
        report.failed()
    );
}
