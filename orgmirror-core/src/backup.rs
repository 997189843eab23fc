//! Backup orchestration
//!
//! A run walks every selected organization and every repository in it,
//! reconciling clones one at a time, and finishes with the retention sweeps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use orgmirror_db::RetentionStore;
use serde::Serialize;

use crate::cleanup::{Cleanup, CleanupReport};
use crate::config::Config;
use crate::git::GitPort;
use crate::hosting::HostingApi;
use crate::reconcile::{BranchAction, Reconciler, RepoOutcome};
use crate::Result;

/// Cooperative cancellation, checked between repositories
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Configured organizations compared with the ones the user can access
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrganizationSelection {
    /// Configured and accessible; these are backed up
    pub selected: Vec<String>,
    /// Accessible but not configured; their repositories are not backed up
    pub unselected: Vec<String>,
    /// Configured but not accessible
    pub missing: Vec<String>,
}

pub fn select_organizations(configured: &[String], accessible: &[String]) -> OrganizationSelection {
    let selected = configured
        .iter()
        .filter(|org| accessible.contains(org))
        .cloned()
        .collect();
    let unselected = accessible
        .iter()
        .filter(|org| !configured.contains(org))
        .cloned()
        .collect();
    let missing = configured
        .iter()
        .filter(|org| !accessible.contains(org))
        .cloned()
        .collect();

    OrganizationSelection {
        selected,
        unselected,
        missing,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRepository {
    pub repository: String,
    pub error: String,
}

/// Summary of one backup run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub organizations: OrganizationSelection,
    pub repositories: usize,
    pub cloned: usize,
    pub updated: usize,
    pub skipped: usize,
    pub branches_created: usize,
    pub branches_fast_forwarded: usize,
    pub branches_reset: usize,
    pub branches_abandoned: usize,
    pub branches_failed: usize,
    /// Repositories (or whole organizations) that could not be processed
    pub failed: Vec<FailedRepository>,
    /// Stopped early on request
    pub cancelled: bool,
    pub cleanup: Option<CleanupReport>,
}

impl RunReport {
    fn new(started_at: DateTime<Utc>, organizations: OrganizationSelection) -> Self {
        Self {
            started_at,
            duration_secs: 0.0,
            organizations,
            repositories: 0,
            cloned: 0,
            updated: 0,
            skipped: 0,
            branches_created: 0,
            branches_fast_forwarded: 0,
            branches_reset: 0,
            branches_abandoned: 0,
            branches_failed: 0,
            failed: Vec::new(),
            cancelled: false,
            cleanup: None,
        }
    }

    fn record(&mut self, repository: &str, outcome: &RepoOutcome) {
        self.repositories += 1;

        match outcome {
            RepoOutcome::Cloned { .. } => self.cloned += 1,
            RepoOutcome::Updated { .. } => self.updated += 1,
            RepoOutcome::Skipped { .. } => self.skipped += 1,
            RepoOutcome::Failed { error } => self.failed.push(FailedRepository {
                repository: repository.to_string(),
                error: error.clone(),
            }),
        }

        for branch in outcome.branches() {
            match branch.action {
                BranchAction::Created => self.branches_created += 1,
                BranchAction::FastForwarded => self.branches_fast_forwarded += 1,
                BranchAction::Reset => self.branches_reset += 1,
                BranchAction::Abandoned { .. } => self.branches_abandoned += 1,
                BranchAction::Failed { .. } => self.branches_failed += 1,
                BranchAction::UpToDate => {}
            }
        }
    }
}

/// Runs a backup of every selected organization
pub struct BackupRunner<'a, H: HostingApi, G: GitPort> {
    hosting: &'a H,
    git: &'a G,
    store: &'a RetentionStore,
    config: &'a Config,
    cancel: CancelFlag,
}

impl<'a, H: HostingApi, G: GitPort> BackupRunner<'a, H, G> {
    pub fn new(hosting: &'a H, git: &'a G, store: &'a RetentionStore, config: &'a Config) -> Self {
        Self {
            hosting,
            git,
            store,
            config,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Compare configured organizations with the accessible ones
    pub async fn organization_selection(&self) -> Result<OrganizationSelection> {
        let accessible = self.hosting.organizations().await?;
        Ok(select_organizations(
            &self.config.enabled_organizations(),
            &accessible,
        ))
    }

    /// Reconcile every repository, then run cleanup if `cleanup` is set and
    /// the run was not cancelled
    pub async fn run(&self, cleanup: bool) -> Result<RunReport> {
        let started = Instant::now();
        let selection = self.organization_selection().await?;

        for org in &selection.unselected {
            tracing::warn!(organization = %org, "Organization is not selected for backup");
        }
        for org in &selection.missing {
            tracing::warn!(organization = %org, "Configured organization is not accessible");
        }

        let mut report = RunReport::new(Utc::now(), selection.clone());
        let backup_root = self.config.backup.path.as_path();
        let reconciler = Reconciler::new(self.git, self.store, backup_root);

        'organizations: for org in &selection.selected {
            let org_id = match self.store.upsert_organization(org).await {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(organization = %org, error = %e, "Failed to record organization");
                    None
                }
            };

            let repositories = match self.hosting.repositories(org).await {
                Ok(repositories) => repositories,
                Err(e) => {
                    tracing::error!(organization = %org, error = %e, "Failed to list repositories");
                    report.failed.push(FailedRepository {
                        repository: org.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            tracing::info!(organization = %org, repositories = repositories.len(), "Backing up organization");

            for repository in &repositories {
                if self.cancel.is_cancelled() {
                    break 'organizations;
                }

                if let Err(e) = self.hosting.wait_for_rate_limit().await {
                    tracing::warn!(error = %e, "Rate limit check failed");
                }

                let url = repository.url(self.config.backup.clone_via_ssh);
                tracing::info!(repository = %repository.full_name, remote = %url, "Reconciling");

                let outcome = reconciler.reconcile(repository, url, org_id).await;
                report.record(&repository.full_name, &outcome);
            }
        }

        report.cancelled = self.cancel.is_cancelled();
        if report.cancelled {
            tracing::warn!("Backup cancelled");
        } else if cleanup && self.store.is_enabled() {
            report.cleanup = Some(self.cleanup(Utc::now()).await);
        }

        report.duration_secs = started.elapsed().as_secs_f64();
        tracing::info!(
            repositories = report.repositories,
            organizations = report.organizations.selected.len(),
            failed = report.failed.len(),
            duration_secs = report.duration_secs,
            "Backup finished"
        );

        Ok(report)
    }

    /// Run the retention sweeps on their own
    pub async fn cleanup(&self, now: DateTime<Utc>) -> CleanupReport {
        Cleanup::new(
            self.git,
            self.store,
            &self.config.backup.path,
            self.config.tracker.policy(),
        )
        .run(now)
        .await
    }
}
