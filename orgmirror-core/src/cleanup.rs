//! Retention cleanup
//!
//! Three sweeps driven by the retention store:
//! - abandoned branches older than their retention (measured from creation)
//! - ordinary branches no longer seen on the remote for too long
//! - repositories no longer seen on the hosting service for too long
//!
//! A record is only removed after the branch or clone is gone from disk, so
//! an interrupted or failed deletion is retried on the next run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use orgmirror_db::{RetentionStore, StaleBranch, TrackedRepository};
use serde::Serialize;

use crate::git::{GitError, GitPort};
use crate::reconcile::ABANDONED_MARKER;
use crate::retention::RetentionPeriod;

/// Retention thresholds for the cleanup sweeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetentionPolicy {
    pub abandoned_branches: RetentionPeriod,
    pub removed_branches: RetentionPeriod,
    pub removed_repositories: RetentionPeriod,
    /// Warn about repositories this close to their deletion
    pub deletion_warning: RetentionPeriod,
}

/// A deletion that did not happen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub target: String,
    pub error: String,
}

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// `organization/repository` or `organization/repository:branch`
    pub deleted: Vec<String>,
    pub failed: Vec<SweepFailure>,
}

impl SweepReport {
    fn fail(&mut self, target: String, error: impl ToString) {
        self.failed.push(SweepFailure {
            target,
            error: error.to_string(),
        });
    }
}

/// A repository that the next sweeps will delete unless it reappears
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionWarning {
    pub repository: String,
    pub last_seen_at: DateTime<Utc>,
    pub deleted_after: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub warnings: Vec<DeletionWarning>,
    pub abandoned_branches: SweepReport,
    pub stale_branches: SweepReport,
    pub stale_repositories: SweepReport,
}

impl CleanupReport {
    pub fn deleted(&self) -> usize {
        self.abandoned_branches.deleted.len()
            + self.stale_branches.deleted.len()
            + self.stale_repositories.deleted.len()
    }

    pub fn failed(&self) -> usize {
        self.abandoned_branches.failed.len()
            + self.stale_branches.failed.len()
            + self.stale_repositories.failed.len()
    }
}

/// Runs the retention sweeps over clones under a backup root
pub struct Cleanup<'a, G: GitPort> {
    git: &'a G,
    store: &'a RetentionStore,
    backup_root: &'a Path,
    policy: RetentionPolicy,
}

impl<'a, G: GitPort> Cleanup<'a, G> {
    pub fn new(
        git: &'a G,
        store: &'a RetentionStore,
        backup_root: &'a Path,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            git,
            store,
            backup_root,
            policy,
        }
    }

    /// Run every sweep as of `now`
    pub async fn run(&self, now: DateTime<Utc>) -> CleanupReport {
        let warnings = self.deletion_warnings(now).await;
        for warning in &warnings {
            tracing::warn!(
                repository = %warning.repository,
                deleted_after = %warning.deleted_after,
                "Repository no longer on the remote will be deleted soon"
            );
        }

        let report = CleanupReport {
            warnings,
            abandoned_branches: self
                .sweep_branches(true, self.policy.abandoned_branches, now)
                .await,
            stale_branches: self
                .sweep_branches(false, self.policy.removed_branches, now)
                .await,
            stale_repositories: self.sweep_repositories(now).await,
        };

        tracing::info!(
            deleted = report.deleted(),
            failed = report.failed(),
            warnings = report.warnings.len(),
            "Cleanup finished"
        );

        report
    }

    /// Repositories whose deletion is due within the warning window
    pub async fn deletion_warnings(&self, now: DateTime<Utc>) -> Vec<DeletionWarning> {
        let (RetentionPeriod::Days(threshold), RetentionPeriod::Days(window)) = (
            self.policy.removed_repositories,
            self.policy.deletion_warning,
        ) else {
            return Vec::new();
        };

        // Past chrono's range nothing can ever come due
        let Some(retention) = Duration::try_days(threshold) else {
            return Vec::new();
        };

        let repositories = match self
            .store
            .repositories_older_than(threshold.saturating_sub(window).max(0), now)
            .await
        {
            Ok(repositories) => repositories,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to query repositories nearing deletion");
                return Vec::new();
            }
        };

        repositories
            .into_iter()
            .filter_map(|repo| {
                let deleted_after = repo.last_seen_at.checked_add_signed(retention)?;
                (deleted_after > now).then(|| DeletionWarning {
                    repository: repo.full_name(),
                    last_seen_at: repo.last_seen_at,
                    deleted_after,
                })
            })
            .collect()
    }

    async fn sweep_branches(
        &self,
        abandoned: bool,
        period: RetentionPeriod,
        now: DateTime<Utc>,
    ) -> SweepReport {
        let mut report = SweepReport::default();

        let candidates = match self
            .store
            .branches_older_than(period.as_days(), abandoned, now)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(abandoned, error = %e, "Failed to query stale branches");
                return report;
            }
        };

        for candidate in candidates {
            let target = format!("{}:{}", candidate.repository_full_name(), candidate.branch);

            if let Err(e) = self.remove_branch(&candidate) {
                tracing::warn!(branch = %target, error = %e, "Failed to delete branch");
                report.fail(target, e);
                continue;
            }

            match self
                .store
                .delete_branch(&candidate.branch, candidate.repository_id)
                .await
            {
                Ok(_) => {
                    tracing::info!(branch = %target, abandoned, "Deleted branch");
                    report.deleted.push(target);
                }
                Err(e) => {
                    tracing::warn!(branch = %target, error = %e, "Failed to delete branch record");
                    report.fail(target, e);
                }
            }
        }

        report
    }

    fn remove_branch(&self, branch: &StaleBranch) -> Result<(), GitError> {
        let path = self
            .backup_root
            .join(&branch.organization)
            .join(&branch.repository);

        if let Err(e) = self.leave_branch(&path, &branch.branch) {
            if !e.is_not_found() {
                return Err(e);
            }
        }

        match self.git.delete_branch(&path, &branch.branch) {
            Err(e) if e.is_not_found() => {
                tracing::debug!(branch = %branch.branch, "Branch already gone");
                Ok(())
            }
            other => other,
        }
    }

    /// A checked-out branch cannot be deleted, so move the clone to another
    /// branch first, preferring one that is not abandoned
    fn leave_branch(&self, path: &Path, branch: &str) -> Result<(), GitError> {
        if self.git.current_branch(path)?.as_deref() != Some(branch) {
            return Ok(());
        }

        let others: Vec<String> = self
            .git
            .local_branches(path)?
            .into_iter()
            .filter(|other| other != branch)
            .collect();
        let Some(target) = others
            .iter()
            .find(|other| !other.contains(ABANDONED_MARKER))
            .or_else(|| others.first())
        else {
            return Err(GitError::CheckedOut(branch.to_string()));
        };

        tracing::info!(branch = %branch, checkout = %target, "Leaving checked-out branch before deletion");
        self.git.checkout(path, target)
    }

    async fn sweep_repositories(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let candidates = match self
            .store
            .repositories_older_than(self.policy.removed_repositories.as_days(), now)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to query stale repositories");
                return report;
            }
        };

        for repository in candidates {
            let target = repository.full_name();

            if let Err(e) = self.git.remove_clone(&self.clone_path(&repository)) {
                tracing::warn!(repository = %target, error = %e, "Failed to remove clone");
                report.fail(target, e);
                continue;
            }

            match self
                .store
                .delete_repository(&repository.name, repository.organization_id)
                .await
            {
                Ok(_) => {
                    tracing::info!(repository = %target, "Deleted repository");
                    report.deleted.push(target);
                }
                Err(e) => {
                    tracing::warn!(repository = %target, error = %e, "Failed to delete repository record");
                    report.fail(target, e);
                }
            }
        }

        report
    }

    fn clone_path(&self, repository: &TrackedRepository) -> PathBuf {
        self.backup_root
            .join(&repository.organization)
            .join(&repository.name)
    }
}
