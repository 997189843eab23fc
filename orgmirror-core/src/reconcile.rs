//! Repository and branch reconciliation
//!
//! Brings one local clone in line with its remote:
//! 1. Probes the remote and skips it when unreachable or empty
//! 2. Clones it if there is no local copy, otherwise fetches with pruning
//! 3. Creates a local branch for every remote branch that lacks one
//! 4. Fast-forwards every branch, moving diverged local history aside to an
//!    `<branch>_abandoned_<timestamp>` branch before resetting
//!
//! Every change is reported to the retention store. Store failures are logged
//! and never stop reconciliation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use orgmirror_db::{OrganizationId, RepositoryId, RetentionStore};
use serde::Serialize;

use crate::git::{local_ref, remote_ref, GitError, GitPort, MergeOutcome};
use crate::hosting::RemoteRepository;

/// Timestamp layout of abandoned branch names
const ABANDONED_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Separates the original branch name from the timestamp
pub(crate) const ABANDONED_MARKER: &str = "_abandoned_";

/// Name under which diverged local history of `branch` is kept
pub fn abandoned_branch_name(branch: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}{}{}",
        branch,
        ABANDONED_MARKER,
        at.format(ABANDONED_TIMESTAMP_FORMAT)
    )
}

/// What happened to a single branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BranchAction {
    /// Local branch created from the remote one
    Created,
    UpToDate,
    FastForwarded,
    /// Diverged, but the local tip is still reachable from a remote branch
    Reset,
    /// Diverged; the local tip was kept under `abandoned_branch`
    Abandoned { abandoned_branch: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchReport {
    pub branch: String,
    #[serde(flatten)]
    pub action: BranchAction,
}

/// Result of reconciling one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepoOutcome {
    /// Freshly cloned and backfilled
    Cloned { branches: Vec<BranchReport> },
    /// Existing clone fetched and reconciled
    Updated { branches: Vec<BranchReport> },
    /// Remote unreachable or empty; nothing local was touched
    Skipped { reason: String },
    /// Clone, fetch or branch listing failed
    Failed { error: String },
}

impl RepoOutcome {
    pub fn branches(&self) -> &[BranchReport] {
        match self {
            Self::Cloned { branches } | Self::Updated { branches } => branches,
            Self::Skipped { .. } | Self::Failed { .. } => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Reconciles clones under a backup root
pub struct Reconciler<'a, G: GitPort> {
    git: &'a G,
    store: &'a RetentionStore,
    backup_root: &'a Path,
}

impl<'a, G: GitPort> Reconciler<'a, G> {
    pub fn new(git: &'a G, store: &'a RetentionStore, backup_root: &'a Path) -> Self {
        Self {
            git,
            store,
            backup_root,
        }
    }

    /// Location of a repository's clone: `<backup root>/<organization>/<name>`
    pub fn clone_path(&self, repository: &RemoteRepository) -> PathBuf {
        self.backup_root
            .join(&repository.organization)
            .join(repository.name())
    }

    /// Reconcile one repository against `url`.
    ///
    /// `organization` is the store identity of the owning organization, `None`
    /// when tracking is off.
    pub async fn reconcile(
        &self,
        repository: &RemoteRepository,
        url: &str,
        organization: Option<OrganizationId>,
    ) -> RepoOutcome {
        let path = self.clone_path(repository);

        if let Err(e) = self.git.probe_remote(url) {
            tracing::info!(repository = %repository.full_name, error = %e, "Skipping repository");
            return RepoOutcome::Skipped {
                reason: e.to_string(),
            };
        }

        let now = Utc::now();
        let cloned = !path.exists();

        let step = if cloned {
            tracing::info!(repository = %repository.full_name, path = %path.display(), "Cloning");
            self.git.clone_repository(url, &path)
        } else {
            tracing::debug!(repository = %repository.full_name, "Fetching");
            self.git.fetch(&path)
        };

        if let Err(e) = step {
            tracing::warn!(repository = %repository.full_name, error = %e, "Failed to update clone");
            return RepoOutcome::Failed {
                error: e.to_string(),
            };
        }

        let repository_id = match organization {
            Some(org) => logged(
                self.store
                    .upsert_repository(repository.name(), org, now)
                    .await,
                "record repository",
            )
            .flatten(),
            None => None,
        };

        let branches = match self.sync_branches(&path, repository_id, now).await {
            Ok(branches) => branches,
            Err(e) => {
                tracing::warn!(repository = %repository.full_name, error = %e, "Failed to reconcile branches");
                return RepoOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        if let Some(id) = repository_id {
            logged(
                self.store.touch_repository(id, Utc::now()).await,
                "touch repository",
            );
        }

        if cloned {
            RepoOutcome::Cloned { branches }
        } else {
            RepoOutcome::Updated { branches }
        }
    }

    async fn sync_branches(
        &self,
        path: &Path,
        repository: Option<RepositoryId>,
        now: DateTime<Utc>,
    ) -> Result<Vec<BranchReport>, GitError> {
        let original = self.git.current_branch(path)?;
        let remote = self.git.remote_branches(path)?;
        let local: HashSet<String> = self.git.local_branches(path)?.into_iter().collect();

        let mut reports = Vec::with_capacity(remote.len());
        for branch in &remote {
            let action = match self
                .sync_branch(path, branch, &local, &remote, repository, now)
                .await
            {
                Ok(action) => action,
                Err(e) => {
                    tracing::warn!(branch = %branch, error = %e, "Failed to reconcile branch");
                    BranchAction::Failed {
                        error: e.to_string(),
                    }
                }
            };

            tracing::debug!(branch = %branch, action = ?action, "Branch reconciled");
            reports.push(BranchReport {
                branch: branch.clone(),
                action,
            });
        }

        if let Some(original) = original {
            if let Err(e) = self.git.checkout(path, &original) {
                tracing::warn!(branch = %original, error = %e, "Failed to restore working branch");
            }
        }

        Ok(reports)
    }

    async fn sync_branch(
        &self,
        path: &Path,
        branch: &str,
        local: &HashSet<String>,
        remote: &[String],
        repository: Option<RepositoryId>,
        now: DateTime<Utc>,
    ) -> Result<BranchAction, GitError> {
        let created = !local.contains(branch);
        if created {
            self.git.create_tracking_branch(path, branch)?;
            if let Some(id) = repository {
                logged(
                    self.store.upsert_branch(branch, id, now, false, true).await,
                    "record branch",
                );
            }
        }

        let outcome = match self.git.merge_ff_only(path, branch) {
            Ok(outcome) => outcome,
            Err(GitError::NonFastForward(_)) => {
                return self
                    .abandon_and_reset(path, branch, remote, repository, now)
                    .await;
            }
            Err(e) => return Err(e),
        };

        if let Some(id) = repository {
            logged(
                self.store.touch_branch(branch, id, now).await,
                "touch branch",
            );
        }

        Ok(match outcome {
            _ if created => BranchAction::Created,
            MergeOutcome::UpToDate => BranchAction::UpToDate,
            MergeOutcome::FastForwarded => BranchAction::FastForwarded,
        })
    }

    /// Move `branch` to its remote tip, first keeping the local tip under an
    /// abandoned branch unless some remote branch already contains it
    async fn abandon_and_reset(
        &self,
        path: &Path,
        branch: &str,
        remote: &[String],
        repository: Option<RepositoryId>,
        now: DateTime<Utc>,
    ) -> Result<BranchAction, GitError> {
        let local_tip = self.git.rev_parse(path, &local_ref(branch))?;

        if self.is_on_remote(path, &local_tip, remote)? {
            self.git.reset_hard(path, branch, &remote_ref(branch))?;
            tracing::info!(branch = %branch, "Reset diverged branch already contained upstream");
            return Ok(BranchAction::Reset);
        }

        let abandoned = abandoned_branch_name(branch, now);
        // Without the abandoned branch the reset would lose the local tip
        self.git.create_branch_at(path, &abandoned, &local_tip)?;

        if let Some(id) = repository {
            logged(
                self.store.upsert_branch(&abandoned, id, now, true, true).await,
                "record abandoned branch",
            );
        }

        self.git.reset_hard(path, branch, &remote_ref(branch))?;

        tracing::info!(
            branch = %branch,
            abandoned = %abandoned,
            commit = %local_tip,
            "Kept diverged history and reset branch"
        );

        Ok(BranchAction::Abandoned {
            abandoned_branch: abandoned,
        })
    }

    fn is_on_remote(&self, path: &Path, commit: &str, remote: &[String]) -> Result<bool, GitError> {
        for other in remote {
            let tip = match self.git.rev_parse(path, &remote_ref(other)) {
                Ok(tip) => tip,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            if self.git.is_ancestor(path, commit, &tip)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Log a store failure as a warning and carry on
fn logged<T>(result: orgmirror_db::Result<T>, operation: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(operation = %operation, error = %e, "Retention store update failed");
            None
        }
    }
}
