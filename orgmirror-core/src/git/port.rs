//! Version-control primitives used by reconciliation and cleanup

use std::path::Path;

use thiserror::Error;

/// Name of the remote every clone fetches from
pub const REMOTE: &str = "origin";

/// Errors surfaced by [`GitPort`] operations
#[derive(Error, Debug)]
pub enum GitError {
    /// The remote could not be reached or refused authentication
    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// The remote is reachable but has no branches
    #[error("Remote {0} is empty")]
    RemoteEmpty(String),

    /// The local branch is not an ancestor of its remote counterpart
    #[error("Branch '{0}' cannot be fast-forwarded")]
    NonFastForward(String),

    /// The branch is checked out and no other branch can replace it
    #[error("Branch '{0}' is checked out and there is no other branch to switch to")]
    CheckedOut(String),

    /// A reference (branch or revision) does not exist
    #[error("Reference not found: {0}")]
    RefNotFound(String),

    /// No repository at the given path
    #[error("No repository at {0}")]
    RepositoryNotFound(String),

    /// Any other libgit2 failure
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// Filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GitError {
    /// Whether the error means the remote is unreachable or has nothing to mirror
    pub fn is_remote_unavailable(&self) -> bool {
        matches!(self, Self::RemoteUnavailable(_) | Self::RemoteEmpty(_))
    }

    /// Whether the thing being looked up is simply not there
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RefNotFound(_) | Self::RepositoryNotFound(_))
    }
}

/// Outcome of a successful fast-forward-only merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Local branch already matched the remote
    UpToDate,
    /// Local branch moved forward to the remote tip
    FastForwarded,
}

/// Capability contract for a local clone and its remote.
///
/// Branch names are short names (`main`, `feature/x`). Remote-tracking refs
/// live under [`REMOTE`]. Every method operates on the clone at `path`.
pub trait GitPort {
    /// Check that the remote is reachable and has at least one branch
    fn probe_remote(&self, url: &str) -> Result<(), GitError>;

    /// Clone `url` into `path`
    fn clone_repository(&self, url: &str, path: &Path) -> Result<(), GitError>;

    /// Fetch all branches, pruning remote-tracking refs deleted upstream
    fn fetch(&self, path: &Path) -> Result<(), GitError>;

    /// Checked-out branch, `None` on a detached or unborn HEAD
    fn current_branch(&self, path: &Path) -> Result<Option<String>, GitError>;

    fn local_branches(&self, path: &Path) -> Result<Vec<String>, GitError>;

    /// Remote branch names without the remote prefix, excluding `HEAD`
    fn remote_branches(&self, path: &Path) -> Result<Vec<String>, GitError>;

    /// Resolve a revision to a commit id
    fn rev_parse(&self, path: &Path, revision: &str) -> Result<String, GitError>;

    /// Whether commit `ancestor` is reachable from commit `descendant` (or equal to it)
    fn is_ancestor(&self, path: &Path, ancestor: &str, descendant: &str) -> Result<bool, GitError>;

    /// Make `branch` the working branch
    fn checkout(&self, path: &Path, branch: &str) -> Result<(), GitError>;

    /// Create local `branch` at its remote counterpart, tracking it
    fn create_tracking_branch(&self, path: &Path, branch: &str) -> Result<(), GitError>;

    /// Create local `branch` pointing at `commit`. Fails if it already exists.
    fn create_branch_at(&self, path: &Path, branch: &str, commit: &str) -> Result<(), GitError>;

    /// Fast-forward `branch` to its remote counterpart, or fail with
    /// [`GitError::NonFastForward`]
    fn merge_ff_only(&self, path: &Path, branch: &str) -> Result<MergeOutcome, GitError>;

    /// Point `branch` at `target`, discarding whatever it pointed at
    fn reset_hard(&self, path: &Path, branch: &str, target: &str) -> Result<(), GitError>;

    fn delete_branch(&self, path: &Path, branch: &str) -> Result<(), GitError>;

    /// Remove a clone from disk. A missing path counts as removed.
    fn remove_clone(&self, path: &Path) -> Result<(), GitError> {
        match std::fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GitError::Io(e)),
        }
    }
}

/// Remote-tracking revision for a branch
pub fn remote_ref(branch: &str) -> String {
    format!("refs/remotes/{}/{}", REMOTE, branch)
}

/// Local revision for a branch
pub fn local_ref(branch: &str) -> String {
    format!("refs/heads/{}", branch)
}
