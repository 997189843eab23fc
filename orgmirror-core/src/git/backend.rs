//! libgit2-backed implementation of [`GitPort`]

use std::fmt;
use std::path::{Path, PathBuf};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    BranchType, Cred, CredentialType, Direction, ErrorClass, ErrorCode, FetchOptions, FetchPrune,
    Oid, Remote, RemoteCallbacks, Repository, ResetType,
};

use super::port::{local_ref, remote_ref, GitError, GitPort, MergeOutcome, REMOTE};

/// Give up after this many credential callbacks for one operation; libgit2
/// keeps asking as long as the callback returns something
const MAX_CREDENTIAL_ATTEMPTS: u32 = 3;

/// Credentials offered to remotes
#[derive(Clone, Default)]
pub struct Credentials {
    /// Private key for SSH remotes; the SSH agent is used when absent
    pub ssh_key: Option<PathBuf>,
    /// Token for HTTPS remotes
    pub token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ssh_key", &self.ssh_key)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// [`GitPort`] on top of the `git2` crate
#[derive(Debug, Clone, Default)]
pub struct Git2Port {
    credentials: Credentials,
}

impl Git2Port {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    fn open(path: &Path) -> Result<Repository, GitError> {
        Repository::open(path).map_err(|e| {
            if e.code() == ErrorCode::NotFound {
                GitError::RepositoryNotFound(path.display().to_string())
            } else {
                GitError::Git(e)
            }
        })
    }

    fn callbacks(&self) -> RemoteCallbacks<'_> {
        let mut callbacks = RemoteCallbacks::new();
        let mut attempts = 0;

        callbacks.credentials(move |_url, username_from_url, allowed| {
            attempts += 1;
            if attempts > MAX_CREDENTIAL_ATTEMPTS {
                return Err(git2::Error::from_str("authentication failed"));
            }

            if allowed.contains(CredentialType::SSH_KEY) {
                let user = username_from_url.unwrap_or("git");
                return match &self.credentials.ssh_key {
                    Some(key) => Cred::ssh_key(user, None, key, None),
                    None => Cred::ssh_key_from_agent(user),
                };
            }

            if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
                if let Some(token) = &self.credentials.token {
                    return Cred::userpass_plaintext("x-access-token", token);
                }
            }

            Cred::default()
        });

        callbacks
    }

    fn fetch_options(&self) -> FetchOptions<'_> {
        let mut options = FetchOptions::new();
        options.remote_callbacks(self.callbacks());
        options.prune(FetchPrune::On);
        options
    }
}

/// Map transport-level failures to [`GitError::RemoteUnavailable`]
fn remote_error(url: &str, error: git2::Error) -> GitError {
    let transport = matches!(
        error.class(),
        ErrorClass::Net | ErrorClass::Ssh | ErrorClass::Http | ErrorClass::Ssl | ErrorClass::Callback
    );

    if transport || error.code() == ErrorCode::Auth {
        GitError::RemoteUnavailable(format!("{}: {}", url, error.message()))
    } else {
        GitError::Git(error)
    }
}

fn not_found(what: &str, error: git2::Error) -> GitError {
    if error.code() == ErrorCode::NotFound {
        GitError::RefNotFound(what.to_string())
    } else {
        GitError::Git(error)
    }
}

fn is_checked_out(repo: &Repository, refname: &str) -> bool {
    repo.head()
        .ok()
        .and_then(|head| head.name().map(|name| name == refname))
        .unwrap_or(false)
}

impl GitPort for Git2Port {
    fn probe_remote(&self, url: &str) -> Result<(), GitError> {
        let mut remote = Remote::create_detached(url)?;

        let connection = remote
            .connect_auth(Direction::Fetch, Some(self.callbacks()), None)
            .map_err(|e| GitError::RemoteUnavailable(format!("{}: {}", url, e.message())))?;

        // `Remote::list` hands a null slice to Rust when nothing is advertised,
        // so ask for the advertised HEAD instead. No HEAD means no branches.
        match connection.default_branch() {
            Ok(_) => Ok(()),
            Err(e) if e.code() == ErrorCode::NotFound => {
                Err(GitError::RemoteEmpty(url.to_string()))
            }
            Err(e) => Err(remote_error(url, e)),
        }
    }

    fn clone_repository(&self, url: &str, path: &Path) -> Result<(), GitError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut builder = RepoBuilder::new();
        builder.fetch_options(self.fetch_options());
        builder.clone(url, path).map_err(|e| remote_error(url, e))?;

        Ok(())
    }

    fn fetch(&self, path: &Path) -> Result<(), GitError> {
        let repo = Self::open(path)?;
        let mut remote = repo
            .find_remote(REMOTE)
            .map_err(|e| not_found(&format!("remote {}", REMOTE), e))?;
        let url = remote.url().unwrap_or(REMOTE).to_string();

        remote
            .fetch(&[] as &[&str], Some(&mut self.fetch_options()), None)
            .map_err(|e| remote_error(&url, e))?;

        Ok(())
    }

    fn current_branch(&self, path: &Path) -> Result<Option<String>, GitError> {
        let repo = Self::open(path)?;
        let head = match repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(GitError::Git(e)),
        };

        if head.is_branch() {
            Ok(head.shorthand().map(|s| s.to_string()))
        } else {
            // Detached HEAD
            Ok(None)
        }
    }

    fn local_branches(&self, path: &Path) -> Result<Vec<String>, GitError> {
        let repo = Self::open(path)?;
        let mut branches = Vec::new();

        for branch in repo.branches(Some(BranchType::Local))? {
            let (branch, _) = branch?;
            if let Some(name) = branch.name().ok().flatten() {
                branches.push(name.to_string());
            }
        }

        Ok(branches)
    }

    fn remote_branches(&self, path: &Path) -> Result<Vec<String>, GitError> {
        let repo = Self::open(path)?;
        let prefix = format!("{}/", REMOTE);
        let mut branches = Vec::new();

        for branch in repo.branches(Some(BranchType::Remote))? {
            let (branch, _) = branch?;
            let Some(name) = branch.name().ok().flatten() else {
                continue;
            };
            if let Some(short) = name.strip_prefix(&prefix) {
                if short != "HEAD" {
                    branches.push(short.to_string());
                }
            }
        }

        Ok(branches)
    }

    fn rev_parse(&self, path: &Path, revision: &str) -> Result<String, GitError> {
        let repo = Self::open(path)?;
        let commit = repo
            .revparse_single(revision)
            .and_then(|object| object.peel_to_commit())
            .map_err(|e| not_found(revision, e))?;
        Ok(commit.id().to_string())
    }

    fn is_ancestor(&self, path: &Path, ancestor: &str, descendant: &str) -> Result<bool, GitError> {
        let repo = Self::open(path)?;
        let ancestor = Oid::from_str(ancestor)?;
        let descendant = Oid::from_str(descendant)?;

        if ancestor == descendant {
            return Ok(true);
        }
        Ok(repo.graph_descendant_of(descendant, ancestor)?)
    }

    fn checkout(&self, path: &Path, branch: &str) -> Result<(), GitError> {
        let repo = Self::open(path)?;
        let refname = local_ref(branch);
        let target = repo
            .find_reference(&refname)
            .and_then(|reference| reference.peel_to_commit())
            .map_err(|e| not_found(&refname, e))?;

        repo.checkout_tree(target.as_object(), Some(CheckoutBuilder::new().safe()))?;
        repo.set_head(&refname)?;
        Ok(())
    }

    fn create_tracking_branch(&self, path: &Path, branch: &str) -> Result<(), GitError> {
        let repo = Self::open(path)?;
        let upstream = remote_ref(branch);
        let commit = repo
            .find_reference(&upstream)
            .and_then(|reference| reference.peel_to_commit())
            .map_err(|e| not_found(&upstream, e))?;

        let mut local = repo.branch(branch, &commit, false)?;
        local.set_upstream(Some(&format!("{}/{}", REMOTE, branch)))?;
        Ok(())
    }

    fn create_branch_at(&self, path: &Path, branch: &str, commit: &str) -> Result<(), GitError> {
        let repo = Self::open(path)?;
        let oid = Oid::from_str(commit)?;
        let commit = repo.find_commit(oid).map_err(|e| not_found(&oid.to_string(), e))?;
        repo.branch(branch, &commit, false)?;
        Ok(())
    }

    fn merge_ff_only(&self, path: &Path, branch: &str) -> Result<MergeOutcome, GitError> {
        let repo = Self::open(path)?;
        let local = local_ref(branch);
        let upstream = remote_ref(branch);

        let local_oid = repo.refname_to_id(&local).map_err(|e| not_found(&local, e))?;
        let remote_oid = repo.refname_to_id(&upstream).map_err(|e| not_found(&upstream, e))?;

        if local_oid == remote_oid {
            return Ok(MergeOutcome::UpToDate);
        }

        // Only a local tip that is an ancestor of the remote tip can move
        // without losing commits; local-ahead counts as diverged
        if !repo.graph_descendant_of(remote_oid, local_oid)? {
            return Err(GitError::NonFastForward(branch.to_string()));
        }

        if is_checked_out(&repo, &local) {
            let target = repo.find_object(remote_oid, None)?;
            repo.checkout_tree(&target, Some(CheckoutBuilder::new().safe()))?;
        }

        repo.find_reference(&local)?
            .set_target(remote_oid, "orgmirror: fast-forward")?;

        Ok(MergeOutcome::FastForwarded)
    }

    fn reset_hard(&self, path: &Path, branch: &str, target: &str) -> Result<(), GitError> {
        let repo = Self::open(path)?;
        let commit = repo
            .revparse_single(target)
            .and_then(|object| object.peel_to_commit())
            .map_err(|e| not_found(target, e))?;
        let refname = local_ref(branch);

        if is_checked_out(&repo, &refname) {
            repo.reset(commit.as_object(), ResetType::Hard, None)?;
        } else {
            repo.reference(&refname, commit.id(), true, "orgmirror: reset")?;
        }

        Ok(())
    }

    fn delete_branch(&self, path: &Path, branch: &str) -> Result<(), GitError> {
        let repo = Self::open(path)?;
        let mut local = repo
            .find_branch(branch, BranchType::Local)
            .map_err(|e| not_found(branch, e))?;
        local.delete()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::fixtures::{commit_in_worktree, commit_to_ref, Fixture};

    #[test]
    fn test_probe_reachable_remote() {
        let fixture = Fixture::new();
        assert!(Git2Port::default().probe_remote(&fixture.url()).is_ok());
    }

    #[test]
    fn test_probe_empty_remote() {
        let dir = tempfile::TempDir::new().unwrap();
        let empty = dir.path().join("empty.git");
        Repository::init_bare(&empty).unwrap();

        let err = Git2Port::default()
            .probe_remote(empty.to_str().unwrap())
            .unwrap_err();
        assert!(matches!(err, GitError::RemoteEmpty(_)));
        assert!(err.is_remote_unavailable());
    }

    #[test]
    fn test_probe_missing_remote() {
        let err = Git2Port::default()
            .probe_remote("/definitely/not/a/repository.git")
            .unwrap_err();
        assert!(err.is_remote_unavailable());
    }

    #[test]
    fn test_clone_and_list_branches() {
        let fixture = Fixture::new();
        fixture.remote_commit("develop", "dev.txt", "dev");

        let port = Git2Port::default();
        port.clone_repository(&fixture.url(), &fixture.clone_path()).unwrap();

        let mut remote = port.remote_branches(&fixture.clone_path()).unwrap();
        remote.sort();
        assert_eq!(remote, vec!["develop", "main"]);

        assert_eq!(port.local_branches(&fixture.clone_path()).unwrap(), vec!["main"]);
        assert_eq!(
            port.current_branch(&fixture.clone_path()).unwrap().as_deref(),
            Some("main")
        );
    }

    #[test]
    fn test_open_missing_repository() {
        let err = Git2Port::default()
            .local_branches(Path::new("/no/such/clone"))
            .unwrap_err();
        assert!(matches!(err, GitError::RepositoryNotFound(_)));
    }

    #[test]
    fn test_merge_ff_only_fast_forwards_checked_out_branch() {
        let fixture = Fixture::new();
        let port = Git2Port::default();
        let path = fixture.clone_path();
        port.clone_repository(&fixture.url(), &path).unwrap();

        let ahead = fixture.remote_commit("main", "b.txt", "second");
        port.fetch(&path).unwrap();

        assert_eq!(port.merge_ff_only(&path, "main").unwrap(), MergeOutcome::FastForwarded);
        assert_eq!(port.rev_parse(&path, "refs/heads/main").unwrap(), ahead.to_string());
        assert!(path.join("b.txt").exists());

        assert_eq!(port.merge_ff_only(&path, "main").unwrap(), MergeOutcome::UpToDate);
    }

    #[test]
    fn test_merge_ff_only_rejects_divergence() {
        let fixture = Fixture::new();
        let port = Git2Port::default();
        let path = fixture.clone_path();
        port.clone_repository(&fixture.url(), &path).unwrap();

        commit_in_worktree(&fixture.open_clone(), "local.txt", "local work");
        fixture.remote_commit("main", "remote.txt", "remote work");
        port.fetch(&path).unwrap();

        let err = port.merge_ff_only(&path, "main").unwrap_err();
        assert!(matches!(err, GitError::NonFastForward(ref b) if b == "main"));
    }

    #[test]
    fn test_local_ahead_is_not_fast_forward() {
        let fixture = Fixture::new();
        let port = Git2Port::default();
        let path = fixture.clone_path();
        port.clone_repository(&fixture.url(), &path).unwrap();

        commit_in_worktree(&fixture.open_clone(), "local.txt", "local work");

        assert!(matches!(
            port.merge_ff_only(&path, "main"),
            Err(GitError::NonFastForward(_))
        ));
    }

    #[test]
    fn test_reset_hard_and_branch_lifecycle() {
        let fixture = Fixture::new();
        let port = Git2Port::default();
        let path = fixture.clone_path();
        port.clone_repository(&fixture.url(), &path).unwrap();

        let local = commit_in_worktree(&fixture.open_clone(), "local.txt", "local work");
        port.create_branch_at(&path, "keep", &local.to_string()).unwrap();
        assert!(port.create_branch_at(&path, "keep", &local.to_string()).is_err());

        port.reset_hard(&path, "main", &remote_ref("main")).unwrap();
        assert_eq!(
            port.rev_parse(&path, "refs/heads/main").unwrap(),
            port.rev_parse(&path, &remote_ref("main")).unwrap()
        );
        assert!(!path.join("local.txt").exists());
        assert_eq!(port.rev_parse(&path, "refs/heads/keep").unwrap(), local.to_string());

        port.delete_branch(&path, "keep").unwrap();
        assert!(port.delete_branch(&path, "keep").unwrap_err().is_not_found());
        // The checked-out branch cannot be deleted
        assert!(port.delete_branch(&path, "main").is_err());
    }

    #[test]
    fn test_tracking_branch_and_checkout() {
        let fixture = Fixture::new();
        let dev = fixture.remote_commit("develop", "dev.txt", "dev");
        let port = Git2Port::default();
        let path = fixture.clone_path();
        port.clone_repository(&fixture.url(), &path).unwrap();

        port.create_tracking_branch(&path, "develop").unwrap();
        assert_eq!(port.rev_parse(&path, "refs/heads/develop").unwrap(), dev.to_string());

        port.checkout(&path, "develop").unwrap();
        assert_eq!(port.current_branch(&path).unwrap().as_deref(), Some("develop"));
        assert!(path.join("dev.txt").exists());

        port.checkout(&path, "main").unwrap();
        assert!(!path.join("dev.txt").exists());
        assert!(port.checkout(&path, "missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_is_ancestor() {
        let fixture = Fixture::new();
        let base = fixture.remote.refname_to_id("refs/heads/main").unwrap();
        let next = commit_to_ref(&fixture.remote, "refs/heads/main", "n.txt", "next");
        let port = Git2Port::default();
        let path = fixture.clone_path();
        port.clone_repository(&fixture.url(), &path).unwrap();

        let (base, next) = (base.to_string(), next.to_string());
        assert!(port.is_ancestor(&path, &base, &next).unwrap());
        assert!(port.is_ancestor(&path, &next, &next).unwrap());
        assert!(!port.is_ancestor(&path, &next, &base).unwrap());
    }

    #[test]
    fn test_remove_clone_tolerates_missing_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let port = Git2Port::default();
        port.remove_clone(&dir.path().join("never-existed")).unwrap();

        let present = dir.path().join("present");
        std::fs::create_dir_all(present.join("nested")).unwrap();
        port.remove_clone(&present).unwrap();
        assert!(!present.exists());
    }

    #[test]
    fn test_credentials_debug_redacts_token() {
        let credentials = Credentials {
            ssh_key: None,
            token: Some("ghp_secret".to_string()),
        };
        let debug = format!("{:?}", credentials);
        assert!(!debug.contains("ghp_secret"));
        assert!(debug.contains("redacted"));
    }
}
