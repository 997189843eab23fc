//! On-disk repositories for tests: a bare remote plus a backup root

use std::path::{Path, PathBuf};

use git2::{Commit, Oid, Repository, Signature};
use tempfile::TempDir;

pub const ORG: &str = "acme";
pub const REPO: &str = "widgets";

pub fn signature() -> Signature<'static> {
    Signature::now("Mirror Test", "mirror@example.com").unwrap()
}

/// Commit one file onto `refname` without touching any working tree
pub fn commit_to_ref(repo: &Repository, refname: &str, file: &str, content: &str) -> Oid {
    let parent = repo
        .refname_to_id(refname)
        .ok()
        .map(|oid| repo.find_commit(oid).unwrap());

    let base_tree = parent.as_ref().map(|commit| commit.tree().unwrap());
    let mut builder = repo.treebuilder(base_tree.as_ref()).unwrap();
    let blob = repo.blob(content.as_bytes()).unwrap();
    builder.insert(file, blob, 0o100644).unwrap();
    let tree = repo.find_tree(builder.write().unwrap()).unwrap();

    let sig = signature();
    let parents: Vec<&Commit> = parent.iter().collect();
    repo.commit(Some(refname), &sig, &sig, content, &tree, &parents)
        .unwrap()
}

/// Commit one file on the checked-out branch of a non-bare repository
pub fn commit_in_worktree(repo: &Repository, file: &str, content: &str) -> Oid {
    let workdir = repo.workdir().unwrap();
    std::fs::write(workdir.join(file), content).unwrap();

    let mut index = repo.index().unwrap();
    index.add_path(Path::new(file)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();

    let parent = repo.head().unwrap().peel_to_commit().unwrap();
    let sig = signature();
    repo.commit(Some("HEAD"), &sig, &sig, content, &tree, &[&parent])
        .unwrap()
}

/// A bare remote `acme/widgets` with one commit on `main`
pub struct Fixture {
    _dir: TempDir,
    pub root: PathBuf,
    pub remote_path: PathBuf,
    pub remote: Repository,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let remote_path = root.join("remotes").join(ORG).join(format!("{}.git", REPO));
        let remote = Repository::init_bare(&remote_path).unwrap();

        commit_to_ref(&remote, "refs/heads/main", "README.md", "widgets");
        remote.set_head("refs/heads/main").unwrap();

        Self {
            _dir: dir,
            root,
            remote_path,
            remote,
        }
    }

    pub fn url(&self) -> String {
        self.remote_path.to_str().unwrap().to_string()
    }

    pub fn backup_root(&self) -> PathBuf {
        self.root.join("backup")
    }

    pub fn clone_path(&self) -> PathBuf {
        self.backup_root().join(ORG).join(REPO)
    }

    pub fn open_clone(&self) -> Repository {
        Repository::open(self.clone_path()).unwrap()
    }

    /// Add a commit to a remote branch, creating the branch if needed
    pub fn remote_commit(&self, branch: &str, file: &str, content: &str) -> Oid {
        commit_to_ref(&self.remote, &format!("refs/heads/{}", branch), file, content)
    }

    pub fn delete_remote_branch(&self, branch: &str) {
        self.remote
            .find_reference(&format!("refs/heads/{}", branch))
            .unwrap()
            .delete()
            .unwrap();
    }

    /// Push a local clone branch to a remote branch name
    pub fn push_from_clone(&self, local: &str, remote_branch: &str) {
        let clone = self.open_clone();
        let mut origin = clone.find_remote("origin").unwrap();
        let refspec = format!("refs/heads/{}:refs/heads/{}", local, remote_branch);
        origin.push(&[refspec.as_str()], None).unwrap();
    }
}
