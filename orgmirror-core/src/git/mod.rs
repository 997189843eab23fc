//! Git operations for orgmirror
//!
//! [`GitPort`] is the capability set reconciliation and cleanup need from a
//! version-control backend. [`Git2Port`] implements it with libgit2.

mod backend;
mod port;

#[cfg(test)]
pub(crate) mod fixtures;

pub use backend::{Credentials, Git2Port};
pub use port::{local_ref, remote_ref, GitError, GitPort, MergeOutcome, REMOTE};
