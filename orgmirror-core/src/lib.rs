//! orgmirror core - mirror every branch of an organization's repositories
//!
//! This crate holds the reconciliation engine that keeps local clones in
//! line with their remotes, the retention cleanup that reclaims branches and
//! repositories that disappeared upstream, and the orchestration tying them
//! to a hosting service.

pub mod backup;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod git;
pub mod hosting;
pub mod reconcile;
pub mod retention;
pub mod secrets;

pub use backup::{BackupRunner, CancelFlag, OrganizationSelection, RunReport};
pub use cleanup::{Cleanup, CleanupReport, RetentionPolicy};
pub use config::Config;
pub use error::{Error, Result};
pub use git::{Credentials, Git2Port, GitError, GitPort};
pub use hosting::{HostingApi, RemoteRepository};
pub use reconcile::{Reconciler, RepoOutcome};
pub use retention::RetentionPeriod;
pub use secrets::Secrets;
