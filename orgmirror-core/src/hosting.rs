//! Source-control hosting abstraction
//!
//! The orchestrator only needs to know who it is, which organizations it can
//! see and which repositories each one holds. [`HostingApi`] captures that so
//! the GitHub client can be swapped for a fake in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A repository as listed by the hosting service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRepository {
    /// `organization/name`
    pub full_name: String,
    /// Owning organization login
    pub organization: String,
    /// HTTPS clone URL
    pub clone_url: String,
    /// SSH clone URL
    pub ssh_url: String,
}

impl RemoteRepository {
    /// Repository name without the organization prefix
    pub fn name(&self) -> &str {
        self.full_name
            .rsplit_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.full_name)
    }

    /// URL to clone and fetch from
    pub fn url(&self, ssh: bool) -> &str {
        if ssh {
            &self.ssh_url
        } else {
            &self.clone_url
        }
    }
}

/// Read-only view of a hosting service
#[async_trait]
pub trait HostingApi: Send + Sync {
    /// Login of the authenticated user
    async fn current_user(&self) -> Result<String>;

    /// Logins of every organization the user can access
    async fn organizations(&self) -> Result<Vec<String>>;

    /// Repositories of an organization, in listing order
    async fn repositories(&self, organization: &str) -> Result<Vec<RemoteRepository>>;

    /// Sleep until the API quota allows more requests
    async fn wait_for_rate_limit(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_and_url() {
        let repo = RemoteRepository {
            full_name: "acme/widgets".to_string(),
            organization: "acme".to_string(),
            clone_url: "https://github.com/acme/widgets.git".to_string(),
            ssh_url: "git@github.com:acme/widgets.git".to_string(),
        };

        assert_eq!(repo.name(), "widgets");
        assert_eq!(repo.url(true), "git@github.com:acme/widgets.git");
        assert_eq!(repo.url(false), "https://github.com/acme/widgets.git");
    }

    #[test]
    fn test_name_without_owner() {
        let repo = RemoteRepository {
            full_name: "lonely".to_string(),
            organization: "acme".to_string(),
            clone_url: String::new(),
            ssh_url: String::new(),
        };
        assert_eq!(repo.name(), "lonely");
    }
}
