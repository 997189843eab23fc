//! GitHub API client using octocrab

use std::time::Duration;

use crate::{Error, Result};
use orgmirror_core::Secrets;
use octocrab::Octocrab;
use tracing::{debug, info};

/// GitHub API client scoped to the authenticated user
pub struct GitHubClient {
    client: Octocrab,
    rate_limit_max_wait: Duration,
}

impl GitHubClient {
    /// Create a client authenticated with a personal access token
    pub fn new(token: impl Into<String>, rate_limit_max_wait: Duration) -> Result<Self> {
        let client = Octocrab::builder()
            .personal_token(token.into())
            .build()
            .map_err(|e| Error::Auth(format!("Failed to create GitHub client: {}", e)))?;

        debug!(?rate_limit_max_wait, "Created GitHub client");

        Ok(Self {
            client,
            rate_limit_max_wait,
        })
    }

    /// Create a client with the token from secrets
    ///
    /// Token is loaded from (in priority order):
    /// 1. GITHUB_TOKEN environment variable
    /// 2. ~/.config/orgmirror/secrets.toml
    pub fn from_secrets(secrets: &Secrets, rate_limit_max_wait: Duration) -> Result<Self> {
        let token = secrets.github_token().ok_or_else(|| {
            Error::Auth(
                "GitHub token not found. Set GITHUB_TOKEN environment variable \
                 or add token to ~/.config/orgmirror/secrets.toml"
                    .to_string(),
            )
        })?;

        Self::new(token, rate_limit_max_wait)
    }

    /// Get the underlying octocrab client
    pub fn client(&self) -> &Octocrab {
        &self.client
    }

    pub fn rate_limit_max_wait(&self) -> Duration {
        self.rate_limit_max_wait
    }

    /// Login of the token's owner; also checks that the token works
    pub async fn login(&self) -> Result<String> {
        let user = self.client.current().user().await.map_err(|e| match e {
            octocrab::Error::GitHub { source, .. } if source.message.contains("Bad credentials") => {
                Error::Auth("Invalid GitHub token".to_string())
            }
            other => Error::Api(other),
        })?;

        info!(login = %user.login, "Authenticated with GitHub");
        Ok(user.login)
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("rate_limit_max_wait", &self.rate_limit_max_wait)
            .finish_non_exhaustive()
    }
}
