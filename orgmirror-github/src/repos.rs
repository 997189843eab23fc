//! Organization and repository enumeration

use async_trait::async_trait;
use orgmirror_core::{HostingApi, RemoteRepository};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{Error, GitHubClient, Result};

const PER_PAGE: u8 = 100;

#[derive(Debug, Deserialize)]
struct OrganizationSummary {
    login: String,
}

#[derive(Serialize)]
struct PageParams {
    per_page: u8,
    page: u32,
}

/// Build a [`RemoteRepository`], deriving GitHub's URL layout for missing fields
fn remote_repository(
    organization: &str,
    name: &str,
    full_name: Option<String>,
    clone_url: Option<String>,
    ssh_url: Option<String>,
) -> RemoteRepository {
    let full_name = full_name.unwrap_or_else(|| format!("{}/{}", organization, name));

    RemoteRepository {
        clone_url: clone_url.unwrap_or_else(|| format!("https://github.com/{}.git", full_name)),
        ssh_url: ssh_url.unwrap_or_else(|| format!("git@github.com:{}.git", full_name)),
        organization: organization.to_string(),
        full_name,
    }
}

impl GitHubClient {
    /// Logins of all organizations the authenticated user belongs to
    pub async fn list_organizations(&self) -> Result<Vec<String>> {
        let mut organizations = Vec::new();

        let mut page = 1u32;
        loop {
            let params = PageParams {
                per_page: PER_PAGE,
                page,
            };
            let batch: Vec<OrganizationSummary> =
                self.client().get("/user/orgs", Some(&params)).await?;

            if batch.is_empty() {
                break;
            }

            let full = batch.len() == usize::from(PER_PAGE);
            organizations.extend(batch.into_iter().map(|org| org.login));
            if !full {
                break;
            }
            page += 1;
        }

        debug!(count = organizations.len(), "Fetched organizations");
        Ok(organizations)
    }

    /// All repositories of an organization (paginating through all pages)
    pub async fn list_repositories(&self, organization: &str) -> Result<Vec<RemoteRepository>> {
        let mut repositories = Vec::new();

        let mut page_num = 1u32;
        loop {
            let page = self
                .client()
                .orgs(organization)
                .list_repos()
                .per_page(PER_PAGE)
                .page(page_num)
                .send()
                .await
                .map_err(|e| match &e {
                    octocrab::Error::GitHub { source, .. } if source.message.contains("Not Found") => {
                        Error::OrganizationNotFound(organization.to_string())
                    }
                    _ => Error::Api(e),
                })?;

            if page.items.is_empty() {
                break;
            }

            repositories.extend(page.items.into_iter().map(|repo| {
                remote_repository(
                    organization,
                    &repo.name,
                    repo.full_name,
                    repo.clone_url.map(|url| url.to_string()),
                    repo.ssh_url,
                )
            }));

            if page.next.is_none() {
                break;
            }
            page_num += 1;
        }

        info!(organization = %organization, count = repositories.len(), "Fetched repositories");
        Ok(repositories)
    }
}

#[async_trait]
impl HostingApi for GitHubClient {
    async fn current_user(&self) -> orgmirror_core::Result<String> {
        Ok(self.login().await?)
    }

    async fn organizations(&self) -> orgmirror_core::Result<Vec<String>> {
        Ok(self.list_organizations().await?)
    }

    async fn repositories(&self, organization: &str) -> orgmirror_core::Result<Vec<RemoteRepository>> {
        Ok(self.list_repositories(organization).await?)
    }

    async fn wait_for_rate_limit(&self) -> orgmirror_core::Result<()> {
        Ok(self.wait_for_core_quota().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_repository_keeps_api_urls() {
        let repo = remote_repository(
            "acme",
            "widgets",
            Some("acme/widgets".to_string()),
            Some("https://github.com/acme/widgets.git".to_string()),
            Some("git@github.com:acme/widgets.git".to_string()),
        );
        assert_eq!(repo.name(), "widgets");
        assert_eq!(repo.organization, "acme");
        assert_eq!(repo.url(true), "git@github.com:acme/widgets.git");
    }

    #[test]
    fn test_remote_repository_derives_missing_urls() {
        let repo = remote_repository("acme", "gadgets", None, None, None);
        assert_eq!(repo.full_name, "acme/gadgets");
        assert_eq!(repo.clone_url, "https://github.com/acme/gadgets.git");
        assert_eq!(repo.ssh_url, "git@github.com:acme/gadgets.git");
    }

    #[test]
    fn test_organization_summary_ignores_extra_fields() {
        let orgs: Vec<OrganizationSummary> = serde_json::from_str(
            r#"[{"login":"acme","id":1,"url":"https://api.github.com/orgs/acme"}]"#,
        )
        .unwrap();
        assert_eq!(orgs[0].login, "acme");
    }
}
