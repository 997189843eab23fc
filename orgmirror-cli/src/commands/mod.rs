//! CLI command implementations

pub mod backup;
pub mod cleanup;
pub mod info;
pub mod list;
pub mod status;

pub use backup::BackupArgs;
pub use cleanup::CleanupArgs;
pub use list::ListArgs;
pub use status::StatusArgs;

use anyhow::Context;
use orgmirror_core::{Config, Credentials, Git2Port, Secrets};
use orgmirror_db::{Database, RetentionStore};
use orgmirror_github::GitHubClient;

/// Open the retention store, or a disabled one when tracking is off
pub async fn open_store(config: &Config) -> anyhow::Result<RetentionStore> {
    if !config.tracker.enabled {
        tracing::debug!("Retention tracking disabled");
        return Ok(RetentionStore::disabled());
    }

    let path = match &config.tracker.database {
        Some(path) => path.clone(),
        None => Database::default_path()?,
    };

    let db = Database::new(&path)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))?;

    Ok(db.retention())
}

/// GitHub client using the token from the environment or secrets file
pub fn github_client(config: &Config, secrets: &Secrets) -> anyhow::Result<GitHubClient> {
    Ok(GitHubClient::from_secrets(
        secrets,
        config.github.rate_limit_max_wait,
    )?)
}

/// Git backend authenticating with the configured SSH key or the GitHub token
pub fn git_port(config: &Config, secrets: &Secrets) -> Git2Port {
    Git2Port::new(Credentials {
        ssh_key: config.backup.ssh_key().map(|p| p.to_path_buf()),
        token: secrets.github_token(),
    })
}

/// Format a duration in seconds as a human-readable string
pub fn format_duration(seconds: i64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m", seconds / 60)
    } else if seconds < 86400 {
        let hours = seconds / 3600;
        let mins = (seconds % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    } else {
        let days = seconds / 86400;
        let hours = (seconds % 86400) / 3600;
        if hours > 0 {
            format!("{}d {}h", days, hours)
        } else {
            format!("{}d", days)
        }
    }
}
