//! Credentials for orgmirror
//!
//! The GitHub token is kept apart from configuration so the config file can
//! be shared. It lives in `~/.config/orgmirror/secrets.toml`, which must not
//! be readable by group or others (0600 on Unix).
//!
//! Loading priority:
//! 1. Environment variable (GITHUB_TOKEN)
//! 2. Secrets file (~/.config/orgmirror/secrets.toml)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

const TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Secrets structure
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Secrets {
    pub github: GitHubSecrets,
}

/// GitHub-related secrets
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubSecrets {
    /// Personal access token; also used for HTTPS clones
    pub token: Option<String>,
}

impl std::fmt::Debug for GitHubSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubSecrets")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets").field("github", &self.github).finish()
    }
}

impl Secrets {
    /// Load secrets from the default location
    ///
    /// Returns empty secrets if the file doesn't exist
    pub fn load() -> Result<Self> {
        match Self::default_secrets_path() {
            Some(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load secrets from a specific file, refusing group- or world-readable files
    pub fn load_from_file(path: &Path) -> Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mode = std::fs::metadata(path).map_err(Error::Io)?.permissions().mode();
            if mode & 0o077 != 0 {
                return Err(Error::Config(format!(
                    "Secrets file {} has insecure permissions {:o}. \
                     Please run: chmod 600 {}",
                    path.display(),
                    mode & 0o777,
                    path.display()
                )));
            }

            debug!(path = %path.display(), mode = format!("{:o}", mode & 0o777), "Secrets file permissions OK");
        }

        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        let mut secrets: Secrets = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse secrets: {}", e)))?;

        if let Some(token) = secrets.github.token.as_mut() {
            *token = token.trim().to_string();
        }

        Ok(secrets)
    }

    /// Returns `~/.config/orgmirror/secrets.toml` on Unix
    pub fn default_secrets_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("orgmirror").join("secrets.toml"))
    }

    /// GitHub token, preferring the environment over the secrets file
    pub fn github_token(&self) -> Option<String> {
        self.token_from(std::env::var(TOKEN_ENV).ok())
    }

    fn token_from(&self, env: Option<String>) -> Option<String> {
        if let Some(token) = env.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
            debug!("Using GitHub token from {}", TOKEN_ENV);
            return Some(token);
        }

        match self.github.token.as_deref() {
            Some(token) if !token.is_empty() => {
                debug!("Using GitHub token from secrets file");
                Some(token.to_string())
            }
            _ => None,
        }
    }

    /// Write a template secrets file with owner-only permissions
    pub fn create_template() -> Result<PathBuf> {
        let path = Self::default_secrets_path()
            .ok_or_else(|| Error::Config("Could not determine secrets path".to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }

        if path.exists() {
            return Err(Error::Config(format!(
                "Secrets file already exists at {}",
                path.display()
            )));
        }

        let template = r#"# orgmirror secrets
# Keep this file private (chmod 600) and out of version control.

[github]
# Personal access token with read access to the organizations' repositories
# and membership (scopes: repo, read:org)
token = ""
"#;

        std::fs::write(&path, template).map_err(Error::Io)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .map_err(Error::Io)?;
        }

        warn!(path = %path.display(), "Created secrets template - add your GitHub token");

        Ok(path)
    }
}
