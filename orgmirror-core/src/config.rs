//! Configuration management for orgmirror
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (ORGMIRROR_*)
//! 3. Config file (~/.config/orgmirror/config.toml)
//! 4. Default values

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cleanup::RetentionPolicy;
use crate::retention::RetentionPeriod;
use crate::{Error, Result};

/// Where and how clones are kept
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Backup root; clones live at `<path>/<organization>/<repository>`
    pub path: PathBuf,

    /// Clone over SSH instead of HTTPS
    pub clone_via_ssh: bool,

    /// Private key for SSH remotes
    pub ssh_key: Option<PathBuf>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_dir()
                .map(|p| p.join("orgmirror"))
                .unwrap_or_else(|| PathBuf::from("backup")),
            clone_via_ssh: false,
            ssh_key: None,
        }
    }
}

impl BackupConfig {
    /// Configured SSH key, if it exists on disk. Otherwise the agent is used.
    pub fn ssh_key(&self) -> Option<&Path> {
        self.ssh_key
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty() && path.exists())
    }
}

/// Per-organization switch
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrganizationConfig {
    pub enabled: bool,
}

impl Default for OrganizationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Retention tracking configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Record entity lifecycles and run cleanup sweeps
    pub enabled: bool,

    /// SQLite database path; `~/.cache/orgmirror/orgmirror.db` when unset
    pub database: Option<PathBuf>,

    pub delete_abandoned_branches_after: RetentionPeriod,
    pub delete_removed_branches_after: RetentionPeriod,
    pub delete_removed_repositories_after: RetentionPeriod,

    /// How long before a repository's deletion to start warning about it
    pub deletion_warning: RetentionPeriod,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database: None,
            delete_abandoned_branches_after: RetentionPeriod::Disabled,
            delete_removed_branches_after: RetentionPeriod::Disabled,
            delete_removed_repositories_after: RetentionPeriod::Disabled,
            deletion_warning: RetentionPeriod::Days(7),
        }
    }
}

impl TrackerConfig {
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            abandoned_branches: self.delete_abandoned_branches_after,
            removed_branches: self.delete_removed_branches_after,
            removed_repositories: self.delete_removed_repositories_after,
            deletion_warning: self.deletion_warning,
        }
    }
}

/// GitHub API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Longest single wait for the rate limit to reset
    #[serde(with = "humantime_serde")]
    pub rate_limit_max_wait: Duration,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            rate_limit_max_wait: Duration::from_secs(60 * 60),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub backup: BackupConfig,

    /// Organizations by login
    pub organizations: BTreeMap<String, OrganizationConfig>,

    pub tracker: TrackerConfig,

    pub github: GitHubConfig,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();

        if let Some(path) = config_path {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/orgmirror/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("orgmirror").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - ORGMIRROR_BACKUP_PATH: Backup root
    /// - ORGMIRROR_DATABASE: Retention database path
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("ORGMIRROR_BACKUP_PATH") {
            self.backup.path = PathBuf::from(path);
        }

        if let Ok(database) = std::env::var("ORGMIRROR_DATABASE") {
            self.tracker.database = Some(PathBuf::from(database));
        }

        self
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(mut self, backup_path: Option<PathBuf>) -> Self {
        if let Some(path) = backup_path {
            self.backup.path = path;
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults. `config_path` replaces
    /// the default file location and must exist.
    pub fn load_with_overrides(
        config_path: Option<&Path>,
        backup_path: Option<PathBuf>,
    ) -> Result<Self> {
        let config = match config_path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load()?,
        };

        Ok(config
            .with_env_overrides()
            .with_cli_overrides(backup_path))
    }

    /// Organizations switched on, in name order
    pub fn enabled_organizations(&self) -> Vec<String> {
        self.organizations
            .iter()
            .filter(|(_, org)| org.enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }
}
