//! Database layer for orgmirror
//!
//! Provides the durable retention record of mirrored organizations,
//! repositories and branches.

pub mod error;
pub mod models;
pub mod retention;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use error::{Error, Result};
pub use models::{OrganizationId, RepositoryId, StaleBranch, TrackedBranch, TrackedRepository};
pub use retention::RetentionStore;

/// Database connection pool
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection from a file path
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| Error::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::debug!(path = %db_path.display(), "Opened retention database");

        Ok(Self { pool })
    }

    /// Get the default database path (~/.cache/orgmirror/orgmirror.db)
    pub fn default_path() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir().ok_or(Error::NoCacheDir)?;
        Ok(cache_dir.join("orgmirror").join("orgmirror.db"))
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get the retention store backed by this database
    pub fn retention(&self) -> RetentionStore {
        RetentionStore::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_database_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");

        let _db = Database::new(&db_path).await.unwrap();
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_database_migrations() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Database::new(&db_path).await.unwrap();

        for table in ["organizations", "repositories", "branches"] {
            let result: (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?")
                    .bind(table)
                    .fetch_one(db.pool())
                    .await
                    .unwrap();
            assert_eq!(result.0, 1, "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_reopen_keeps_records() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        {
            let db = Database::new(&db_path).await.unwrap();
            db.retention().upsert_organization("acme").await.unwrap();
        }

        let db = Database::new(&db_path).await.unwrap();
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM organizations")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn test_unwritable_directory() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let err = Database::new(blocker.join("test.db")).await.unwrap_err();
        match err {
            Error::CreateDir { path, .. } => assert_eq!(path, blocker),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
