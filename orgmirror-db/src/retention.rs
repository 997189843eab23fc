//! Retention store: lifecycle records for organizations, repositories and branches
//!
//! Every operation runs in its own transaction. A store created with
//! [`RetentionStore::disabled`] turns every operation into a no-op that
//! returns an empty result, so callers never need to check whether tracking
//! is switched on.

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::models::{
    from_millis, OrganizationId, RepositoryId, StaleBranch, TrackedBranch, TrackedRepository,
};
use crate::Result;

const REPOSITORY_COLUMNS: &str = "r.id, r.organization_id, o.name AS organization, r.name, \
     r.created_at, r.last_seen_at, r.tracked";

/// Durable record of mirrored entities
#[derive(Clone, Default)]
pub struct RetentionStore {
    pool: Option<SqlitePool>,
}

impl std::fmt::Debug for RetentionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionStore")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl RetentionStore {
    /// Create a store backed by the given pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Some(pool) }
    }

    /// Create a store that records nothing
    pub fn disabled() -> Self {
        Self { pool: None }
    }

    /// Whether tracking is active
    pub fn is_enabled(&self) -> bool {
        self.pool.is_some()
    }

    /// Record an organization, returning its identity. Idempotent.
    pub async fn upsert_organization(&self, name: &str) -> Result<Option<OrganizationId>> {
        let Some(pool) = &self.pool else {
            return Ok(None);
        };

        let mut tx = pool.begin().await?;

        sqlx::query("INSERT INTO organizations (name, tracked) VALUES (?, 1) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        let id: OrganizationId = sqlx::query_scalar("SELECT id FROM organizations WHERE name = ?")
            .bind(name)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(id))
    }

    /// Record a repository, or refresh its last-seen time if already known
    pub async fn upsert_repository(
        &self,
        name: &str,
        organization: OrganizationId,
        first_seen: DateTime<Utc>,
    ) -> Result<Option<RepositoryId>> {
        let Some(pool) = &self.pool else {
            return Ok(None);
        };

        let seen = first_seen.timestamp_millis();
        let mut tx = pool.begin().await?;

        let existing: Option<RepositoryId> = sqlx::query_scalar(
            "SELECT id FROM repositories WHERE organization_id = ? AND name = ?",
        )
        .bind(organization)
        .bind(name)
        .fetch_optional(&mut *tx)
        .await?;

        let id = match existing {
            Some(id) => {
                sqlx::query("UPDATE repositories SET last_seen_at = ? WHERE id = ?")
                    .bind(seen)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                id
            }
            None => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO repositories (organization_id, name, created_at, last_seen_at, tracked)
                    VALUES (?, ?, ?, ?, 1)
                    "#,
                )
                .bind(organization)
                .bind(name)
                .bind(seen)
                .bind(seen)
                .execute(&mut *tx)
                .await?;
                RepositoryId(result.last_insert_rowid())
            }
        };

        tx.commit().await?;
        Ok(Some(id))
    }

    /// Refresh a repository's last-seen time. Unknown repositories are left alone.
    pub async fn touch_repository(&self, repository: RepositoryId, now: DateTime<Utc>) -> Result<bool> {
        let Some(pool) = &self.pool else {
            return Ok(false);
        };

        let mut tx = pool.begin().await?;
        let result = sqlx::query("UPDATE repositories SET last_seen_at = ? WHERE id = ?")
            .bind(now.timestamp_millis())
            .bind(repository)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a branch.
    ///
    /// A record is keyed by (name, repository, abandoned). An existing ordinary
    /// record has its last-seen time refreshed; an existing abandoned record is
    /// a frozen snapshot and is left untouched.
    pub async fn upsert_branch(
        &self,
        name: &str,
        repository: RepositoryId,
        created: DateTime<Utc>,
        abandoned: bool,
        tracked: bool,
    ) -> Result<()> {
        let Some(pool) = &self.pool else {
            return Ok(());
        };

        let at = created.timestamp_millis();
        let mut tx = pool.begin().await?;

        if !repository_exists(&mut tx, repository).await? {
            return Ok(());
        }

        let existing: Option<(i64, bool)> = sqlx::query_as(
            "SELECT id, abandoned FROM branches WHERE repository_id = ? AND name = ? AND abandoned = ?",
        )
        .bind(repository)
        .bind(name)
        .bind(abandoned)
        .fetch_optional(&mut *tx)
        .await?;

        match existing {
            Some((_, true)) => {}
            Some((id, false)) => {
                sqlx::query("UPDATE branches SET last_seen_at = ? WHERE id = ?")
                    .bind(at)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }
            None => {
                insert_branch(&mut tx, name, repository, at, abandoned, tracked).await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Refresh an ordinary branch's last-seen time, starting to track it if it
    /// has no record yet
    pub async fn touch_branch(
        &self,
        name: &str,
        repository: RepositoryId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some(pool) = &self.pool else {
            return Ok(());
        };

        let at = now.timestamp_millis();
        let mut tx = pool.begin().await?;

        if !repository_exists(&mut tx, repository).await? {
            return Ok(());
        }

        let result = sqlx::query(
            "UPDATE branches SET last_seen_at = ? WHERE repository_id = ? AND name = ? AND abandoned = 0",
        )
        .bind(at)
        .bind(repository)
        .bind(name)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            insert_branch(&mut tx, name, repository, at, false, true).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Branches whose age is at least `days` days at `now`.
    ///
    /// Abandoned branches age from their creation, ordinary branches from the
    /// last time they were seen on the remote. Negative `days` means the
    /// threshold is disabled and nothing qualifies.
    pub async fn branches_older_than(
        &self,
        days: i64,
        abandoned: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<StaleBranch>> {
        let Some(pool) = &self.pool else {
            return Ok(Vec::new());
        };
        let Some(cutoff) = cutoff_millis(days, now) else {
            return Ok(Vec::new());
        };

        let column = if abandoned { "b.created_at" } else { "b.last_seen_at" };
        let sql = format!(
            r#"
            SELECT b.name AS branch, b.repository_id, r.name AS repository, o.name AS organization
            FROM branches b
            JOIN repositories r ON r.id = b.repository_id
            JOIN organizations o ON o.id = r.organization_id
            WHERE b.abandoned = ? AND {} <= ?
            ORDER BY o.name, r.name, b.name
            "#,
            column
        );

        let rows = sqlx::query(&sql)
            .bind(abandoned)
            .bind(cutoff)
            .fetch_all(pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<StaleBranch> {
                Ok(StaleBranch {
                    branch: row.try_get("branch")?,
                    repository_id: row.try_get("repository_id")?,
                    repository: row.try_get("repository")?,
                    organization: row.try_get("organization")?,
                })
            })
            .collect()
    }

    /// Repositories not seen on the remote for at least `days` days at `now`.
    /// Negative `days` means disabled.
    pub async fn repositories_older_than(
        &self,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<TrackedRepository>> {
        let Some(pool) = &self.pool else {
            return Ok(Vec::new());
        };
        let Some(cutoff) = cutoff_millis(days, now) else {
            return Ok(Vec::new());
        };

        let sql = format!(
            r#"
            SELECT {}
            FROM repositories r
            JOIN organizations o ON o.id = r.organization_id
            WHERE r.last_seen_at <= ?
            ORDER BY o.name, r.name
            "#,
            REPOSITORY_COLUMNS
        );

        let rows = sqlx::query(&sql).bind(cutoff).fetch_all(pool).await?;
        rows.iter().map(map_repository).collect()
    }

    /// Remove a branch record (ordinary and abandoned alike)
    pub async fn delete_branch(&self, name: &str, repository: RepositoryId) -> Result<u64> {
        let Some(pool) = &self.pool else {
            return Ok(0);
        };

        let mut tx = pool.begin().await?;
        let result = sqlx::query("DELETE FROM branches WHERE repository_id = ? AND name = ?")
            .bind(repository)
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(result.rows_affected())
    }

    /// Remove a repository record together with all of its branch records
    pub async fn delete_repository(&self, name: &str, organization: OrganizationId) -> Result<u64> {
        let Some(pool) = &self.pool else {
            return Ok(0);
        };

        let mut tx = pool.begin().await?;

        let Some(id): Option<RepositoryId> = sqlx::query_scalar(
            "SELECT id FROM repositories WHERE organization_id = ? AND name = ?",
        )
        .bind(organization)
        .bind(name)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(0);
        };

        let branches = sqlx::query("DELETE FROM branches WHERE repository_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let repositories = sqlx::query("DELETE FROM repositories WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(
            repository = %name,
            branches = branches.rows_affected(),
            "Deleted repository record"
        );

        Ok(repositories.rows_affected())
    }

    /// Look up a repository by organization and name
    pub async fn find_repository(
        &self,
        organization: OrganizationId,
        name: &str,
    ) -> Result<Option<TrackedRepository>> {
        let Some(pool) = &self.pool else {
            return Ok(None);
        };

        let sql = format!(
            r#"
            SELECT {}
            FROM repositories r
            JOIN organizations o ON o.id = r.organization_id
            WHERE r.organization_id = ? AND r.name = ?
            "#,
            REPOSITORY_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(organization)
            .bind(name)
            .fetch_optional(pool)
            .await?;

        row.as_ref().map(map_repository).transpose()
    }

    /// All tracked repositories, ordered by organization and name
    pub async fn repositories(&self) -> Result<Vec<TrackedRepository>> {
        let Some(pool) = &self.pool else {
            return Ok(Vec::new());
        };

        let sql = format!(
            r#"
            SELECT {}
            FROM repositories r
            JOIN organizations o ON o.id = r.organization_id
            ORDER BY o.name, r.name
            "#,
            REPOSITORY_COLUMNS
        );

        let rows = sqlx::query(&sql).fetch_all(pool).await?;
        rows.iter().map(map_repository).collect()
    }

    /// All branch records of a repository
    pub async fn branches(&self, repository: RepositoryId) -> Result<Vec<TrackedBranch>> {
        let Some(pool) = &self.pool else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT repository_id, name, created_at, last_seen_at, abandoned, tracked
            FROM branches
            WHERE repository_id = ?
            ORDER BY abandoned, name
            "#,
        )
        .bind(repository)
        .fetch_all(pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<TrackedBranch> {
                Ok(TrackedBranch {
                    repository_id: row.try_get("repository_id")?,
                    name: row.try_get("name")?,
                    created_at: from_millis("created_at", row.try_get("created_at")?)?,
                    last_seen_at: from_millis("last_seen_at", row.try_get("last_seen_at")?)?,
                    abandoned: row.try_get("abandoned")?,
                    tracked: row.try_get("tracked")?,
                })
            })
            .collect()
    }
}

/// Epoch-millisecond cutoff for an age query, `None` when disabled or out of range
fn cutoff_millis(days: i64, now: DateTime<Utc>) -> Option<i64> {
    if days < 0 {
        return None;
    }
    let age = Duration::try_days(days)?;
    now.checked_sub_signed(age).map(|cutoff| cutoff.timestamp_millis())
}

async fn repository_exists(tx: &mut Transaction<'_, Sqlite>, repository: RepositoryId) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM repositories WHERE id = ?")
        .bind(repository)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(found.is_some())
}

async fn insert_branch(
    tx: &mut Transaction<'_, Sqlite>,
    name: &str,
    repository: RepositoryId,
    at: i64,
    abandoned: bool,
    tracked: bool,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO branches (repository_id, name, created_at, last_seen_at, abandoned, tracked)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(repository)
    .bind(name)
    .bind(at)
    .bind(at)
    .bind(abandoned)
    .bind(tracked)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn map_repository(row: &SqliteRow) -> Result<TrackedRepository> {
    Ok(TrackedRepository {
        id: row.try_get("id")?,
        organization_id: row.try_get("organization_id")?,
        organization: row.try_get("organization")?,
        name: row.try_get("name")?,
        created_at: from_millis("created_at", row.try_get("created_at")?)?,
        last_seen_at: from_millis("last_seen_at", row.try_get("last_seen_at")?)?,
        tracked: row.try_get("tracked")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, RetentionStore) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("retention.db")).await.unwrap();
        (temp_dir, db.retention())
    }

    fn at(days: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::days(days)
    }

    async fn repo_in(store: &RetentionStore, org: &str, name: &str) -> (OrganizationId, RepositoryId) {
        let org_id = store.upsert_organization(org).await.unwrap().unwrap();
        let repo_id = store.upsert_repository(name, org_id, at(0)).await.unwrap().unwrap();
        (org_id, repo_id)
    }

    #[tokio::test]
    async fn test_upsert_organization_is_idempotent() {
        let (_dir, store) = setup().await;

        let first = store.upsert_organization("acme").await.unwrap();
        let second = store.upsert_organization("acme").await.unwrap();
        let other = store.upsert_organization("globex").await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn test_upsert_repository_refreshes_last_seen() {
        let (_dir, store) = setup().await;
        let org = store.upsert_organization("acme").await.unwrap().unwrap();

        let id = store.upsert_repository("widgets", org, at(0)).await.unwrap();
        let again = store.upsert_repository("widgets", org, at(3)).await.unwrap();
        assert_eq!(id, again);

        let repo = store.find_repository(org, "widgets").await.unwrap().unwrap();
        assert_eq!(repo.created_at, at(0));
        assert_eq!(repo.last_seen_at, at(3));
        assert_eq!(repo.full_name(), "acme/widgets");
    }

    #[tokio::test]
    async fn test_same_repository_name_in_two_organizations() {
        let (_dir, store) = setup().await;
        let (_, a) = repo_in(&store, "acme", "tools").await;
        let (_, b) = repo_in(&store, "globex", "tools").await;
        assert_ne!(a, b);
        assert_eq!(store.repositories().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_touch_unknown_repository_is_noop() {
        let (_dir, store) = setup().await;
        let touched = store.touch_repository(RepositoryId(42), at(1)).await.unwrap();
        assert!(!touched);
        assert!(store.repositories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_branch_refreshes_ordinary_but_not_abandoned() {
        let (_dir, store) = setup().await;
        let (_, repo) = repo_in(&store, "acme", "widgets").await;

        store.upsert_branch("main", repo, at(0), false, true).await.unwrap();
        store.upsert_branch("main", repo, at(5), false, true).await.unwrap();

        store
            .upsert_branch("main_abandoned_20231114_221320", repo, at(0), true, true)
            .await
            .unwrap();
        store
            .upsert_branch("main_abandoned_20231114_221320", repo, at(5), true, true)
            .await
            .unwrap();

        let branches = store.branches(repo).await.unwrap();
        assert_eq!(branches.len(), 2);

        let main = branches.iter().find(|b| !b.abandoned).unwrap();
        assert_eq!(main.created_at, at(0));
        assert_eq!(main.last_seen_at, at(5));

        let frozen = branches.iter().find(|b| b.abandoned).unwrap();
        assert_eq!(frozen.created_at, at(0));
        assert_eq!(frozen.last_seen_at, at(0));
    }

    #[tokio::test]
    async fn test_touch_branch_self_heals() {
        let (_dir, store) = setup().await;
        let (_, repo) = repo_in(&store, "acme", "widgets").await;

        store.touch_branch("develop", repo, at(2)).await.unwrap();

        let branches = store.branches(repo).await.unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].name, "develop");
        assert!(!branches[0].abandoned);
        assert!(branches[0].tracked);
        assert_eq!(branches[0].created_at, at(2));

        store.touch_branch("develop", repo, at(4)).await.unwrap();
        let branches = store.branches(repo).await.unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].last_seen_at, at(4));
    }

    #[tokio::test]
    async fn test_touch_branch_of_unknown_repository_is_noop() {
        let (_dir, store) = setup().await;
        store.touch_branch("main", RepositoryId(7), at(0)).await.unwrap();
        store.upsert_branch("main", RepositoryId(7), at(0), false, true).await.unwrap();
        assert!(store.branches(RepositoryId(7)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_branches_older_than_boundary_is_inclusive() {
        let (_dir, store) = setup().await;
        let (_, repo) = repo_in(&store, "acme", "widgets").await;
        store.upsert_branch("feature", repo, at(0), false, true).await.unwrap();

        let exactly = store.branches_older_than(30, false, at(30)).await.unwrap();
        assert_eq!(exactly.len(), 1);
        assert_eq!(exactly[0].branch, "feature");
        assert_eq!(exactly[0].repository_full_name(), "acme/widgets");

        let almost = at(29) + Duration::hours(23);
        assert!(store.branches_older_than(30, false, almost).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_branches_age_from_creation() {
        let (_dir, store) = setup().await;
        let (_, repo) = repo_in(&store, "acme", "widgets").await;

        store.upsert_branch("main_abandoned_x", repo, at(0), true, true).await.unwrap();
        store.upsert_branch("main", repo, at(0), false, true).await.unwrap();
        store.touch_branch("main", repo, at(20)).await.unwrap();

        let abandoned = store.branches_older_than(10, true, at(20)).await.unwrap();
        assert_eq!(abandoned.len(), 1);
        assert_eq!(abandoned[0].branch, "main_abandoned_x");

        let ordinary = store.branches_older_than(10, false, at(20)).await.unwrap();
        assert!(ordinary.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_threshold_returns_nothing() {
        let (_dir, store) = setup().await;
        let (_, repo) = repo_in(&store, "acme", "widgets").await;
        store.upsert_branch("old", repo, at(0), false, true).await.unwrap();

        assert!(store.branches_older_than(-1, false, at(1000)).await.unwrap().is_empty());
        assert!(store.repositories_older_than(-1, at(1000)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repositories_older_than() {
        let (_dir, store) = setup().await;
        let org = store.upsert_organization("acme").await.unwrap().unwrap();
        store.upsert_repository("stale", org, at(0)).await.unwrap();
        store.upsert_repository("fresh", org, at(0)).await.unwrap();
        store.upsert_repository("fresh", org, at(100)).await.unwrap();

        let old = store.repositories_older_than(90, at(100)).await.unwrap();
        assert_eq!(old.len(), 1);
        assert_eq!(old[0].name, "stale");
    }

    #[tokio::test]
    async fn test_delete_repository_cascades_only_its_branches() {
        let (_dir, store) = setup().await;
        let (org, doomed) = repo_in(&store, "acme", "doomed").await;
        let (_, kept) = repo_in(&store, "acme", "kept").await;

        store.upsert_branch("main", doomed, at(0), false, true).await.unwrap();
        store.upsert_branch("dev", doomed, at(0), false, true).await.unwrap();
        store.upsert_branch("main", kept, at(0), false, true).await.unwrap();

        let removed = store.delete_repository("doomed", org).await.unwrap();
        assert_eq!(removed, 1);

        assert!(store.branches(doomed).await.unwrap().is_empty());
        let survivors = store.branches(kept).await.unwrap();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].name, "main");
        assert!(store.find_repository(org, "doomed").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_branch() {
        let (_dir, store) = setup().await;
        let (_, repo) = repo_in(&store, "acme", "widgets").await;
        store.upsert_branch("topic", repo, at(0), false, true).await.unwrap();

        assert_eq!(store.delete_branch("topic", repo).await.unwrap(), 1);
        assert_eq!(store.delete_branch("topic", repo).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disabled_store_is_noop() {
        let store = RetentionStore::disabled();
        assert!(!store.is_enabled());
        assert!(store.upsert_organization("acme").await.unwrap().is_none());
        assert!(store
            .upsert_repository("widgets", OrganizationId(1), at(0))
            .await
            .unwrap()
            .is_none());
        assert!(!store.touch_repository(RepositoryId(1), at(0)).await.unwrap());
        store.touch_branch("main", RepositoryId(1), at(0)).await.unwrap();
        assert!(store.branches_older_than(0, false, at(0)).await.unwrap().is_empty());
        assert_eq!(store.delete_repository("widgets", OrganizationId(1)).await.unwrap(), 0);
    }
}
