//! Retention records and their identities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Primary key of an organization row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct OrganizationId(pub i64);

/// Primary key of a repository row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct RepositoryId(pub i64);

/// A repository as recorded by the tracker
#[derive(Debug, Clone, Serialize)]
pub struct TrackedRepository {
    pub id: RepositoryId,
    pub organization_id: OrganizationId,
    /// Organization login
    pub organization: String,
    /// Repository name within the organization
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub tracked: bool,
}

impl TrackedRepository {
    /// `organization/name`, matching the remote's full name and the clone's
    /// relative path under the backup root
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.organization, self.name)
    }
}

/// A branch as recorded by the tracker
#[derive(Debug, Clone, Serialize)]
pub struct TrackedBranch {
    pub repository_id: RepositoryId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub abandoned: bool,
    pub tracked: bool,
}

/// A branch returned by an age query, with enough context to locate the clone
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleBranch {
    pub branch: String,
    pub repository_id: RepositoryId,
    pub repository: String,
    pub organization: String,
}

impl StaleBranch {
    pub fn repository_full_name(&self) -> String {
        format!("{}/{}", self.organization, self.repository)
    }
}

/// Convert a stored epoch-millisecond value into a UTC timestamp
pub(crate) fn from_millis(column: &'static str, value: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value).ok_or(Error::InvalidTimestamp { column, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_millis_roundtrips_epoch() {
        let now = DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap();
        assert_eq!(from_millis("created_at", now.timestamp_millis()).unwrap(), now);
    }

    #[test]
    fn test_full_names() {
        let stale = StaleBranch {
            branch: "main".to_string(),
            repository_id: RepositoryId(1),
            repository: "widgets".to_string(),
            organization: "acme".to_string(),
        };
        assert_eq!(stale.repository_full_name(), "acme/widgets");
    }
}
