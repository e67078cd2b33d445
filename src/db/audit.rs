//! Audit trail.
//!
//! Entries with no tenant are installation-level (tenant deletion, backup
//! import).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::tenant::UnknownVariant;
use crate::Result;

/// What an audit entry is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditCategory {
    Tenant,
    Auth,
    Rotation,
    Storage,
    Backup,
}

impl AuditCategory {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::Tenant => "tenant",
            AuditCategory::Auth => "auth",
            AuditCategory::Rotation => "rotation",
            AuditCategory::Storage => "storage",
            AuditCategory::Backup => "backup",
        }
    }
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditCategory {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "tenant" => Ok(AuditCategory::Tenant),
            "auth" => Ok(AuditCategory::Auth),
            "rotation" => Ok(AuditCategory::Rotation),
            "storage" => Ok(AuditCategory::Storage),
            "backup" => Ok(AuditCategory::Backup),
            _ => Err(UnknownVariant::new("audit category", s)),
        }
    }
}

impl TryFrom<String> for AuditCategory {
    type Error = UnknownVariant;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

/// One audit entry.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AuditLog {
    pub id: i64,
    pub tenant_id: Option<String>,
    #[sqlx(try_from = "String")]
    pub category: AuditCategory,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Repository for the audit trail.
pub struct AuditLogRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AuditLogRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append an entry stamped with the current time.
    pub async fn record(
        &self,
        tenant_id: Option<&str>,
        category: AuditCategory,
        message: &str,
    ) -> Result<()> {
        self.insert(tenant_id, category, message, Utc::now()).await
    }

    /// Append an entry with an explicit timestamp.
    pub async fn insert(
        &self,
        tenant_id: Option<&str>,
        category: AuditCategory,
        message: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_logs (tenant_id, category, message, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(tenant_id)
        .bind(category.as_str())
        .bind(message)
        .bind(created_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// List a tenant's entries, oldest first.
    pub async fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<AuditLog>> {
        let logs = sqlx::query_as::<_, AuditLog>(
            "SELECT id, tenant_id, category, message, created_at
             FROM audit_logs WHERE tenant_id = ? ORDER BY id",
        )
        .bind(tenant_id)
        .fetch_all(self.pool)
        .await?;
        Ok(logs)
    }

    /// List installation-level entries, oldest first.
    pub async fn list_installation(&self) -> Result<Vec<AuditLog>> {
        let logs = sqlx::query_as::<_, AuditLog>(
            "SELECT id, tenant_id, category, message, created_at
             FROM audit_logs WHERE tenant_id IS NULL ORDER BY id",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(logs)
    }

    /// List every entry, for export.
    pub async fn list_all(&self) -> Result<Vec<AuditLog>> {
        let logs = sqlx::query_as::<_, AuditLog>(
            "SELECT id, tenant_id, category, message, created_at FROM audit_logs ORDER BY id",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn test_category_parse() {
        assert_eq!(
            "rotation".parse::<AuditCategory>().unwrap(),
            AuditCategory::Rotation
        );
        assert!("login".parse::<AuditCategory>().is_err());
    }

    #[tokio::test]
    async fn test_record_and_list() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = AuditLogRepository::new(db.pool());

        repo.record(Some("alice"), AuditCategory::Auth, "password changed")
            .await
            .unwrap();
        repo.record(None, AuditCategory::Tenant, "tenant bob deleted")
            .await
            .unwrap();

        let alice = repo.list_by_tenant("alice").await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].category, AuditCategory::Auth);

        let installation = repo.list_installation().await.unwrap();
        assert_eq!(installation.len(), 1);
        assert!(installation[0].tenant_id.is_none());

        assert_eq!(repo.list_all().await.unwrap().len(), 2);
    }
}
