//! Files and pastebins.
//!
//! Both kinds share one row shape and live in separate tables; every query
//! here is parameterized by [`ResourceKind`].

use std::fmt;

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, SqlitePool};

use crate::Result;

/// The two blob-backed resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    File,
    Pastebin,
}

impl ResourceKind {
    /// All kinds, in rotation and reconciliation order.
    pub const ALL: [ResourceKind; 2] = [ResourceKind::File, ResourceKind::Pastebin];

    /// Database table holding rows of this kind.
    pub fn table(&self) -> &'static str {
        match self {
            ResourceKind::File => "files",
            ResourceKind::Pastebin => "pastebins",
        }
    }

    /// Short name used in logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::File => "file",
            ResourceKind::Pastebin => "pastebin",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored file or pastebin.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Resource {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    /// Size in bytes.
    pub size: i64,
    /// Access password, sealed under the master key.
    pub password: Option<String>,
    pub public: bool,
    pub views: i64,
    pub created_at: DateTime<Utc>,
}

impl Resource {
    /// Whether the resource is password protected.
    pub fn is_protected(&self) -> bool {
        self.password.is_some()
    }
}

/// Data for creating a resource row.
#[derive(Debug, Clone)]
pub struct NewResource {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub size: i64,
    pub password: Option<String>,
    pub public: bool,
    pub views: i64,
    pub created_at: DateTime<Utc>,
}

impl NewResource {
    /// Create a public, unprotected resource.
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        name: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            name: name.into(),
            size: size as i64,
            password: None,
            public: true,
            views: 0,
            created_at: Utc::now(),
        }
    }

    /// Set the sealed password.
    pub fn with_password(mut self, sealed: impl Into<String>) -> Self {
        self.password = Some(sealed.into());
        self
    }
}

impl From<Resource> for NewResource {
    fn from(r: Resource) -> Self {
        Self {
            id: r.id,
            tenant_id: r.tenant_id,
            name: r.name,
            size: r.size,
            password: r.password,
            public: r.public,
            views: r.views,
            created_at: r.created_at,
        }
    }
}

const RESOURCE_COLUMNS: &str = "id, tenant_id, name, size, password, public, views, created_at";

/// Repository for one kind of resource.
pub struct ResourceRepository<'a> {
    pool: &'a SqlitePool,
    kind: ResourceKind,
}

impl<'a> ResourceRepository<'a> {
    /// Create a repository over the table for `kind`.
    pub fn new(pool: &'a SqlitePool, kind: ResourceKind) -> Self {
        Self { pool, kind }
    }

    /// Resource kind this repository serves.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Insert a resource row.
    pub async fn create(&self, new: &NewResource) -> Result<Resource> {
        let sql = format!(
            "INSERT INTO {} ({RESOURCE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            self.kind.table()
        );
        sqlx::query(&sql)
            .bind(&new.id)
            .bind(&new.tenant_id)
            .bind(&new.name)
            .bind(new.size)
            .bind(&new.password)
            .bind(new.public)
            .bind(new.views)
            .bind(new.created_at)
            .execute(self.pool)
            .await?;

        Ok(Resource {
            id: new.id.clone(),
            tenant_id: new.tenant_id.clone(),
            name: new.name.clone(),
            size: new.size,
            password: new.password.clone(),
            public: new.public,
            views: new.views,
            created_at: new.created_at,
        })
    }

    /// Get one resource of a tenant.
    pub async fn get(&self, tenant_id: &str, id: &str) -> Result<Option<Resource>> {
        let sql = format!(
            "SELECT {RESOURCE_COLUMNS} FROM {} WHERE tenant_id = ? AND id = ?",
            self.kind.table()
        );
        let resource = sqlx::query_as::<_, Resource>(&sql)
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(resource)
    }

    /// List a tenant's resources ordered by id.
    pub async fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<Resource>> {
        let sql = format!(
            "SELECT {RESOURCE_COLUMNS} FROM {} WHERE tenant_id = ? ORDER BY id",
            self.kind.table()
        );
        let resources = sqlx::query_as::<_, Resource>(&sql)
            .bind(tenant_id)
            .fetch_all(self.pool)
            .await?;
        Ok(resources)
    }

    /// List a tenant's resource ids.
    pub async fn list_ids(&self, tenant_id: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT id FROM {} WHERE tenant_id = ? ORDER BY id",
            self.kind.table()
        );
        let ids: Vec<String> = sqlx::query_scalar(&sql)
            .bind(tenant_id)
            .fetch_all(self.pool)
            .await?;
        Ok(ids)
    }

    /// List a tenant's password-protected resources ordered by id.
    pub async fn list_protected(&self, tenant_id: &str) -> Result<Vec<Resource>> {
        let sql = format!(
            "SELECT {RESOURCE_COLUMNS} FROM {} WHERE tenant_id = ? AND password IS NOT NULL ORDER BY id",
            self.kind.table()
        );
        let resources = sqlx::query_as::<_, Resource>(&sql)
            .bind(tenant_id)
            .fetch_all(self.pool)
            .await?;
        Ok(resources)
    }

    /// List every resource of this kind, for export.
    pub async fn list_all(&self) -> Result<Vec<Resource>> {
        let sql = format!(
            "SELECT {RESOURCE_COLUMNS} FROM {} ORDER BY tenant_id, id",
            self.kind.table()
        );
        let resources = sqlx::query_as::<_, Resource>(&sql)
            .fetch_all(self.pool)
            .await?;
        Ok(resources)
    }

    /// Replace the sealed password of one resource.
    pub async fn set_password(
        &self,
        tenant_id: &str,
        id: &str,
        sealed: Option<&str>,
    ) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET password = ? WHERE tenant_id = ? AND id = ?",
            self.kind.table()
        );
        let result = sqlx::query(&sql)
            .bind(sealed)
            .bind(tenant_id)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete the given ids of a tenant.
    ///
    /// Returns the number of rows removed.
    pub async fn delete_ids(&self, tenant_id: &str, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("DELETE FROM ");
        query.push(self.kind.table());
        query.push(" WHERE tenant_id = ");
        query.push_bind(tenant_id);
        query.push(" AND id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let result = query.build().execute(self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, NewTenant, TenantRepository};

    async fn setup_db() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        TenantRepository::new(db.pool())
            .create(&NewTenant::new("alice"), "p1")
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let db = setup_db().await;
        let repo = ResourceRepository::new(db.pool(), ResourceKind::File);

        repo.create(&NewResource::new("b", "alice", "b.png", 10))
            .await
            .unwrap();
        repo.create(&NewResource::new("a", "alice", "a.png", 5).with_password("sealed"))
            .await
            .unwrap();

        let listed = repo.list_by_tenant("alice").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "a");
        assert!(listed[0].is_protected());
        assert_eq!(repo.list_ids("alice").await.unwrap(), vec!["a", "b"]);
        assert_eq!(repo.list_protected("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_kinds_are_separate() {
        let db = setup_db().await;
        let files = ResourceRepository::new(db.pool(), ResourceKind::File);
        let pastes = ResourceRepository::new(db.pool(), ResourceKind::Pastebin);

        files
            .create(&NewResource::new("x", "alice", "x.txt", 1))
            .await
            .unwrap();

        assert_eq!(files.list_ids("alice").await.unwrap(), vec!["x"]);
        assert!(pastes.list_ids("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resource_requires_tenant() {
        let db = setup_db().await;
        let repo = ResourceRepository::new(db.pool(), ResourceKind::File);

        let result = repo
            .create(&NewResource::new("x", "ghost", "x.txt", 1))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_set_password() {
        let db = setup_db().await;
        let repo = ResourceRepository::new(db.pool(), ResourceKind::Pastebin);
        repo.create(&NewResource::new("p", "alice", "p.txt", 3))
            .await
            .unwrap();

        assert!(repo.set_password("alice", "p", Some("s")).await.unwrap());
        let fetched = repo.get("alice", "p").await.unwrap().unwrap();
        assert_eq!(fetched.password.as_deref(), Some("s"));
        assert!(!repo.set_password("alice", "missing", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_ids() {
        let db = setup_db().await;
        let repo = ResourceRepository::new(db.pool(), ResourceKind::File);
        for id in ["1", "2", "3"] {
            repo.create(&NewResource::new(id, "alice", id, 1))
                .await
                .unwrap();
        }

        let removed = repo
            .delete_ids("alice", &["1".to_string(), "3".to_string(), "9".to_string()])
            .await
            .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(repo.list_ids("alice").await.unwrap(), vec!["2"]);
        assert_eq!(repo.delete_ids("alice", &[]).await.unwrap(), 0);
    }
}
