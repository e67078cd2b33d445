//! Short URL rows.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::Result;

/// A shortened link owned by a tenant.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ShortUrl {
    pub id: String,
    pub tenant_id: String,
    pub target: String,
    pub visits: i64,
    pub created_at: DateTime<Utc>,
}

/// Data for creating a short URL.
#[derive(Debug, Clone)]
pub struct NewShortUrl {
    pub id: String,
    pub tenant_id: String,
    pub target: String,
    pub visits: i64,
    pub created_at: DateTime<Utc>,
}

impl NewShortUrl {
    /// Create a short URL with no visits yet.
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            target: target.into(),
            visits: 0,
            created_at: Utc::now(),
        }
    }
}

/// Repository for short URL operations.
pub struct ShortUrlRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ShortUrlRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a short URL.
    pub async fn create(&self, new: &NewShortUrl) -> Result<()> {
        sqlx::query(
            "INSERT INTO short_urls (id, tenant_id, target, visits, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&new.id)
        .bind(&new.tenant_id)
        .bind(&new.target)
        .bind(new.visits)
        .bind(new.created_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// List a tenant's short URLs.
    pub async fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<ShortUrl>> {
        let urls = sqlx::query_as::<_, ShortUrl>(
            "SELECT id, tenant_id, target, visits, created_at
             FROM short_urls WHERE tenant_id = ? ORDER BY id",
        )
        .bind(tenant_id)
        .fetch_all(self.pool)
        .await?;
        Ok(urls)
    }

    /// List every short URL, for export.
    pub async fn list_all(&self) -> Result<Vec<ShortUrl>> {
        let urls = sqlx::query_as::<_, ShortUrl>(
            "SELECT id, tenant_id, target, visits, created_at
             FROM short_urls ORDER BY tenant_id, id",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(urls)
    }
}
