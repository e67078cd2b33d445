//! API token repository.
//!
//! Only the SHA-256 digest of a token is stored.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::Result;

/// API token entity.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ApiToken {
    /// Token ID.
    pub id: i64,
    /// Owning tenant.
    pub tenant_id: String,
    /// Label chosen at creation.
    pub name: String,
    /// SHA-256 hex digest of the plaintext token.
    pub token_hash: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Repository for API token operations.
pub struct ApiTokenRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ApiTokenRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a token digest.
    pub async fn create(
        &self,
        tenant_id: &str,
        name: &str,
        token_hash: &str,
        created_at: DateTime<Utc>,
    ) -> Result<ApiToken> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO api_tokens (tenant_id, name, token_hash, created_at)
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(tenant_id)
        .bind(name)
        .bind(token_hash)
        .bind(created_at)
        .fetch_one(self.pool)
        .await?;

        Ok(ApiToken {
            id,
            tenant_id: tenant_id.to_string(),
            name: name.to_string(),
            token_hash: token_hash.to_string(),
            created_at,
        })
    }

    /// Find a token by digest.
    pub async fn get_by_hash(&self, token_hash: &str) -> Result<Option<ApiToken>> {
        let token = sqlx::query_as::<_, ApiToken>(
            "SELECT id, tenant_id, name, token_hash, created_at
             FROM api_tokens WHERE token_hash = ?",
        )
        .bind(token_hash)
        .fetch_optional(self.pool)
        .await?;
        Ok(token)
    }

    /// List a tenant's tokens.
    pub async fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<ApiToken>> {
        let tokens = sqlx::query_as::<_, ApiToken>(
            "SELECT id, tenant_id, name, token_hash, created_at
             FROM api_tokens WHERE tenant_id = ? ORDER BY id",
        )
        .bind(tenant_id)
        .fetch_all(self.pool)
        .await?;
        Ok(tokens)
    }

    /// Delete all of a tenant's tokens.
    pub async fn delete_by_tenant(&self, tenant_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM api_tokens WHERE tenant_id = ?")
            .bind(tenant_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
