//! Tenant repository for hoard.
//!
//! This module provides CRUD operations for tenants in the database.

use chrono::Utc;
use sqlx::types::Json;
use sqlx::{QueryBuilder, SqlitePool};

use super::tenant::{NewTenant, TenantRecord, TenantUpdate};
use crate::{HoardError, Result};

const TENANT_COLUMNS: &str = "id, path_id, created_at, disabled, storage_quota, upload_limit,
    extensions, extension_mode, name_strategy, embed_color, audit_retention_days,
    auth_secret, backup_codes";

/// Tables whose rows belong to a tenant, children of `tenants`.
pub(crate) const OWNED_TABLES: &[&str] = &["api_tokens", "files", "pastebins", "short_urls"];

/// Repository for tenant CRUD operations.
pub struct TenantRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TenantRepository<'a> {
    /// Create a new TenantRepository with the given database pool reference.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a tenant under the given private path id.
    ///
    /// Returns `Conflict` if the id is already taken.
    pub async fn create(&self, new_tenant: &NewTenant, path_id: &str) -> Result<TenantRecord> {
        if self.exists(&new_tenant.id).await? {
            return Err(HoardError::Conflict(new_tenant.id.clone()));
        }

        sqlx::query(
            "INSERT INTO tenants (id, path_id, created_at, storage_quota, upload_limit, extensions,
                                  extension_mode, name_strategy, embed_color, audit_retention_days)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new_tenant.id)
        .bind(path_id)
        .bind(Utc::now())
        .bind(new_tenant.storage_quota)
        .bind(new_tenant.upload_limit)
        .bind(Json(&new_tenant.extensions))
        .bind(new_tenant.extension_mode.as_str())
        .bind(new_tenant.name_strategy.as_str())
        .bind(&new_tenant.embed_color)
        .bind(new_tenant.audit_retention_days)
        .execute(self.pool)
        .await?;

        self.get(&new_tenant.id)
            .await?
            .ok_or_else(|| HoardError::NotFound(format!("tenant {}", new_tenant.id)))
    }

    /// Get a tenant by id.
    pub async fn get(&self, id: &str) -> Result<Option<TenantRecord>> {
        let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = ?");
        let tenant = sqlx::query_as::<_, TenantRecord>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(tenant)
    }

    /// Check whether a tenant id is taken.
    pub async fn exists(&self, id: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tenants WHERE id = ?)")
            .bind(id)
            .fetch_one(self.pool)
            .await?;
        Ok(exists)
    }

    /// List all tenants ordered by id.
    pub async fn list_all(&self) -> Result<Vec<TenantRecord>> {
        let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants ORDER BY id");
        let tenants = sqlx::query_as::<_, TenantRecord>(&sql)
            .fetch_all(self.pool)
            .await?;
        Ok(tenants)
    }

    /// Update a tenant by id.
    ///
    /// Only fields that are set in the update will be modified.
    /// Returns the updated tenant, or None if not found.
    pub async fn update(&self, id: &str, update: &TenantUpdate) -> Result<Option<TenantRecord>> {
        if update.is_empty() {
            return self.get(id).await;
        }

        let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE tenants SET ");
        let mut separated = query.separated(", ");

        if let Some(disabled) = update.disabled {
            separated.push("disabled = ");
            separated.push_bind_unseparated(disabled);
        }
        if let Some(quota) = update.storage_quota {
            separated.push("storage_quota = ");
            separated.push_bind_unseparated(quota);
        }
        if let Some(limit) = update.upload_limit {
            separated.push("upload_limit = ");
            separated.push_bind_unseparated(limit);
        }
        if let Some(ref extensions) = update.extensions {
            separated.push("extensions = ");
            separated.push_bind_unseparated(Json(extensions.clone()));
        }
        if let Some(mode) = update.extension_mode {
            separated.push("extension_mode = ");
            separated.push_bind_unseparated(mode.as_str());
        }
        if let Some(strategy) = update.name_strategy {
            separated.push("name_strategy = ");
            separated.push_bind_unseparated(strategy.as_str());
        }
        if let Some(ref color) = update.embed_color {
            separated.push("embed_color = ");
            separated.push_bind_unseparated(color.clone());
        }
        if let Some(days) = update.audit_retention_days {
            separated.push("audit_retention_days = ");
            separated.push_bind_unseparated(days);
        }

        query.push(" WHERE id = ");
        query.push_bind(id);

        let result = query.build().execute(self.pool).await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get(id).await
    }

    /// Replace the sealed auth secret.
    pub async fn set_auth_secret(&self, id: &str, secret: Option<&str>) -> Result<bool> {
        let result = sqlx::query("UPDATE tenants SET auth_secret = ? WHERE id = ?")
            .bind(secret)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the stored backup code digests.
    pub async fn set_backup_codes(&self, id: &str, digests: &[String]) -> Result<bool> {
        let result = sqlx::query("UPDATE tenants SET backup_codes = ? WHERE id = ?")
            .bind(Json(digests))
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Clear the auth secret and backup codes.
    pub async fn clear_credentials(&self, id: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE tenants SET auth_secret = NULL, backup_codes = '[]' WHERE id = ?")
                .bind(id)
                .execute(self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop everything a tenant owns and re-create its row with default settings.
    ///
    /// The id and `path_id` are kept. Audit entries survive.
    pub async fn reset(&self, id: &str) -> Result<Option<TenantRecord>> {
        let Some(existing) = self.get(id).await? else {
            return Ok(None);
        };

        let defaults = NewTenant::new(id);
        let mut tx = self.pool.begin().await?;

        for table in OWNED_TABLES {
            sqlx::query(&format!("DELETE FROM {table} WHERE tenant_id = ?"))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM tenants WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO tenants (id, path_id, created_at, storage_quota, upload_limit, extensions,
                                  extension_mode, name_strategy, embed_color, audit_retention_days)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&existing.path_id)
        .bind(Utc::now())
        .bind(defaults.storage_quota)
        .bind(defaults.upload_limit)
        .bind(Json(&defaults.extensions))
        .bind(defaults.extension_mode.as_str())
        .bind(defaults.name_strategy.as_str())
        .bind(&defaults.embed_color)
        .bind(defaults.audit_retention_days)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get(id).await
    }

    /// Delete a tenant, every row it owns and its audit trail.
    ///
    /// Returns true if a tenant was deleted, false if not found.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        for table in OWNED_TABLES.iter().chain(["audit_logs"].iter()) {
            sqlx::query(&format!("DELETE FROM {table} WHERE tenant_id = ?"))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        let result = sqlx::query("DELETE FROM tenants WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count tenants.
    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tenants")
            .fetch_one(self.pool)
            .await?;
        Ok(count.0)
    }
}
