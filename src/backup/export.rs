//! Installation export in the current manifest format.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use super::manifest::{
    AuditEntry, InviteEntry, ManifestDocument, ResourceEntry, ShortUrlEntry, TokenEntry,
    UserEntry, CURRENT_VERSION,
};
use super::MANIFEST_FILE;
use crate::crypto::MasterKey;
use crate::db::{
    ApiTokenRepository, AuditCategory, AuditLogRepository, InviteRepository, Resource,
    ResourceKind, ResourceRepository, ShortUrlRepository, SignupDomainRepository,
    TenantRepository,
};
use crate::storage::{copy_dir, remove_dir_if_exists, DataPaths, FILES_DIR, PASTEBINS_DIR};
use crate::Result;

/// Writes an archive directory the importer accepts.
pub struct BackupExporter<'a> {
    pool: &'a SqlitePool,
    paths: &'a DataPaths,
    key: &'a MasterKey,
}

impl<'a> BackupExporter<'a> {
    pub fn new(pool: &'a SqlitePool, paths: &'a DataPaths, key: &'a MasterKey) -> Self {
        Self { pool, paths, key }
    }

    /// Build the manifest document from the database.
    pub async fn document(&self) -> Result<ManifestDocument> {
        let mut tokens: HashMap<String, Vec<TokenEntry>> = HashMap::new();
        let tenants = TenantRepository::new(self.pool).list_all().await?;
        let token_repo = ApiTokenRepository::new(self.pool);
        for tenant in &tenants {
            let entries = token_repo
                .list_by_tenant(&tenant.id)
                .await?
                .into_iter()
                .map(|t| TokenEntry {
                    name: t.name,
                    token_hash: t.token_hash,
                    created_at: t.created_at,
                })
                .collect();
            tokens.insert(tenant.id.clone(), entries);
        }

        let users = tenants
            .into_iter()
            .map(|t| UserEntry {
                api_tokens: tokens.remove(&t.id).unwrap_or_default(),
                id: t.id,
                path_id: t.path_id,
                created_at: t.created_at,
                disabled: t.disabled,
                storage_quota: t.storage_quota,
                upload_limit: t.upload_limit,
                extensions: t.extensions.0,
                extension_mode: t.extension_mode.to_string(),
                name_strategy: t.name_strategy.to_string(),
                embed_color: t.embed_color,
                audit_retention_days: t.audit_retention_days,
                auth_secret: t.auth_secret,
                backup_codes: t.backup_codes.0,
            })
            .collect();

        let files = self.resources(ResourceKind::File).await?;
        let pastebins = self.resources(ResourceKind::Pastebin).await?;

        let short_urls = ShortUrlRepository::new(self.pool)
            .list_all()
            .await?
            .into_iter()
            .map(|u| ShortUrlEntry {
                id: u.id,
                tenant_id: u.tenant_id,
                target: u.target,
                visits: u.visits,
                created_at: u.created_at,
            })
            .collect();

        let audit_logs = AuditLogRepository::new(self.pool)
            .list_all()
            .await?
            .into_iter()
            .map(|l| AuditEntry {
                tenant_id: l.tenant_id,
                category: l.category.to_string(),
                message: l.message,
                created_at: l.created_at,
            })
            .collect();

        let invites = InviteRepository::new(self.pool)
            .list_all()
            .await?
            .into_iter()
            .map(|i| InviteEntry {
                code: i.code,
                created_by: i.created_by,
                expires_at: i.expires_at,
                used: i.used,
            })
            .collect();

        Ok(ManifestDocument {
            version: CURRENT_VERSION.to_string(),
            master_key_fingerprint: self.key.fingerprint().to_string(),
            exported_at: Utc::now(),
            users,
            files,
            pastebins,
            short_urls,
            audit_logs,
            invites,
            signup_domains: SignupDomainRepository::new(self.pool).list_all().await?,
        })
    }

    async fn resources(&self, kind: ResourceKind) -> Result<Vec<ResourceEntry>> {
        let rows = ResourceRepository::new(self.pool, kind).list_all().await?;
        Ok(rows.into_iter().map(resource_entry).collect())
    }

    /// Write `manifest.json` and both blob trees into `dir`.
    ///
    /// `dir` is created if needed; existing `files/` and `paste-bins/`
    /// inside it are replaced.
    pub async fn export(&self, dir: &Path) -> Result<ManifestDocument> {
        let document = self.document().await?;

        tokio::fs::create_dir_all(dir).await?;
        let json = serde_json::to_string_pretty(&document)?;
        tokio::fs::write(dir.join(MANIFEST_FILE), json).await?;

        for (source, name) in [
            (self.paths.files_root(), FILES_DIR),
            (self.paths.pastebin_root(), PASTEBINS_DIR),
        ] {
            let target = dir.join(name);
            remove_dir_if_exists(&target).await?;
            if tokio::fs::try_exists(&source).await? {
                copy_dir(&source, &target).await?;
            } else {
                tokio::fs::create_dir_all(&target).await?;
            }
        }

        let message = format!(
            "backup exported to {}: {} tenant(s), {} file(s), {} pastebin(s)",
            dir.display(),
            document.users.len(),
            document.files.len(),
            document.pastebins.len()
        );
        AuditLogRepository::new(self.pool)
            .record(None, AuditCategory::Backup, &message)
            .await?;
        info!("{}", message);

        Ok(document)
    }
}

fn resource_entry(r: Resource) -> ResourceEntry {
    ResourceEntry {
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
