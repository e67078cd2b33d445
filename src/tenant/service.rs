//! Tenant lifecycle service.
//!
//! This module provides [`TenantService`], which owns every tenant's
//! in-memory handle and provides:
//! - create, update, reset, reset-auth and delete
//! - credential helpers (password, TOTP seed, backup codes, API tokens)
//! - credential rotation between master keys
//! - backup import and export
//! - storage usage and quota checks
//!
//! Every mutator except create and delete refuses to run on a disabled
//! tenant. Re-enabling goes through [`TenantService::update_tenant`] with a
//! patch that sets `disabled`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use super::{CredentialRotator, RotationCheckpoint, RotationReport, TenantHandle, TenantState};
use crate::auth::codes::{
    digest, generate_api_token, generate_backup_codes, generate_totp_seed, normalize_code,
};
use crate::auth::{hash_password, verify_password, AuthMode, PasswordError};
use crate::backup::{BackupExporter, BackupImporter, ImportSummary};
use crate::config::{Config, ScheduleConfig};
use crate::crypto::MasterKey;
use crate::db::{
    ApiToken, ApiTokenRepository, AuditCategory, AuditLogRepository, Database, NewTenant,
    TenantRecord, TenantRepository, TenantUpdate,
};
use crate::scheduler::Scheduler;
use crate::storage::DataPaths;
use crate::{HoardError, Result};

type Registry = HashMap<String, Arc<TenantHandle>>;

/// Options for [`TenantService::update_tenant`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Record the change in the tenant's audit trail.
    pub audit: bool,
}

impl UpdateOptions {
    /// Options that write an audit entry.
    pub fn audited() -> Self {
        Self { audit: true }
    }
}

/// Owns the tenants of one installation.
pub struct TenantService {
    db: Database,
    paths: DataPaths,
    key: MasterKey,
    auth_mode: AuthMode,
    schedule: ScheduleConfig,
    scheduler: Arc<dyn Scheduler>,
    tenants: RwLock<Registry>,
}

impl TenantService {
    /// Create a service with default auth mode and job intervals.
    ///
    /// Call [`hydrate`](Self::hydrate) to load existing tenants.
    pub fn new(
        db: Database,
        paths: DataPaths,
        key: MasterKey,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            db,
            paths,
            key,
            auth_mode: AuthMode::default(),
            schedule: ScheduleConfig::default(),
            scheduler,
            tenants: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_auth_mode(mut self, auth_mode: AuthMode) -> Self {
        self.auth_mode = auth_mode;
        self
    }

    /// Use other job intervals. Zero intervals are rejected.
    pub fn with_schedule(mut self, schedule: ScheduleConfig) -> Result<Self> {
        schedule.validate()?;
        self.schedule = schedule;
        Ok(self)
    }

    /// Open the configured database and build a service over it.
    pub async fn from_config(config: &Config, scheduler: Arc<dyn Scheduler>) -> Result<Self> {
        let db = Database::open(&config.database.path).await?;
        let key = config.encryption.master_key()?;
        Self::new(
            db,
            DataPaths::new(&config.storage.data_root),
            key,
            scheduler,
        )
        .with_auth_mode(config.auth.mode)
        .with_schedule(config.schedule.clone())
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    pub fn master_key(&self) -> &MasterKey {
        &self.key
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.auth_mode
    }

    /// Load every tenant from the database and start its jobs.
    ///
    /// Replaces whatever was loaded before. Returns the number of tenants.
    pub async fn hydrate(&self) -> Result<usize> {
        let mut tenants = self.tenants.write().await;
        self.stop_locked(&tenants).await;
        let count = self.load_locked(&mut tenants).await?;
        info!("Hydrated {} tenant(s)", count);
        Ok(count)
    }

    /// Stop every tenant's jobs.
    pub async fn stop_all(&self) {
        let tenants = self.tenants.read().await;
        self.stop_locked(&tenants).await;
    }

    async fn stop_locked(&self, tenants: &Registry) {
        for id in tenants.keys() {
            self.scheduler.stop(id).await;
        }
    }

    /// Rebuild the registry from the database. Schedules must be stopped.
    async fn load_locked(&self, tenants: &mut Registry) -> Result<usize> {
        let records = TenantRepository::new(self.db.pool()).list_all().await?;

        let previous = std::mem::take(tenants);
        for (id, handle) in &previous {
            if !records.iter().any(|r| &r.id == id) {
                handle.mark_deleted();
            }
        }

        for record in records {
            let paths = self.paths.tenant(&record.path_id);
            paths.ensure().await?;
            let handle = Arc::new(TenantHandle::new(record, paths));
            self.start_jobs(&handle).await;
            tenants.insert(handle.id().to_string(), handle);
        }
        Ok(tenants.len())
    }

    async fn start_jobs(&self, handle: &TenantHandle) {
        let jobs = handle.jobs(self.db.pool(), &self.schedule);
        self.scheduler.start(handle.id(), jobs).await;
    }

    /// Live handle of a tenant.
    pub async fn handle(&self, id: &str) -> Result<Arc<TenantHandle>> {
        self.tenants
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    /// Handle of a tenant that must not be disabled.
    async fn active_handle(&self, id: &str) -> Result<Arc<TenantHandle>> {
        let handle = self.handle(id).await?;
        handle.ensure_active()?;
        Ok(handle)
    }

    /// Re-read a tenant's row into its handle.
    async fn refresh(&self, handle: &TenantHandle) -> Result<TenantRecord> {
        let record = TenantRepository::new(self.db.pool())
            .get(handle.id())
            .await?
            .ok_or_else(|| not_found(handle.id()))?;
        handle.replace(record.clone());
        Ok(record)
    }

    async fn audit(
        &self,
        tenant_id: Option<&str>,
        category: AuditCategory,
        message: &str,
    ) -> Result<()> {
        AuditLogRepository::new(self.db.pool())
            .record(tenant_id, category, message)
            .await
    }

    fn require_mode(&self, expected: AuthMode) -> Result<()> {
        if self.auth_mode == expected {
            Ok(())
        } else {
            Err(HoardError::Validation(format!(
                "operation requires {:?} auth mode, installation uses {:?}",
                expected, self.auth_mode
            )))
        }
    }

    /// Create a tenant, its directories and its jobs.
    pub async fn create_tenant(&self, new_tenant: NewTenant) -> Result<TenantRecord> {
        new_tenant.validate().map_err(HoardError::Validation)?;

        let path_id = Uuid::new_v4().to_string();
        let repo = TenantRepository::new(self.db.pool());

        let mut tenants = self.tenants.write().await;
        let record = repo.create(&new_tenant, &path_id).await?;

        let paths = self.paths.tenant(&path_id);
        if let Err(e) = paths.ensure().await {
            warn!(
                "could not create directories for tenant {}: {}",
                record.id, e
            );
            repo.delete(&record.id).await?;
            return Err(e.into());
        }

        let handle = Arc::new(TenantHandle::new(record.clone(), paths));
        self.start_jobs(&handle).await;
        tenants.insert(record.id.clone(), handle);
        drop(tenants);

        self.audit(Some(&record.id), AuditCategory::Tenant, "tenant created")
            .await?;
        info!("Created tenant {} (path {})", record.id, path_id);
        Ok(record)
    }

    /// Current row of a tenant.
    pub async fn get_tenant(&self, id: &str) -> Result<TenantRecord> {
        Ok(self.handle(id).await?.record())
    }

    pub async fn tenant_state(&self, id: &str) -> Result<TenantState> {
        Ok(self.handle(id).await?.state())
    }

    /// Every tenant, ordered by id.
    pub async fn list_tenants(&self) -> Vec<TenantRecord> {
        let mut records: Vec<TenantRecord> = self
            .tenants
            .read()
            .await
            .values()
            .map(|h| h.record())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Apply a partial update and re-read the persisted row.
    ///
    /// A disabled tenant only accepts patches that set `disabled`.
    pub async fn update_tenant(
        &self,
        id: &str,
        update: &TenantUpdate,
        options: UpdateOptions,
    ) -> Result<TenantRecord> {
        let handle = self.handle(id).await?;
        if !update.touches_disabled() {
            handle.ensure_active()?;
        }
        update.validate().map_err(HoardError::Validation)?;

        let record = TenantRepository::new(self.db.pool())
            .update(id, update)
            .await?
            .ok_or_else(|| not_found(id))?;
        handle.replace(record.clone());

        if options.audit {
            self.audit(Some(id), AuditCategory::Tenant, &describe_update(update))
                .await?;
        }
        match update.disabled {
            Some(true) => info!("Tenant {} disabled", id),
            Some(false) => info!("Tenant {} enabled", id),
            None => info!("Tenant {} updated", id),
        }
        Ok(record)
    }

    /// Drop everything a tenant owns and restore default settings.
    ///
    /// The id and directories are kept; the jobs are restarted afterwards.
    pub async fn reset_tenant(&self, id: &str) -> Result<()> {
        let handle = self.active_handle(id).await?;

        self.scheduler.stop(id).await;
        let result = self.reset_stopped(&handle).await;
        self.start_jobs(&handle).await;
        result?;

        self.audit(Some(id), AuditCategory::Tenant, "tenant reset")
            .await?;
        info!("Reset tenant {}", id);
        Ok(())
    }

    async fn reset_stopped(&self, handle: &TenantHandle) -> Result<()> {
        handle.paths().clear().await?;
        let record = TenantRepository::new(self.db.pool())
            .reset(handle.id())
            .await?
            .ok_or_else(|| not_found(handle.id()))?;
        handle.replace(record);
        handle.snapshot().store(0, Utc::now());
        Ok(())
    }

    /// Clear the auth secret and backup codes.
    pub async fn reset_auth(&self, id: &str) -> Result<()> {
        let handle = self.active_handle(id).await?;

        TenantRepository::new(self.db.pool())
            .clear_credentials(id)
            .await?;
        self.refresh(&handle).await?;

        self.audit(Some(id), AuditCategory::Auth, "credentials reset")
            .await?;
        info!("Reset credentials of tenant {}", id);
        Ok(())
    }

    /// Delete a tenant, its directories and every row it owns.
    pub async fn delete_tenant(&self, id: &str) -> Result<()> {
        let handle = self.handle(id).await?;

        self.scheduler.stop(id).await;
        handle.paths().remove().await?;
        TenantRepository::new(self.db.pool()).delete(id).await?;

        self.tenants.write().await.remove(id);
        handle.mark_deleted();

        self.audit(None, AuditCategory::Tenant, &format!("tenant {id} deleted"))
            .await?;
        info!("Deleted tenant {}", id);
        Ok(())
    }

    /// Bytes used as of the accountant's last tick.
    pub async fn storage_used(&self, id: &str) -> Result<u64> {
        Ok(self.handle(id).await?.snapshot().bytes_used())
    }

    /// Check an upload of `incoming` bytes against the tenant's limits.
    ///
    /// Usage comes from the last accountant snapshot, so it may lag behind
    /// the disk by up to one accountant interval.
    pub async fn check_quota(&self, id: &str, incoming: u64) -> Result<()> {
        let handle = self.handle(id).await?;
        let record = handle.record();

        if let Some(limit) = record.upload_limit() {
            if incoming > limit {
                return Err(HoardError::UploadTooLarge {
                    size: incoming,
                    limit,
                });
            }
        }

        if let Some(quota) = record.quota() {
            let used = handle.snapshot().bytes_used();
            if used.saturating_add(incoming) > quota {
                return Err(HoardError::QuotaExceeded {
                    used,
                    incoming,
                    quota,
                });
            }
        }
        Ok(())
    }

    /// Hash and seal a new password.
    pub async fn set_password(&self, id: &str, password: &str) -> Result<()> {
        let handle = self.active_handle(id).await?;
        self.require_mode(AuthMode::Password)?;

        let phc = hash_password(password)?;
        let sealed = self.key.encrypt_str(&phc)?;
        TenantRepository::new(self.db.pool())
            .set_auth_secret(id, Some(&sealed))
            .await?;
        self.refresh(&handle).await?;

        self.audit(Some(id), AuditCategory::Auth, "password changed")
            .await
    }

    /// Check a password against the sealed hash.
    pub async fn verify_password(&self, id: &str, password: &str) -> Result<bool> {
        let handle = self.active_handle(id).await?;
        self.require_mode(AuthMode::Password)?;

        let Some(sealed) = handle.record().auth_secret else {
            return Ok(false);
        };
        let phc = self.key.decrypt_str(&sealed)?;
        match verify_password(password, &phc) {
            Ok(()) => Ok(true),
            Err(PasswordError::VerificationFailed) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Generate and seal a new TOTP seed. Returns the seed, hex-encoded.
    pub async fn set_totp_secret(&self, id: &str) -> Result<String> {
        let handle = self.active_handle(id).await?;
        self.require_mode(AuthMode::Totp)?;

        let seed = generate_totp_seed();
        let sealed = self.key.encrypt_str(&seed)?;
        TenantRepository::new(self.db.pool())
            .set_auth_secret(id, Some(&sealed))
            .await?;
        self.refresh(&handle).await?;

        self.audit(Some(id), AuditCategory::Auth, "totp secret changed")
            .await?;
        Ok(seed)
    }

    /// Replace the backup codes. The plaintext codes are only returned here.
    pub async fn generate_backup_codes(&self, id: &str) -> Result<Vec<String>> {
        let handle = self.active_handle(id).await?;

        let codes = generate_backup_codes();
        let digests: Vec<String> = codes.iter().map(|c| digest(&normalize_code(c))).collect();
        TenantRepository::new(self.db.pool())
            .set_backup_codes(id, &digests)
            .await?;
        self.refresh(&handle).await?;

        self.audit(
            Some(id),
            AuditCategory::Auth,
            &format!("{} backup codes generated", codes.len()),
        )
        .await?;
        Ok(codes)
    }

    /// Consume one backup code. Returns false if it is not a current code.
    pub async fn remove_code(&self, id: &str, code: &str) -> Result<bool> {
        let handle = self.active_handle(id).await?;

        let wanted = digest(&normalize_code(code));
        let mut digests = handle.record().backup_codes.0;
        let Some(position) = digests.iter().position(|d| *d == wanted) else {
            return Ok(false);
        };
        digests.remove(position);

        TenantRepository::new(self.db.pool())
            .set_backup_codes(id, &digests)
            .await?;
        self.refresh(&handle).await?;

        self.audit(
            Some(id),
            AuditCategory::Auth,
            &format!("backup code used, {} left", digests.len()),
        )
        .await?;
        Ok(true)
    }

    /// Issue an API token. The plaintext is only returned here.
    pub async fn create_token(&self, id: &str, name: &str) -> Result<(ApiToken, String)> {
        self.active_handle(id).await?;
        if name.trim().is_empty() {
            return Err(HoardError::Validation("token name is empty".to_string()));
        }

        let plaintext = generate_api_token();
        let token = ApiTokenRepository::new(self.db.pool())
            .create(id, name, &digest(&plaintext), Utc::now())
            .await?;

        self.audit(
            Some(id),
            AuditCategory::Auth,
            &format!("api token '{name}' created"),
        )
        .await?;
        Ok((token, plaintext))
    }

    /// Revoke every API token of a tenant. Returns how many were revoked.
    pub async fn delete_tokens(&self, id: &str) -> Result<u64> {
        self.active_handle(id).await?;

        let deleted = ApiTokenRepository::new(self.db.pool())
            .delete_by_tenant(id)
            .await?;

        self.audit(
            Some(id),
            AuditCategory::Auth,
            &format!("{deleted} api token(s) revoked"),
        )
        .await?;
        Ok(deleted)
    }

    pub async fn list_tokens(&self, id: &str) -> Result<Vec<ApiToken>> {
        self.handle(id).await?;
        ApiTokenRepository::new(self.db.pool())
            .list_by_tenant(id)
            .await
    }

    /// Re-encrypt a tenant's secrets from `old` to `new`.
    pub async fn rotate_credentials(
        &self,
        id: &str,
        old: &MasterKey,
        new: &MasterKey,
    ) -> Result<RotationReport> {
        let handle = self.handle(id).await?;
        let result = CredentialRotator::new(self.db.pool(), self.auth_mode)
            .rotate(&handle.record(), old, new)
            .await;
        self.refresh(&handle).await?;
        result
    }

    /// Continue a rotation that stopped with a `PartialRotation`.
    pub async fn resume_rotation(
        &self,
        id: &str,
        old: &MasterKey,
        new: &MasterKey,
        checkpoint: &RotationCheckpoint,
    ) -> Result<RotationReport> {
        let handle = self.handle(id).await?;
        let result = CredentialRotator::new(self.db.pool(), self.auth_mode)
            .resume(&handle.record(), checkpoint, old, new)
            .await;
        self.refresh(&handle).await?;
        result
    }

    /// Replace the installation with an archive directory.
    ///
    /// Every tenant's jobs are stopped for the duration. Afterwards tenants
    /// are reloaded from the database and restarted, also when the archive
    /// was rejected.
    pub async fn import_backup(&self, dir: &Path) -> Result<ImportSummary> {
        let mut tenants = self.tenants.write().await;
        self.stop_locked(&tenants).await;

        let imported = BackupImporter::new(self.db.pool(), &self.paths, &self.key)
            .import(dir)
            .await;
        let reloaded = self.load_locked(&mut tenants).await;
        drop(tenants);

        let summary = imported?;
        reloaded?;

        self.audit(
            None,
            AuditCategory::Backup,
            &format!(
                "backup version {} imported: {} tenant(s)",
                summary.version, summary.tenants
            ),
        )
        .await?;
        Ok(summary)
    }

    /// Write an archive of the installation into `dir`.
    pub async fn export_backup(&self, dir: &Path) -> Result<()> {
        let _tenants = self.tenants.read().await;
        BackupExporter::new(self.db.pool(), &self.paths, &self.key)
            .export(dir)
            .await?;
        Ok(())
    }
}

fn not_found(id: &str) -> HoardError {
    HoardError::NotFound(format!("tenant {id}"))
}

fn describe_update(update: &TenantUpdate) -> String {
    let mut fields = Vec::new();
    if let Some(disabled) = update.disabled {
        fields.push(if disabled { "disabled" } else { "enabled" }.to_string());
    }
    if let Some(quota) = update.storage_quota {
        fields.push(format!("storage quota {quota}"));
    }
    if let Some(limit) = update.upload_limit {
        fields.push(format!("upload limit {limit}"));
    }
    if update.extensions.is_some() || update.extension_mode.is_some() {
        fields.push("extensions".to_string());
    }
    if let Some(strategy) = update.name_strategy {
        fields.push(format!("name strategy {strategy}"));
    }
    if let Some(ref color) = update.embed_color {
        fields.push(format!("embed color {color}"));
    }
    if let Some(days) = update.audit_retention_days {
        fields.push(format!("audit retention {days} days"));
    }

    if fields.is_empty() {
        "tenant updated".to_string()
    } else {
        format!("tenant updated: {}", fields.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_LEN;
    use crate::scheduler::{ManualScheduler, SchedulerEvent};
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        scheduler: Arc<ManualScheduler>,
        service: TenantService,
    }

    async fn fixture(mode: AuthMode) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let db = Database::open_in_memory().await.unwrap();
        let key = MasterKey::from_bytes("current", &[7u8; KEY_LEN]).unwrap();
        let scheduler = Arc::new(ManualScheduler::new());
        let service = TenantService::new(
            db,
            DataPaths::new(tmp.path().join("data")),
            key,
            scheduler.clone(),
        )
        .with_auth_mode(mode);
        Fixture {
            _tmp: tmp,
            scheduler,
            service,
        }
    }

    async fn disable(service: &TenantService, id: &str) {
        service
            .update_tenant(id, &TenantUpdate::new().disabled(true), UpdateOptions::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_with_schedule_rejects_zero_interval() {
        let f = fixture(AuthMode::Password).await;
        let zero = ScheduleConfig {
            accountant_interval_secs: 0,
            ..ScheduleConfig::default()
        };
        assert!(matches!(
            f.service.with_schedule(zero),
            Err(HoardError::Config(_))
        ));

        let f = fixture(AuthMode::Password).await;
        let schedule = ScheduleConfig {
            accountant_interval_secs: 5,
            reconciler_interval_secs: 30,
        };
        let service = f.service.with_schedule(schedule).unwrap();
        service.create_tenant(NewTenant::new("alice")).await.unwrap();
        assert_eq!(f.scheduler.running(), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_create_starts_jobs() {
        let f = fixture(AuthMode::Password).await;

        let record = f.service.create_tenant(NewTenant::new("alice")).await.unwrap();

        assert!(Uuid::parse_str(&record.path_id).is_ok());
        assert!(f.service.paths().tenant(&record.path_id).files_dir.is_dir());
        assert_eq!(f.scheduler.running(), vec!["alice"]);
        assert_eq!(
            f.service.tenant_state("alice").await.unwrap(),
            TenantState::Active
        );
    }

    #[tokio::test]
    async fn test_create_conflict() {
        let f = fixture(AuthMode::Password).await;
        f.service.create_tenant(NewTenant::new("alice")).await.unwrap();

        let err = f
            .service
            .create_tenant(NewTenant::new("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, HoardError::Conflict(_)));
        assert_eq!(f.service.list_tenants().await.len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_settings() {
        let f = fixture(AuthMode::Password).await;
        let err = f
            .service
            .create_tenant(NewTenant::new("alice").with_embed_color("red"))
            .await
            .unwrap_err();
        assert!(matches!(err, HoardError::Validation(_)));
    }

    #[tokio::test]
    async fn test_disabled_tenant_can_only_be_reenabled() {
        let f = fixture(AuthMode::Password).await;
        f.service.create_tenant(NewTenant::new("alice")).await.unwrap();
        disable(&f.service, "alice").await;

        let err = f
            .service
            .update_tenant(
                "alice",
                &TenantUpdate::new().storage_quota(10),
                UpdateOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(err.is_disabled());

        let record = f
            .service
            .update_tenant(
                "alice",
                &TenantUpdate::new().disabled(false).storage_quota(10),
                UpdateOptions::audited(),
            )
            .await
            .unwrap();
        assert!(!record.disabled);
        assert_eq!(record.storage_quota, 10);
        assert_eq!(f.service.get_tenant("alice").await.unwrap(), record);
    }

    #[tokio::test]
    async fn test_update_audit_is_optional() {
        let f = fixture(AuthMode::Password).await;
        f.service.create_tenant(NewTenant::new("alice")).await.unwrap();
        let audit = AuditLogRepository::new(f.service.database().pool());
        let before = audit.list_by_tenant("alice").await.unwrap().len();

        f.service
            .update_tenant(
                "alice",
                &TenantUpdate::new().upload_limit(5),
                UpdateOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(audit.list_by_tenant("alice").await.unwrap().len(), before);

        f.service
            .update_tenant(
                "alice",
                &TenantUpdate::new().upload_limit(6),
                UpdateOptions::audited(),
            )
            .await
            .unwrap();
        let logs = audit.list_by_tenant("alice").await.unwrap();
        assert_eq!(logs.len(), before + 1);
        assert_eq!(logs[before].message, "tenant updated: upload limit 6");
    }

    #[tokio::test]
    async fn test_reset_restarts_jobs() {
        let f = fixture(AuthMode::Password).await;
        let created = f
            .service
            .create_tenant(NewTenant::new("alice").with_storage_quota(100))
            .await
            .unwrap();

        f.service.reset_tenant("alice").await.unwrap();

        let record = f.service.get_tenant("alice").await.unwrap();
        assert_eq!(record.path_id, created.path_id);
        assert_eq!(record.storage_quota, 0);
        let events = f.scheduler.events();
        assert_eq!(
            &events[events.len() - 2..],
            &[
                SchedulerEvent::Stopped("alice".to_string()),
                SchedulerEvent::Started("alice".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_unknown_tenant() {
        let f = fixture(AuthMode::Password).await;
        assert!(matches!(
            f.service.delete_tenant("ghost").await,
            Err(HoardError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_marks_handle() {
        let f = fixture(AuthMode::Password).await;
        f.service.create_tenant(NewTenant::new("alice")).await.unwrap();
        let handle = f.service.handle("alice").await.unwrap();

        f.service.delete_tenant("alice").await.unwrap();

        assert_eq!(handle.state(), TenantState::Deleted);
        assert!(f.scheduler.running().is_empty());
        assert!(matches!(
            f.service.get_tenant("alice").await,
            Err(HoardError::NotFound(_))
        ));
        let installation = AuditLogRepository::new(f.service.database().pool())
            .list_installation()
            .await
            .unwrap();
        assert_eq!(installation.last().unwrap().message, "tenant alice deleted");
    }

    #[tokio::test]
    async fn test_password_round_trip() {
        let f = fixture(AuthMode::Password).await;
        f.service.create_tenant(NewTenant::new("alice")).await.unwrap();

        assert!(!f.service.verify_password("alice", "hunter22").await.unwrap());
        f.service.set_password("alice", "hunter22").await.unwrap();

        let sealed = f.service.get_tenant("alice").await.unwrap().auth_secret.unwrap();
        assert!(!sealed.contains("argon2"));
        assert!(f.service.verify_password("alice", "hunter22").await.unwrap());
        assert!(!f.service.verify_password("alice", "wrong-one").await.unwrap());
    }

    #[tokio::test]
    async fn test_totp_requires_totp_mode() {
        let f = fixture(AuthMode::Password).await;
        f.service.create_tenant(NewTenant::new("alice")).await.unwrap();
        assert!(matches!(
            f.service.set_totp_secret("alice").await,
            Err(HoardError::Validation(_))
        ));

        let f = fixture(AuthMode::Totp).await;
        f.service.create_tenant(NewTenant::new("alice")).await.unwrap();
        let seed = f.service.set_totp_secret("alice").await.unwrap();
        let sealed = f.service.get_tenant("alice").await.unwrap().auth_secret.unwrap();
        assert_eq!(f.service.master_key().decrypt_str(&sealed).unwrap(), seed);
    }

    #[tokio::test]
    async fn test_backup_codes_are_single_use() {
        let f = fixture(AuthMode::Password).await;
        f.service.create_tenant(NewTenant::new("alice")).await.unwrap();

        let codes = f.service.generate_backup_codes("alice").await.unwrap();
        assert_eq!(codes.len(), 10);

        let typed = codes[3].to_lowercase().replace('-', " ");
        assert!(f.service.remove_code("alice", &typed).await.unwrap());
        assert!(!f.service.remove_code("alice", &codes[3]).await.unwrap());
        assert_eq!(
            f.service.get_tenant("alice").await.unwrap().backup_codes.len(),
            9
        );
    }

    #[tokio::test]
    async fn test_tokens() {
        let f = fixture(AuthMode::Password).await;
        f.service.create_tenant(NewTenant::new("alice")).await.unwrap();

        let (token, plaintext) = f.service.create_token("alice", "ci").await.unwrap();
        assert!(plaintext.starts_with("hrd_"));
        assert_eq!(token.token_hash, digest(&plaintext));
        assert_eq!(f.service.list_tokens("alice").await.unwrap().len(), 1);

        assert_eq!(f.service.delete_tokens("alice").await.unwrap(), 1);
        assert!(f.service.list_tokens("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_check_quota() {
        let f = fixture(AuthMode::Password).await;
        f.service
            .create_tenant(
                NewTenant::new("alice")
                    .with_storage_quota(100)
                    .with_upload_limit(60),
            )
            .await
            .unwrap();
        f.service
            .handle("alice")
            .await
            .unwrap()
            .snapshot()
            .store(50, Utc::now());

        assert!(f.service.check_quota("alice", 50).await.is_ok());
        assert!(matches!(
            f.service.check_quota("alice", 51).await,
            Err(HoardError::QuotaExceeded { used: 50, incoming: 51, quota: 100 })
        ));
        assert!(matches!(
            f.service.check_quota("alice", 61).await,
            Err(HoardError::UploadTooLarge { size: 61, limit: 60 })
        ));
    }

    #[tokio::test]
    async fn test_hydrate_loads_existing_tenants() {
        let f = fixture(AuthMode::Password).await;
        TenantRepository::new(f.service.database().pool())
            .create(&NewTenant::new("bob"), &Uuid::new_v4().to_string())
            .await
            .unwrap();

        assert_eq!(f.service.hydrate().await.unwrap(), 1);
        assert_eq!(f.scheduler.running(), vec!["bob"]);
        assert!(f.service.get_tenant("bob").await.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_import_restores_schedules() {
        let f = fixture(AuthMode::Password).await;
        f.service.create_tenant(NewTenant::new("alice")).await.unwrap();

        let archive = TempDir::new().unwrap();
        std::fs::write(
            archive.path().join("manifest.json"),
            r#"{"version": "9.9.9"}"#,
        )
        .unwrap();

        let err = f.service.import_backup(archive.path()).await.unwrap_err();
        assert!(matches!(err, HoardError::UnsupportedManifest(_)));
        assert_eq!(f.scheduler.running(), vec!["alice"]);
        assert!(f.service.get_tenant("alice").await.is_ok());
    }
}
