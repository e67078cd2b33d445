//! Master key rotation for one tenant.
//!
//! Files are rotated first, then pastebins, each ordered by id. Every resource
//! is persisted on its own; a ciphertext that already opens under the new key
//! is counted as already rotated, so re-running a stopped rotation is safe.
//! The tenant's auth secret is rotated last.

use sqlx::SqlitePool;
use tracing::{info, warn};

use super::{PartialRotation, ResourceRef, RotationCheckpoint, RotationReport};
use crate::auth::AuthMode;
use crate::crypto::{rotate_secret, MasterKey};
use crate::db::{
    AuditCategory, AuditLogRepository, ResourceKind, ResourceRepository, TenantRecord,
    TenantRepository,
};
use crate::{HoardError, Result};

enum Outcome {
    Rotated,
    AlreadyRotated,
    /// Gone or no longer protected.
    Skipped,
}

/// Re-encrypts a tenant's secrets from one master key to another.
pub struct CredentialRotator<'a> {
    pool: &'a SqlitePool,
    auth_mode: AuthMode,
}

impl<'a> CredentialRotator<'a> {
    pub fn new(pool: &'a SqlitePool, auth_mode: AuthMode) -> Self {
        Self { pool, auth_mode }
    }

    /// Every password-protected resource of a tenant, in rotation order.
    pub async fn protected_resources(&self, tenant_id: &str) -> Result<Vec<ResourceRef>> {
        let mut refs = Vec::new();
        for kind in ResourceKind::ALL {
            let resources = ResourceRepository::new(self.pool, kind)
                .list_protected(tenant_id)
                .await?;
            refs.extend(resources.into_iter().map(|r| ResourceRef::new(kind, r.id)));
        }
        Ok(refs)
    }

    /// Rotate everything the tenant owns.
    pub async fn rotate(
        &self,
        tenant: &TenantRecord,
        old: &MasterKey,
        new: &MasterKey,
    ) -> Result<RotationReport> {
        let refs = self.protected_resources(&tenant.id).await?;
        info!(
            "Rotating {} secret(s) of tenant {} from key '{}' to '{}'",
            refs.len(),
            tenant.id,
            old.name(),
            new.name()
        );
        self.rotate_refs(tenant, refs, old, new).await
    }

    /// Continue a rotation from its checkpoint.
    pub async fn resume(
        &self,
        tenant: &TenantRecord,
        checkpoint: &RotationCheckpoint,
        old: &MasterKey,
        new: &MasterKey,
    ) -> Result<RotationReport> {
        info!(
            "Resuming rotation of tenant {} with {} pending resource(s)",
            tenant.id,
            checkpoint.pending.len()
        );
        self.rotate_refs(tenant, checkpoint.pending.clone(), old, new)
            .await
    }

    async fn rotate_refs(
        &self,
        tenant: &TenantRecord,
        refs: Vec<ResourceRef>,
        old: &MasterKey,
        new: &MasterKey,
    ) -> Result<RotationReport> {
        let mut report = RotationReport {
            tenant_id: tenant.id.clone(),
            ..Default::default()
        };

        for (i, resource) in refs.iter().enumerate() {
            match self.rotate_one(&tenant.id, resource, old, new).await {
                Ok(Outcome::Rotated) => report.rotated.push(resource.clone()),
                Ok(Outcome::AlreadyRotated) => report.already_rotated.push(resource.clone()),
                Ok(Outcome::Skipped) => {}
                Err(e) => {
                    let partial = PartialRotation {
                        tenant_id: tenant.id.clone(),
                        rotated: report.rotated,
                        already_rotated: report.already_rotated,
                        pending: refs[i..].to_vec(),
                        cause: e.to_string(),
                    };
                    return Err(self.stop(partial).await);
                }
            }
        }

        match self.rotate_auth_secret(tenant, old, new).await {
            Ok(rotated) => report.secret_rotated = rotated,
            Err(e) => {
                let partial = PartialRotation {
                    tenant_id: tenant.id.clone(),
                    rotated: report.rotated,
                    already_rotated: report.already_rotated,
                    pending: Vec::new(),
                    cause: e.to_string(),
                };
                return Err(self.stop(partial).await);
            }
        }

        let message = format!(
            "credentials rotated from key '{}' to '{}': {} rotated, {} already rotated, auth secret {}",
            old.name(),
            new.name(),
            report.rotated.len(),
            report.already_rotated.len(),
            if report.secret_rotated { "rotated" } else { "unchanged" }
        );
        AuditLogRepository::new(self.pool)
            .record(Some(&tenant.id), AuditCategory::Rotation, &message)
            .await?;
        info!("Tenant {}: {}", tenant.id, message);

        Ok(report)
    }

    async fn rotate_one(
        &self,
        tenant_id: &str,
        resource: &ResourceRef,
        old: &MasterKey,
        new: &MasterKey,
    ) -> Result<Outcome> {
        let repo = ResourceRepository::new(self.pool, resource.kind);
        let Some(row) = repo.get(tenant_id, &resource.id).await? else {
            return Ok(Outcome::Skipped);
        };
        let Some(sealed) = row.password else {
            return Ok(Outcome::Skipped);
        };

        if new.opens(&sealed) {
            return Ok(Outcome::AlreadyRotated);
        }

        let rotated = rotate_secret(&sealed, old, new)?;
        if !repo
            .set_password(tenant_id, &resource.id, Some(&rotated))
            .await?
        {
            return Ok(Outcome::Skipped);
        }
        Ok(Outcome::Rotated)
    }

    /// Returns whether the secret was re-encrypted.
    async fn rotate_auth_secret(
        &self,
        tenant: &TenantRecord,
        old: &MasterKey,
        new: &MasterKey,
    ) -> Result<bool> {
        if !self.auth_mode.stores_secret() {
            return Ok(false);
        }

        let repo = TenantRepository::new(self.pool);
        let current = repo
            .get(&tenant.id)
            .await?
            .ok_or_else(|| HoardError::NotFound(format!("tenant {}", tenant.id)))?;

        let Some(sealed) = current.auth_secret else {
            return Ok(false);
        };
        if new.opens(&sealed) {
            return Ok(false);
        }

        let rotated = rotate_secret(&sealed, old, new)?;
        repo.set_auth_secret(&tenant.id, Some(&rotated)).await?;
        Ok(true)
    }

    /// Record a stopped rotation and build the error for it.
    async fn stop(&self, partial: PartialRotation) -> HoardError {
        warn!("{}", partial);
        let message = format!(
            "credential rotation stopped: {} rotated, {} pending ({})",
            partial.rotated.len(),
            partial.pending.len(),
            partial.cause
        );
        if let Err(e) = AuditLogRepository::new(self.pool)
            .record(Some(&partial.tenant_id), AuditCategory::Rotation, &message)
            .await
        {
            warn!(
                "failed to audit stopped rotation of tenant {}: {}",
                partial.tenant_id, e
            );
        }
        HoardError::PartialRotation(Box::new(partial))
    }
}
