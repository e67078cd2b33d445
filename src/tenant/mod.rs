//! Tenant lifecycle.
//!
//! [`TenantService`] is the entry point: it owns the in-memory
//! [`TenantHandle`] of every tenant, schedules their background jobs and runs
//! credential rotation and backup import/export.

mod handle;
mod rotation;
mod service;

pub use handle::{TenantHandle, TenantState, ACCOUNTANT_JOB, RECONCILER_JOB};
pub use rotation::CredentialRotator;
pub use service::{TenantService, UpdateOptions};

use std::fmt;

use serde::Serialize;

use crate::db::ResourceKind;

/// Identifies one file or pastebin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResourceRef {
    #[serde(serialize_with = "serialize_kind")]
    pub kind: ResourceKind,
    pub id: String,
}

fn serialize_kind<S: serde::Serializer>(kind: &ResourceKind, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(kind.as_str())
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn file(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::File, id)
    }

    pub fn pastebin(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::Pastebin, id)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Outcome of a completed rotation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RotationReport {
    pub tenant_id: String,
    /// Resources re-encrypted by this run.
    pub rotated: Vec<ResourceRef>,
    /// Resources whose secret already opened under the new key.
    pub already_rotated: Vec<ResourceRef>,
    /// Whether the tenant's auth secret was re-encrypted by this run.
    pub secret_rotated: bool,
}

/// Where to pick a stopped rotation back up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RotationCheckpoint {
    /// Resources still to rotate, in order.
    pub pending: Vec<ResourceRef>,
}

/// A rotation that stopped at its first failure.
///
/// Everything in `rotated` is sealed under the new key; everything in
/// `pending` (starting with the resource that failed) is still under the old
/// one. The tenant auth secret has not been touched unless `pending` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialRotation {
    pub tenant_id: String,
    pub rotated: Vec<ResourceRef>,
    pub already_rotated: Vec<ResourceRef>,
    pub pending: Vec<ResourceRef>,
    pub cause: String,
}

impl PartialRotation {
    /// Checkpoint to pass to a resumed rotation.
    pub fn checkpoint(&self) -> RotationCheckpoint {
        RotationCheckpoint {
            pending: self.pending.clone(),
        }
    }

    /// The resource that failed, if a resource failed.
    pub fn failed(&self) -> Option<&ResourceRef> {
        self.pending.first()
    }
}

impl fmt::Display for PartialRotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failed() {
            Some(failed) => write!(
                f,
                "credential rotation for tenant {} stopped at {} ({} rotated, {} pending): {}",
                self.tenant_id,
                failed,
                self.rotated.len(),
                self.pending.len(),
                self.cause
            ),
            None => write!(
                f,
                "credential rotation for tenant {} stopped at the auth secret ({} rotated): {}",
                self.tenant_id,
                self.rotated.len(),
                self.cause
            ),
        }
    }
}
