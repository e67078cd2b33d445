//! Disk/database reconciliation.
//!
//! Per pass and per resource kind:
//! 1. list the tenant's directory and the tenant's rows
//! 2. delete blobs that have no row
//! 3. delete rows that have no blob
//!
//! Disk deletions always precede database deletions within a pass. The two
//! listings are taken once; anything created after them is left for the next
//! pass. A blob whose name is not valid UTF-8 can never match a row and is
//! always an orphan. A missing tenant directory fails the pass instead of
//! listing as empty, so no rows are dropped for it.

use std::collections::BTreeSet;
use std::ffi::OsString;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use super::paths::TenantPaths;
use crate::db::{ResourceKind, ResourceRepository};
use crate::scheduler::Job;
use crate::Result;

/// The diff computed from one pair of listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub kind: ResourceKind,
    pub on_disk_not_in_db: Vec<OsString>,
    pub in_db_not_on_disk: Vec<String>,
}

impl ReconcilePlan {
    /// Diff a directory listing against row ids.
    pub fn diff(kind: ResourceKind, on_disk: &[OsString], in_db: &[String]) -> Self {
        let db: BTreeSet<&str> = in_db.iter().map(String::as_str).collect();
        let disk: BTreeSet<&str> = on_disk.iter().filter_map(|name| name.to_str()).collect();

        Self {
            kind,
            on_disk_not_in_db: on_disk
                .iter()
                .filter(|name| name.to_str().map_or(true, |id| !db.contains(id)))
                .cloned()
                .collect(),
            in_db_not_on_disk: db.difference(&disk).map(|s| s.to_string()).collect(),
        }
    }

    /// Whether disk and database already agree.
    pub fn is_clean(&self) -> bool {
        self.on_disk_not_in_db.is_empty() && self.in_db_not_on_disk.is_empty()
    }
}

/// What one pass removed for one kind.
///
/// Blob names that are not valid UTF-8 are reported lossily.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindReport {
    pub removed_from_disk: Vec<String>,
    pub removed_from_db: Vec<String>,
}

impl KindReport {
    pub fn is_empty(&self) -> bool {
        self.removed_from_disk.is_empty() && self.removed_from_db.is_empty()
    }
}

/// Result of a full pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub files: KindReport,
    pub pastebins: KindReport,
}

impl ReconcileReport {
    /// Report for one kind.
    pub fn kind(&self, kind: ResourceKind) -> &KindReport {
        match kind {
            ResourceKind::File => &self.files,
            ResourceKind::Pastebin => &self.pastebins,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.pastebins.is_empty()
    }
}

/// Periodic job keeping a tenant's blob directories and rows in agreement.
pub struct TreeReconciler {
    pool: SqlitePool,
    tenant_id: String,
    paths: TenantPaths,
}

impl TreeReconciler {
    pub fn new(pool: SqlitePool, tenant_id: impl Into<String>, paths: TenantPaths) -> Self {
        Self {
            pool,
            tenant_id: tenant_id.into(),
            paths,
        }
    }

    /// Take both listings for one kind and diff them.
    pub async fn plan(&self, kind: ResourceKind) -> Result<ReconcilePlan> {
        let on_disk = super::list_entries(self.paths.dir(kind)).await?;
        let in_db = ResourceRepository::new(&self.pool, kind)
            .list_ids(&self.tenant_id)
            .await?;
        Ok(ReconcilePlan::diff(kind, &on_disk, &in_db))
    }

    /// Carry out a plan: disk first, then database.
    pub async fn apply(&self, plan: &ReconcilePlan) -> Result<KindReport> {
        let mut report = KindReport::default();

        for name in &plan.on_disk_not_in_db {
            let path = self.paths.dir(plan.kind).join(name);
            if super::remove_entry(&path).await? {
                report
                    .removed_from_disk
                    .push(name.to_string_lossy().into_owned());
            }
        }

        if !plan.in_db_not_on_disk.is_empty() {
            ResourceRepository::new(&self.pool, plan.kind)
                .delete_ids(&self.tenant_id, &plan.in_db_not_on_disk)
                .await?;
            report.removed_from_db = plan.in_db_not_on_disk.clone();
        }

        Ok(report)
    }

    /// Reconcile one kind.
    pub async fn reconcile_kind(&self, kind: ResourceKind) -> Result<KindReport> {
        let plan = self.plan(kind).await?;
        if plan.is_clean() {
            return Ok(KindReport::default());
        }
        self.apply(&plan).await
    }

    /// Reconcile files, then pastebins.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let files = self.reconcile_kind(ResourceKind::File).await?;
        let pastebins = self.reconcile_kind(ResourceKind::Pastebin).await?;
        Ok(ReconcileReport { files, pastebins })
    }
}

#[async_trait]
impl Job for TreeReconciler {
    fn name(&self) -> &'static str {
        "reconciler"
    }

    async fn tick(&self) {
        for kind in ResourceKind::ALL {
            match self.reconcile_kind(kind).await {
                Ok(report) if report.is_empty() => {
                    debug!("tenant {}: {}s consistent", self.tenant_id, kind)
                }
                Ok(report) => info!(
                    "tenant {}: removed {} orphaned {} blob(s) and {} orphaned row(s)",
                    self.tenant_id,
                    report.removed_from_disk.len(),
                    kind,
                    report.removed_from_db.len()
                ),
                Err(e) => warn!(
                    "reconciling {}s of tenant {} failed: {}",
                    kind, self.tenant_id, e
                ),
            }
        }
    }
}
