//! In-memory tenant object.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use sqlx::SqlitePool;

use crate::config::ScheduleConfig;
use crate::db::TenantRecord;
use crate::scheduler::ScheduledJob;
use crate::storage::{StorageAccountant, StorageSnapshot, TenantPaths, TreeReconciler};
use crate::{HoardError, Result};

/// Name of the storage accountant job.
pub const ACCOUNTANT_JOB: &str = "accountant";

/// Name of the tree reconciler job.
pub const RECONCILER_JOB: &str = "reconciler";

/// Lifecycle state of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantState {
    Active,
    Disabled,
    /// Terminal.
    Deleted,
}

/// Live view of one tenant.
///
/// Holds the last persisted row, the tenant's directories and its storage
/// snapshot. The row is re-read from the database after every mutation.
#[derive(Debug)]
pub struct TenantHandle {
    id: String,
    record: RwLock<TenantRecord>,
    paths: TenantPaths,
    snapshot: Arc<StorageSnapshot>,
    deleted: AtomicBool,
}

impl TenantHandle {
    pub fn new(record: TenantRecord, paths: TenantPaths) -> Self {
        Self {
            id: record.id.clone(),
            record: RwLock::new(record),
            paths,
            snapshot: Arc::new(StorageSnapshot::new()),
            deleted: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Copy of the current row.
    pub fn record(&self) -> TenantRecord {
        self.record
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the row after a persisted change.
    pub fn replace(&self, record: TenantRecord) {
        *self
            .record
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = record;
    }

    pub fn paths(&self) -> &TenantPaths {
        &self.paths
    }

    pub fn snapshot(&self) -> &Arc<StorageSnapshot> {
        &self.snapshot
    }

    pub fn state(&self) -> TenantState {
        if self.deleted.load(Ordering::Acquire) {
            TenantState::Deleted
        } else if self.record().disabled {
            TenantState::Disabled
        } else {
            TenantState::Active
        }
    }

    pub(crate) fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
    }

    /// Fail with `Disabled` (or `NotFound` once deleted) unless active.
    pub fn ensure_active(&self) -> Result<()> {
        match self.state() {
            TenantState::Active => Ok(()),
            TenantState::Disabled => Err(HoardError::Disabled(self.id.clone())),
            TenantState::Deleted => Err(HoardError::NotFound(format!("tenant {}", self.id))),
        }
    }

    /// The accountant and reconciler jobs for this tenant.
    pub fn jobs(&self, pool: &SqlitePool, schedule: &ScheduleConfig) -> Vec<ScheduledJob> {
        let accountant = StorageAccountant::new(
            self.id.clone(),
            self.paths.files_dir.clone(),
            self.snapshot.clone(),
        );
        let reconciler = TreeReconciler::new(pool.clone(), self.id.clone(), self.paths.clone());

        vec![
            ScheduledJob::new(
                Arc::new(accountant),
                Duration::from_secs(schedule.accountant_interval_secs),
            ),
            ScheduledJob::new(
                Arc::new(reconciler),
                Duration::from_secs(schedule.reconciler_interval_secs),
            ),
        ]
    }
}
