//! Storage usage accounting.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::scheduler::Job;

/// Last computed storage usage of a tenant.
///
/// Readers never wait on the accountant; the value may be up to one
/// accountant interval old.
#[derive(Debug, Default)]
pub struct StorageSnapshot {
    bytes_used: AtomicU64,
    /// Unix milliseconds, 0 = never refreshed.
    refreshed_at: AtomicI64,
}

impl StorageSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes used as of the last refresh.
    pub fn bytes_used(&self) -> u64 {
        self.bytes_used.load(Ordering::Acquire)
    }

    /// When the snapshot was last refreshed.
    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        match self.refreshed_at.load(Ordering::Acquire) {
            0 => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }

    /// Store a freshly computed total.
    pub fn store(&self, bytes: u64, at: DateTime<Utc>) {
        self.bytes_used.store(bytes, Ordering::Release);
        self.refreshed_at
            .store(at.timestamp_millis(), Ordering::Release);
    }
}

/// Sum the sizes of regular files under `dir`, recursively.
///
/// A missing directory counts as 0 bytes. Symlinks are not followed.
pub async fn dir_size(dir: &Path) -> io::Result<u64> {
    let mut total = 0u64;
    let mut pending: Vec<PathBuf> = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut reader = match tokio::fs::read_dir(&current).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };

        while let Some(entry) = reader.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                total += entry.metadata().await?.len();
            }
        }
    }

    Ok(total)
}

/// Periodic job recomputing a tenant's files directory usage.
pub struct StorageAccountant {
    tenant_id: String,
    files_dir: PathBuf,
    snapshot: Arc<StorageSnapshot>,
}

impl StorageAccountant {
    pub fn new(
        tenant_id: impl Into<String>,
        files_dir: impl Into<PathBuf>,
        snapshot: Arc<StorageSnapshot>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            files_dir: files_dir.into(),
            snapshot,
        }
    }

    /// Recompute usage and store it in the snapshot.
    ///
    /// On error the previous snapshot is kept.
    pub async fn refresh(&self) -> io::Result<u64> {
        let bytes = dir_size(&self.files_dir).await?;
        self.snapshot.store(bytes, Utc::now());
        Ok(bytes)
    }
}

#[async_trait]
impl Job for StorageAccountant {
    fn name(&self) -> &'static str {
        "accountant"
    }

    async fn tick(&self) {
        match self.refresh().await {
            Ok(bytes) => debug!("tenant {} uses {} bytes", self.tenant_id, bytes),
            Err(e) => warn!(
                "storage accounting for tenant {} failed, keeping {} bytes: {}",
                self.tenant_id,
                self.snapshot.bytes_used(),
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dir_size_recursive() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("a"), vec![0u8; 100]).unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("b"), vec![0u8; 23]).unwrap();

        assert_eq!(dir_size(dir.path()).await.unwrap(), 123);
    }

    #[tokio::test]
    async fn test_dir_size_missing_is_zero() {
        let dir = tempfile::TempDir::new().unwrap();
        assert_eq!(dir_size(&dir.path().join("gone")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_changes_only_on_tick() {
        let dir = tempfile::TempDir::new().unwrap();
        let snapshot = Arc::new(StorageSnapshot::new());
        let accountant = StorageAccountant::new("alice", dir.path(), snapshot.clone());

        assert!(snapshot.refreshed_at().is_none());
        std::fs::write(dir.path().join("a"), vec![0u8; 10]).unwrap();
        assert_eq!(snapshot.bytes_used(), 0);

        accountant.tick().await;
        assert_eq!(snapshot.bytes_used(), 10);
        assert!(snapshot.refreshed_at().is_some());

        std::fs::write(dir.path().join("b"), vec![0u8; 5]).unwrap();
        assert_eq!(snapshot.bytes_used(), 10);

        accountant.tick().await;
        assert_eq!(snapshot.bytes_used(), 15);
    }

    #[tokio::test]
    async fn test_error_keeps_previous_value() {
        let dir = tempfile::TempDir::new().unwrap();
        let snapshot = Arc::new(StorageSnapshot::new());
        snapshot.store(42, Utc::now());

        // A regular file where the directory should be cannot be listed.
        let not_a_dir = dir.path().join("file");
        std::fs::write(&not_a_dir, b"x").unwrap();
        let accountant = StorageAccountant::new("alice", &not_a_dir, snapshot.clone());

        accountant.tick().await;
        assert_eq!(snapshot.bytes_used(), 42);
    }
}
