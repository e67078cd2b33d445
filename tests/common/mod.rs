//! Test helpers for integration tests.
//!
//! Provides a [`TestEnv`] with a temporary data root, an in-memory database
//! and a manual scheduler, plus helpers to seed resources and blobs.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use hoard::crypto::KEY_LEN;
use hoard::db::{NewResource, ResourceKind, ResourceRepository};
use hoard::{AuthMode, DataPaths, Database, ManualScheduler, MasterKey, NewTenant, TenantService};

/// Build a deterministic key.
pub fn key(name: &str, byte: u8) -> MasterKey {
    MasterKey::from_bytes(name, &[byte; KEY_LEN]).unwrap()
}

/// A service over a throwaway installation.
pub struct TestEnv {
    pub tmp: TempDir,
    pub scheduler: Arc<ManualScheduler>,
    pub service: TenantService,
}

impl TestEnv {
    /// Fresh installation with the default key and password auth.
    pub async fn new() -> Self {
        Self::with_key(key("current", 42)).await
    }

    pub async fn with_key(master_key: MasterKey) -> Self {
        let tmp = TempDir::new().unwrap();
        let db = Database::open_in_memory().await.unwrap();
        let scheduler = Arc::new(ManualScheduler::new());
        let service = TenantService::new(
            db,
            DataPaths::new(tmp.path().join("data")),
            master_key,
            scheduler.clone(),
        )
        .with_auth_mode(AuthMode::Password);
        Self {
            tmp,
            scheduler,
            service,
        }
    }

    pub fn db(&self) -> &Database {
        self.service.database()
    }

    /// A directory next to the data root, for archives.
    pub fn scratch(&self, name: &str) -> PathBuf {
        self.tmp.path().join(name)
    }

    pub async fn create(&self, id: &str) {
        self.service.create_tenant(NewTenant::new(id)).await.unwrap();
    }

    /// Insert a resource row and write its blob.
    pub async fn add_resource(
        &self,
        kind: ResourceKind,
        tenant: &str,
        id: &str,
        content: &[u8],
        password: Option<String>,
    ) {
        let mut new = NewResource::new(id, tenant, id, content.len() as u64);
        new.password = password;
        ResourceRepository::new(self.db().pool(), kind)
            .create(&new)
            .await
            .unwrap();
        self.write_blob(kind, tenant, id, content).await;
    }

    /// Write a blob without a row.
    pub async fn write_blob(&self, kind: ResourceKind, tenant: &str, id: &str, content: &[u8]) {
        let handle = self.service.handle(tenant).await.unwrap();
        let path = handle.paths().resource_path(kind, id);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, content).await.unwrap();
    }

    pub async fn blob_exists(&self, kind: ResourceKind, tenant: &str, id: &str) -> bool {
        let handle = self.service.handle(tenant).await.unwrap();
        handle.paths().resource_path(kind, id).exists()
    }

    pub async fn resource_ids(&self, kind: ResourceKind, tenant: &str) -> Vec<String> {
        ResourceRepository::new(self.db().pool(), kind)
            .list_ids(tenant)
            .await
            .unwrap()
    }
}
