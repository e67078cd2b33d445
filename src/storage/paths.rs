//! On-disk layout of tenant blobs.
//!
//! ```text
//! {data_root}/
//! ├── files/
//! │   └── {path_id}/
//! │       └── {resource_id}
//! └── paste-bins/
//!     └── {path_id}/
//!         └── {resource_id}
//! ```
//!
//! Paths are derived from the private `path_id` and the resource id only.

use std::io;
use std::path::{Path, PathBuf};

use crate::db::ResourceKind;

/// Directory name of the files root.
pub const FILES_DIR: &str = "files";

/// Directory name of the pastebins root.
pub const PASTEBINS_DIR: &str = "paste-bins";

/// The installation's data root.
#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    /// Create a resolver over `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The data root itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root holding every tenant's files directory.
    pub fn files_root(&self) -> PathBuf {
        self.root.join(FILES_DIR)
    }

    /// Root holding every tenant's pastebins directory.
    pub fn pastebin_root(&self) -> PathBuf {
        self.root.join(PASTEBINS_DIR)
    }

    /// Directories of one tenant.
    pub fn tenant(&self, path_id: &str) -> TenantPaths {
        TenantPaths {
            files_dir: self.files_root().join(path_id),
            pastebin_dir: self.pastebin_root().join(path_id),
        }
    }
}

/// Directories of one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantPaths {
    pub files_dir: PathBuf,
    pub pastebin_dir: PathBuf,
}

impl TenantPaths {
    /// Directory holding blobs of `kind`.
    pub fn dir(&self, kind: ResourceKind) -> &Path {
        match kind {
            ResourceKind::File => &self.files_dir,
            ResourceKind::Pastebin => &self.pastebin_dir,
        }
    }

    /// Blob path of one resource.
    pub fn resource_path(&self, kind: ResourceKind, id: &str) -> PathBuf {
        self.dir(kind).join(id)
    }

    /// Create both directories.
    pub async fn ensure(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.files_dir).await?;
        tokio::fs::create_dir_all(&self.pastebin_dir).await?;
        Ok(())
    }

    /// Remove both directories recursively. Missing directories are fine.
    pub async fn remove(&self) -> io::Result<()> {
        super::remove_dir_if_exists(&self.files_dir).await?;
        super::remove_dir_if_exists(&self.pastebin_dir).await?;
        Ok(())
    }

    /// Empty both directories, leaving them in place.
    pub async fn clear(&self) -> io::Result<()> {
        self.remove().await?;
        self.ensure().await
    }
}
