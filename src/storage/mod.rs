//! Tenant blob storage.
//!
//! This module provides:
//! - the path layout ([`DataPaths`], [`TenantPaths`])
//! - the periodic [`StorageAccountant`]
//! - the periodic [`TreeReconciler`]
//! - directory helpers shared with backup import and export

mod accountant;
mod paths;
mod reconciler;

pub use accountant::{dir_size, StorageAccountant, StorageSnapshot};
pub use paths::{DataPaths, TenantPaths, FILES_DIR, PASTEBINS_DIR};
pub use reconciler::{KindReport, ReconcilePlan, ReconcileReport, TreeReconciler};

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// List the entry names of a directory, sorted.
///
/// Names are returned as-is, including ones that are not valid UTF-8. A
/// missing directory is an error.
pub async fn list_entries(dir: &Path) -> io::Result<Vec<OsString>> {
    let mut reader = tokio::fs::read_dir(dir).await?;

    let mut names = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        names.push(entry.file_name());
    }
    names.sort();
    Ok(names)
}

/// Remove a file or directory entry. Returns false if it was already gone.
pub async fn remove_entry(path: &Path) -> io::Result<bool> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    let result = if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };

    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Remove a directory tree if it exists.
pub async fn remove_dir_if_exists(dir: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Copy a directory tree. `dst` must not exist yet.
pub async fn copy_dir(src: &Path, dst: &Path) -> io::Result<()> {
    let mut pending: Vec<(PathBuf, PathBuf)> = vec![(src.to_path_buf(), dst.to_path_buf())];

    while let Some((from, to)) = pending.pop() {
        tokio::fs::create_dir_all(&to).await?;
        let mut reader = tokio::fs::read_dir(&from).await?;
        while let Some(entry) = reader.next_entry().await? {
            let file_type = entry.file_type().await?;
            let target = to.join(entry.file_name());
            if file_type.is_dir() {
                pending.push((entry.path(), target));
            } else if file_type.is_file() {
                tokio::fs::copy(entry.path(), &target).await?;
            }
        }
    }
    Ok(())
}

/// Move a directory tree into place.
///
/// Tries a rename first and falls back to copy + remove when the rename
/// fails (for example across filesystems).
pub async fn move_dir(src: &Path, dst: &Path) -> io::Result<()> {
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    match tokio::fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!(
                "rename {:?} -> {:?} failed ({}), copying instead",
                src, dst, e
            );
            copy_dir(src, dst).await?;
            tokio::fs::remove_dir_all(src).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_entries_missing_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = list_entries(&dir.path().join("nope")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_entries_keeps_non_utf8_names() {
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::TempDir::new().unwrap();
        let name = std::ffi::OsStr::from_bytes(b"orph\xffan");
        std::fs::write(dir.path().join(name), b"x").unwrap();
        std::fs::write(dir.path().join("plain"), b"y").unwrap();

        let names = list_entries(dir.path()).await.unwrap();
        assert_eq!(names, vec![OsString::from(name), OsString::from("plain")]);
    }

    #[tokio::test]
    async fn test_list_and_remove_entries() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("b"), b"1").unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        std::fs::write(dir.path().join("a").join("inner"), b"2").unwrap();

        assert_eq!(
            list_entries(dir.path()).await.unwrap(),
            vec![OsString::from("a"), OsString::from("b")]
        );

        assert!(remove_entry(&dir.path().join("a")).await.unwrap());
        assert!(remove_entry(&dir.path().join("b")).await.unwrap());
        assert!(!remove_entry(&dir.path().join("b")).await.unwrap());
        assert!(list_entries(dir.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_copy_and_move_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("nested")).unwrap();
        std::fs::write(src.join("top"), b"top").unwrap();
        std::fs::write(src.join("nested").join("deep"), b"deep").unwrap();

        let copy = dir.path().join("copy");
        copy_dir(&src, &copy).await.unwrap();
        assert_eq!(std::fs::read(copy.join("nested").join("deep")).unwrap(), b"deep");
        assert!(src.exists());

        let moved = dir.path().join("out").join("moved");
        move_dir(&src, &moved).await.unwrap();
        assert!(!src.exists());
        assert_eq!(std::fs::read(moved.join("top")).unwrap(), b"top");
    }
}
