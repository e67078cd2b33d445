//! Installation backup import and export.
//!
//! An archive directory holds `manifest.json`, `files/` and, from manifest
//! version 4.0.0 on, `paste-bins/`. Import runs in two phases:
//!
//! 1. Validate: the version tag picks a validator; every entity of every
//!    category is checked and all failures are collected into a
//!    [`ValidationReport`]. Any failure aborts before anything is touched.
//! 2. Apply: one transaction replaces every table, then the blob roots are
//!    swapped for the archive's directories.

mod apply;
mod export;
pub mod manifest;
mod v3;
mod v4;

pub use export::BackupExporter;
pub use manifest::{ImportPlan, Manifest, CURRENT_VERSION, SUPPORTED_VERSIONS};

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::crypto::MasterKey;
use crate::storage::DataPaths;
use crate::{HoardError, Result};

/// File name of the manifest inside an archive directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Report category for manifest-level problems.
pub const MANIFEST_CATEGORY: &str = "manifest";

/// One failed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Position within the category, -1 for the category itself.
    pub index: i64,
    /// Error code, e.g. `INVALID_EMBED_COLOR`.
    pub error: String,
}

/// Validation failures keyed by category.
///
/// Serializes as `{category: [{index, error}]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationReport(BTreeMap<String, Vec<FieldError>>);

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure.
    pub fn push(&mut self, category: &str, index: i64, error: &str) {
        self.0
            .entry(category.to_string())
            .or_default()
            .push(FieldError {
                index,
                error: error.to_string(),
            });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Failures of one category.
    pub fn category(&self, category: &str) -> Option<&[FieldError]> {
        self.0.get(category).map(Vec::as_slice)
    }

    /// Names of the failed categories.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Total number of failures.
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// `Ok(())` when empty, otherwise `InvalidBackup`.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(HoardError::InvalidBackup(self))
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{} error(s)", self.len()),
        }
    }
}

/// Counts of what an import wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub version: String,
    pub tenants: usize,
    pub api_tokens: usize,
    pub files: usize,
    pub pastebins: usize,
    pub short_urls: usize,
    pub audit_logs: usize,
    pub invites: usize,
    pub signup_domains: usize,
}

/// Restores an installation from an archive directory.
pub struct BackupImporter<'a> {
    pool: &'a SqlitePool,
    paths: &'a DataPaths,
    key: &'a MasterKey,
}

impl<'a> BackupImporter<'a> {
    pub fn new(pool: &'a SqlitePool, paths: &'a DataPaths, key: &'a MasterKey) -> Self {
        Self { pool, paths, key }
    }

    /// Read and validate the manifest without touching anything.
    pub async fn validate(&self, archive: &Path) -> Result<ImportPlan> {
        let raw = tokio::fs::read_to_string(archive.join(MANIFEST_FILE)).await?;

        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("backup manifest in {:?} is not valid JSON: {}", archive, e);
                let mut report = ValidationReport::new();
                report.push(MANIFEST_CATEGORY, -1, "INVALID_JSON");
                return Err(HoardError::InvalidBackup(report));
            }
        };

        let manifest = Manifest::from_json(value)?;
        info!(
            "Validating backup manifest version {} from {:?}",
            manifest.version(),
            archive
        );
        manifest.validate(self.key)
    }

    /// Validate, then replace the database contents and blob trees.
    pub async fn import(&self, archive: &Path) -> Result<ImportSummary> {
        let plan = match self.validate(archive).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!("backup import from {:?} rejected: {}", archive, e);
                return Err(e);
            }
        };

        let summary = apply::apply(self.pool, self.paths, archive, &plan).await?;
        info!(
            "Imported backup version {}: {} tenant(s), {} file(s), {} pastebin(s)",
            summary.version, summary.tenants, summary.files, summary.pastebins
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serializes_by_category() {
        let mut report = ValidationReport::new();
        report.push("users", 2, "INVALID_EMBED_COLOR");
        report.push("files", 0, "UNKNOWN_TENANT");
        report.push("users", 3, "INVALID_ID");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "files": [{"index": 0, "error": "UNKNOWN_TENANT"}],
                "users": [
                    {"index": 2, "error": "INVALID_EMBED_COLOR"},
                    {"index": 3, "error": "INVALID_ID"}
                ]
            })
        );
        assert_eq!(report.len(), 3);
        assert_eq!(report.categories().collect::<Vec<_>>(), vec!["files", "users"]);
    }

    #[test]
    fn test_report_display_is_json() {
        let mut report = ValidationReport::new();
        report.push("users", 0, "INVALID_ID");
        assert_eq!(
            report.to_string(),
            r#"{"users":[{"index":0,"error":"INVALID_ID"}]}"#
        );
    }

    #[test]
    fn test_into_result() {
        assert!(ValidationReport::new().into_result().is_ok());

        let mut report = ValidationReport::new();
        report.push("invites", -1, "NOT_AN_ARRAY");
        assert!(matches!(
            report.into_result(),
            Err(HoardError::InvalidBackup(_))
        ));
    }
}
