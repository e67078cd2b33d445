//! Error types for hoard.

use thiserror::Error;

use crate::backup::ValidationReport;
use crate::tenant::PartialRotation;

/// Common error type for hoard.
#[derive(Error, Debug)]
pub enum HoardError {
    /// Database error.
    ///
    /// Errors from sqlx are converted into this variant.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A tenant with the same id already exists.
    #[error("tenant already exists: {0}")]
    Conflict(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// The tenant is disabled and the operation is blocked.
    #[error("tenant is disabled: {0}")]
    Disabled(String),

    /// Validation error for caller input.
    #[error("validation error: {0}")]
    Validation(String),

    /// A backup manifest failed validation.
    ///
    /// Carries the itemized per-category report. Nothing has been mutated.
    #[error("backup validation failed: {0}")]
    InvalidBackup(ValidationReport),

    /// The backup manifest declares a version no importer handles.
    #[error("unsupported backup manifest: {0}")]
    UnsupportedManifest(String),

    /// Encryption or decryption failure.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Credential rotation stopped before every secret was moved to the new key.
    #[error("{0}")]
    PartialRotation(Box<PartialRotation>),

    /// Storing the upload would exceed the tenant's storage quota.
    #[error("storage quota exceeded: {used} + {incoming} bytes > {quota} bytes")]
    QuotaExceeded { used: u64, incoming: u64, quota: u64 },

    /// A single upload exceeds the tenant's upload-size limit.
    #[error("upload too large: {size} bytes > {limit} bytes")]
    UploadTooLarge { size: u64, limit: u64 },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl HoardError {
    /// Whether this error means the tenant is suspended rather than missing.
    pub fn is_disabled(&self) -> bool {
        matches!(self, HoardError::Disabled(_))
    }
}

impl From<sqlx::Error> for HoardError {
    fn from(e: sqlx::Error) -> Self {
        HoardError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for HoardError {
    fn from(e: serde_json::Error) -> Self {
        HoardError::Validation(format!("JSON error: {e}"))
    }
}

/// Result type alias for hoard operations.
pub type Result<T> = std::result::Result<T, HoardError>;
