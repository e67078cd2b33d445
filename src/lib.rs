//! hoard - tenant storage and credential lifecycle
//!
//! The part of a self-hosted file, pastebin and short URL host that owns
//! tenants: their blob directories, storage accounting, disk/database
//! reconciliation, sealed credentials, master key rotation and installation
//! backups.

pub mod auth;
pub mod backup;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod storage;
pub mod tenant;

pub use auth::AuthMode;
pub use backup::{BackupExporter, BackupImporter, ImportSummary, ValidationReport};
pub use config::Config;
pub use crypto::MasterKey;
pub use db::{Database, NewTenant, TenantRecord, TenantUpdate};
pub use error::{HoardError, Result};
pub use scheduler::{ManualScheduler, Scheduler, TokioScheduler};
pub use storage::DataPaths;
pub use tenant::{
    PartialRotation, ResourceRef, RotationCheckpoint, RotationReport, TenantHandle, TenantService,
    TenantState, UpdateOptions,
};
