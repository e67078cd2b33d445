//! Tenant model for hoard.
//!
//! This module defines the persisted tenant row and the builders used to
//! create and patch it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use thiserror::Error;

/// Embed color given to new and reset tenants.
pub const DEFAULT_EMBED_COLOR: &str = "#2f3136";

/// Audit retention given to new and reset tenants.
pub const DEFAULT_AUDIT_RETENTION_DAYS: i64 = 30;

/// A stored enum value that no variant matches.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// How the extension list is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtensionMode {
    /// Only listed extensions may be uploaded.
    Allow,
    /// Listed extensions are rejected.
    #[default]
    Deny,
}

impl ExtensionMode {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionMode::Allow => "allow",
            ExtensionMode::Deny => "deny",
        }
    }
}

impl fmt::Display for ExtensionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtensionMode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(ExtensionMode::Allow),
            "deny" => Ok(ExtensionMode::Deny),
            _ => Err(UnknownVariant::new("extension mode", s)),
        }
    }
}

impl TryFrom<String> for ExtensionMode {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// How stored names are generated for uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameStrategy {
    #[default]
    Random,
    Uuid,
    Original,
    Date,
}

impl NameStrategy {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            NameStrategy::Random => "random",
            NameStrategy::Uuid => "uuid",
            NameStrategy::Original => "original",
            NameStrategy::Date => "date",
        }
    }
}

impl fmt::Display for NameStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NameStrategy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(NameStrategy::Random),
            "uuid" => Ok(NameStrategy::Uuid),
            "original" => Ok(NameStrategy::Original),
            "date" => Ok(NameStrategy::Date),
            _ => Err(UnknownVariant::new("name strategy", s)),
        }
    }
}

impl TryFrom<String> for NameStrategy {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Check a `#rrggbb` color string.
pub fn is_valid_embed_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// A persisted tenant.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TenantRecord {
    /// Unique, immutable tenant id.
    pub id: String,
    /// Private directory id (uuid v4).
    pub path_id: String,
    pub created_at: DateTime<Utc>,
    pub disabled: bool,
    /// Bytes, 0 = unlimited.
    pub storage_quota: i64,
    /// Bytes per upload, 0 = unlimited.
    pub upload_limit: i64,
    pub extensions: Json<Vec<String>>,
    #[sqlx(try_from = "String")]
    pub extension_mode: ExtensionMode,
    #[sqlx(try_from = "String")]
    pub name_strategy: NameStrategy,
    pub embed_color: String,
    pub audit_retention_days: i64,
    /// Password hash or TOTP seed, sealed under the master key.
    pub auth_secret: Option<String>,
    /// SHA-256 digests of the unused backup codes.
    pub backup_codes: Json<Vec<String>>,
}

impl TenantRecord {
    /// Storage quota in bytes, `None` when unlimited.
    pub fn quota(&self) -> Option<u64> {
        (self.storage_quota > 0).then_some(self.storage_quota as u64)
    }

    /// Per-upload limit in bytes, `None` when unlimited.
    pub fn upload_limit(&self) -> Option<u64> {
        (self.upload_limit > 0).then_some(self.upload_limit as u64)
    }
}

/// Data for creating a new tenant.
#[derive(Debug, Clone)]
pub struct NewTenant {
    pub id: String,
    pub storage_quota: i64,
    pub upload_limit: i64,
    pub extensions: Vec<String>,
    pub extension_mode: ExtensionMode,
    pub name_strategy: NameStrategy,
    pub embed_color: String,
    pub audit_retention_days: i64,
}

impl NewTenant {
    /// Create a new tenant with default settings.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            storage_quota: 0,
            upload_limit: 0,
            extensions: Vec::new(),
            extension_mode: ExtensionMode::default(),
            name_strategy: NameStrategy::default(),
            embed_color: DEFAULT_EMBED_COLOR.to_string(),
            audit_retention_days: DEFAULT_AUDIT_RETENTION_DAYS,
        }
    }

    /// Set the storage quota in bytes.
    pub fn with_storage_quota(mut self, bytes: u64) -> Self {
        self.storage_quota = bytes as i64;
        self
    }

    /// Set the per-upload limit in bytes.
    pub fn with_upload_limit(mut self, bytes: u64) -> Self {
        self.upload_limit = bytes as i64;
        self
    }

    /// Set the extension list and how it applies.
    pub fn with_extensions(mut self, mode: ExtensionMode, extensions: Vec<String>) -> Self {
        self.extension_mode = mode;
        self.extensions = extensions;
        self
    }

    /// Set the naming strategy.
    pub fn with_name_strategy(mut self, strategy: NameStrategy) -> Self {
        self.name_strategy = strategy;
        self
    }

    /// Set the embed color.
    pub fn with_embed_color(mut self, color: impl Into<String>) -> Self {
        self.embed_color = color.into();
        self
    }

    /// Set how long audit entries are kept.
    pub fn with_audit_retention_days(mut self, days: i64) -> Self {
        self.audit_retention_days = days;
        self
    }

    /// Check field constraints.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("tenant id must not be empty".to_string());
        }
        check_settings(
            Some(self.storage_quota),
            Some(self.upload_limit),
            Some(&self.embed_color),
            Some(self.audit_retention_days),
        )
    }
}

/// Data for updating an existing tenant.
#[derive(Debug, Clone, Default)]
pub struct TenantUpdate {
    pub disabled: Option<bool>,
    pub storage_quota: Option<i64>,
    pub upload_limit: Option<i64>,
    pub extensions: Option<Vec<String>>,
    pub extension_mode: Option<ExtensionMode>,
    pub name_strategy: Option<NameStrategy>,
    pub embed_color: Option<String>,
    pub audit_retention_days: Option<i64>,
}

impl TenantUpdate {
    /// Create an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set disabled status.
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = Some(disabled);
        self
    }

    /// Set new storage quota.
    pub fn storage_quota(mut self, bytes: u64) -> Self {
        self.storage_quota = Some(bytes as i64);
        self
    }

    /// Set new upload limit.
    pub fn upload_limit(mut self, bytes: u64) -> Self {
        self.upload_limit = Some(bytes as i64);
        self
    }

    /// Set new extension list.
    pub fn extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    /// Set new extension mode.
    pub fn extension_mode(mut self, mode: ExtensionMode) -> Self {
        self.extension_mode = Some(mode);
        self
    }

    /// Set new naming strategy.
    pub fn name_strategy(mut self, strategy: NameStrategy) -> Self {
        self.name_strategy = Some(strategy);
        self
    }

    /// Set new embed color.
    pub fn embed_color(mut self, color: impl Into<String>) -> Self {
        self.embed_color = Some(color.into());
        self
    }

    /// Set new audit retention.
    pub fn audit_retention_days(mut self, days: i64) -> Self {
        self.audit_retention_days = Some(days);
        self
    }

    /// Check if any fields are set.
    pub fn is_empty(&self) -> bool {
        self.disabled.is_none()
            && self.storage_quota.is_none()
            && self.upload_limit.is_none()
            && self.extensions.is_none()
            && self.extension_mode.is_none()
            && self.name_strategy.is_none()
            && self.embed_color.is_none()
            && self.audit_retention_days.is_none()
    }

    /// Whether the patch changes the disabled flag.
    pub fn touches_disabled(&self) -> bool {
        self.disabled.is_some()
    }

    /// Check field constraints.
    pub fn validate(&self) -> Result<(), String> {
        check_settings(
            self.storage_quota,
            self.upload_limit,
            self.embed_color.as_deref(),
            self.audit_retention_days,
        )
    }
}

fn check_settings(
    storage_quota: Option<i64>,
    upload_limit: Option<i64>,
    embed_color: Option<&str>,
    audit_retention_days: Option<i64>,
) -> Result<(), String> {
    if storage_quota.is_some_and(|q| q < 0) {
        return Err("storage quota must not be negative".to_string());
    }
    if upload_limit.is_some_and(|l| l < 0) {
        return Err("upload limit must not be negative".to_string());
    }
    if let Some(color) = embed_color {
        if !is_valid_embed_color(color) {
            return Err(format!("invalid embed color: {color}"));
        }
    }
    if audit_retention_days.is_some_and(|d| d < 0) {
        return Err("audit retention must not be negative".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_mode_round_trip() {
        for mode in [ExtensionMode::Allow, ExtensionMode::Deny] {
            assert_eq!(mode.as_str().parse::<ExtensionMode>().unwrap(), mode);
        }
        assert!("block".parse::<ExtensionMode>().is_err());
    }

    #[test]
    fn test_name_strategy_from_string() {
        assert_eq!(
            NameStrategy::try_from("original".to_string()).unwrap(),
            NameStrategy::Original
        );
        let err = NameStrategy::try_from("sequential".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "unknown name strategy: sequential");
    }

    #[test]
    fn test_embed_color() {
        assert!(is_valid_embed_color("#2f3136"));
        assert!(is_valid_embed_color("#ABCDEF"));
        assert!(!is_valid_embed_color("2f3136"));
        assert!(!is_valid_embed_color("#2f313"));
        assert!(!is_valid_embed_color("#2f313g"));
    }

    #[test]
    fn test_new_tenant_defaults() {
        let tenant = NewTenant::new("alice");
        assert_eq!(tenant.storage_quota, 0);
        assert_eq!(tenant.extension_mode, ExtensionMode::Deny);
        assert_eq!(tenant.name_strategy, NameStrategy::Random);
        assert_eq!(tenant.embed_color, DEFAULT_EMBED_COLOR);
        assert!(tenant.validate().is_ok());
    }

    #[test]
    fn test_new_tenant_validation() {
        assert!(NewTenant::new("  ").validate().is_err());
        assert!(NewTenant::new("bob")
            .with_embed_color("red")
            .validate()
            .is_err());
    }

    #[test]
    fn test_update_is_empty() {
        assert!(TenantUpdate::new().is_empty());
        assert!(!TenantUpdate::new().storage_quota(10).is_empty());
        assert!(TenantUpdate::new().disabled(true).touches_disabled());
        assert!(!TenantUpdate::new().embed_color("#000000").touches_disabled());
    }

    #[test]
    fn test_update_validation() {
        assert!(TenantUpdate::new().embed_color("#00000").validate().is_err());
        assert!(TenantUpdate::new()
            .audit_retention_days(-1)
            .validate()
            .is_err());
        assert!(TenantUpdate::new().storage_quota(5).validate().is_ok());
    }
}
