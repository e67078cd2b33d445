//! Backup manifest format.
//!
//! The manifest is a JSON object tagged with a `version`. The tag is read
//! before anything else and selects exactly one validator; there is no
//! implicit upgrade between versions. Every validator produces the same
//! [`ImportPlan`].
//!
//! | category        | 3.0.0 | 4.0.0 |
//! |-----------------|-------|-------|
//! | `users`         | yes (no `embedColor`) | yes |
//! | `files`         | yes   | yes   |
//! | `pastebins`     |       | yes   |
//! | `shortUrls`     |       | yes   |
//! | `auditLogs`     | yes   | yes   |
//! | `invites`       | yes   | yes   |
//! | `signupDomains` |       | yes   |

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::types::Json;

use super::{v3, v4, ValidationReport, MANIFEST_CATEGORY};
use crate::crypto::MasterKey;
use crate::db::{
    is_valid_embed_color, AuditCategory, ExtensionMode, Invite, NameStrategy, NewResource,
    NewShortUrl, TenantRecord, DEFAULT_EMBED_COLOR,
};
use crate::{HoardError, Result};

/// Version written by the exporter.
pub const CURRENT_VERSION: &str = v4::VERSION;

/// Every version an importer exists for.
pub const SUPPORTED_VERSIONS: &[&str] = &[v3::VERSION, v4::VERSION];

pub(super) const USERS: &str = "users";
pub(super) const FILES: &str = "files";
pub(super) const PASTEBINS: &str = "pastebins";
pub(super) const SHORT_URLS: &str = "shortUrls";
pub(super) const AUDIT_LOGS: &str = "auditLogs";
pub(super) const INVITES: &str = "invites";
pub(super) const SIGNUP_DOMAINS: &str = "signupDomains";

/// A manifest whose version tag has been recognized.
#[derive(Debug, Clone)]
pub enum Manifest {
    V3(Map<String, Value>),
    V4(Map<String, Value>),
}

impl Manifest {
    /// Dispatch on the version tag.
    pub fn from_json(value: Value) -> Result<Self> {
        let Value::Object(root) = value else {
            return Err(HoardError::UnsupportedManifest(
                "manifest is not a JSON object".to_string(),
            ));
        };

        match root.get("version") {
            Some(Value::String(tag)) if tag == v3::VERSION => Ok(Manifest::V3(root)),
            Some(Value::String(tag)) if tag == v4::VERSION => Ok(Manifest::V4(root)),
            Some(Value::String(tag)) => Err(HoardError::UnsupportedManifest(format!(
                "version {tag} (supported: {})",
                SUPPORTED_VERSIONS.join(", ")
            ))),
            Some(_) => Err(HoardError::UnsupportedManifest(
                "version tag is not a string".to_string(),
            )),
            None => Err(HoardError::UnsupportedManifest(
                "missing version tag".to_string(),
            )),
        }
    }

    pub fn version(&self) -> &'static str {
        match self {
            Manifest::V3(_) => v3::VERSION,
            Manifest::V4(_) => v4::VERSION,
        }
    }

    /// Run this version's validator.
    pub fn validate(&self, key: &MasterKey) -> Result<ImportPlan> {
        match self {
            Manifest::V3(root) => v3::validate(root, key),
            Manifest::V4(root) => v4::validate(root, key),
        }
    }
}

/// An API token restored with its tenant.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedToken {
    pub tenant_id: String,
    pub name: String,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
}

/// An audit entry to restore.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedAuditLog {
    pub tenant_id: Option<String>,
    pub category: AuditCategory,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Fully validated contents of a manifest, ready to apply.
#[derive(Debug, Clone, Default)]
pub struct ImportPlan {
    pub version: &'static str,
    pub tenants: Vec<TenantRecord>,
    pub api_tokens: Vec<PlannedToken>,
    pub files: Vec<NewResource>,
    pub pastebins: Vec<NewResource>,
    pub short_urls: Vec<NewShortUrl>,
    pub audit_logs: Vec<PlannedAuditLog>,
    pub invites: Vec<Invite>,
    pub signup_domains: Vec<String>,
    /// Whether the archive carries a `paste-bins/` tree.
    pub includes_pastebins: bool,
}

/// Manifest document written by the exporter, always [`CURRENT_VERSION`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDocument {
    pub version: String,
    pub master_key_fingerprint: String,
    pub exported_at: DateTime<Utc>,
    pub users: Vec<UserEntry>,
    pub files: Vec<ResourceEntry>,
    pub pastebins: Vec<ResourceEntry>,
    pub short_urls: Vec<ShortUrlEntry>,
    pub audit_logs: Vec<AuditEntry>,
    pub invites: Vec<InviteEntry>,
    pub signup_domains: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntry {
    pub id: String,
    pub path_id: String,
    pub created_at: DateTime<Utc>,
    pub disabled: bool,
    pub storage_quota: i64,
    pub upload_limit: i64,
    pub extensions: Vec<String>,
    pub extension_mode: String,
    pub name_strategy: String,
    pub embed_color: String,
    pub audit_retention_days: i64,
    pub auth_secret: Option<String>,
    pub backup_codes: Vec<String>,
    pub api_tokens: Vec<TokenEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenEntry {
    pub name: String,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEntry {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub size: i64,
    pub password: Option<String>,
    pub public: bool,
    pub views: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortUrlEntry {
    pub id: String,
    pub tenant_id: String,
    pub target: String,
    pub visits: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub tenant_id: Option<String>,
    pub category: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteEntry {
    pub code: String,
    pub created_by: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub used: bool,
}

/// Field-by-field reader over one entity object.
///
/// Each accessor returns `None` and records the code when the field is
/// missing or malformed; reading continues so every bad field is reported.
pub(super) struct Fields<'a> {
    obj: &'a Map<String, Value>,
    errors: Vec<&'static str>,
}

impl<'a> Fields<'a> {
    pub(super) fn new(obj: &'a Map<String, Value>) -> Self {
        Self {
            obj,
            errors: Vec::new(),
        }
    }

    pub(super) fn fail(&mut self, code: &'static str) {
        if !self.errors.contains(&code) {
            self.errors.push(code);
        }
    }

    fn check<T>(&mut self, value: Option<T>, code: &'static str) -> Option<T> {
        if value.is_none() {
            self.fail(code);
        }
        value
    }

    pub(super) fn string(&mut self, key: &str, code: &'static str) -> Option<String> {
        let value = self.obj.get(key).and_then(Value::as_str).map(str::to_string);
        self.check(value, code)
    }

    pub(super) fn non_empty(&mut self, key: &str, code: &'static str) -> Option<String> {
        let value = self
            .obj
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string);
        self.check(value, code)
    }

    /// Missing and `null` both read as `Some(None)`.
    pub(super) fn nullable_string(
        &mut self,
        key: &str,
        code: &'static str,
    ) -> Option<Option<String>> {
        let value = match self.obj.get(key) {
            None | Some(Value::Null) => Some(None),
            Some(Value::String(s)) => Some(Some(s.clone())),
            Some(_) => None,
        };
        self.check(value, code)
    }

    pub(super) fn bool(&mut self, key: &str, code: &'static str) -> Option<bool> {
        let value = self.obj.get(key).and_then(Value::as_bool);
        self.check(value, code)
    }

    /// Non-negative integer that fits an SQLite INTEGER.
    pub(super) fn count(&mut self, key: &str, code: &'static str) -> Option<i64> {
        let value = self
            .obj
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|n| i64::try_from(n).ok());
        self.check(value, code)
    }

    pub(super) fn timestamp(&mut self, key: &str, code: &'static str) -> Option<DateTime<Utc>> {
        let value = self.obj.get(key).and_then(Value::as_str).and_then(parse_timestamp);
        self.check(value, code)
    }

    pub(super) fn nullable_timestamp(
        &mut self,
        key: &str,
        code: &'static str,
    ) -> Option<Option<DateTime<Utc>>> {
        let value = match self.obj.get(key) {
            None | Some(Value::Null) => Some(None),
            Some(Value::String(s)) => parse_timestamp(s).map(Some),
            Some(_) => None,
        };
        self.check(value, code)
    }

    pub(super) fn string_list(&mut self, key: &str, code: &'static str) -> Option<Vec<String>> {
        let value = self.obj.get(key).and_then(Value::as_array).and_then(|items| {
            items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
        });
        self.check(value, code)
    }

    pub(super) fn parsed<T: FromStr>(&mut self, key: &str, code: &'static str) -> Option<T> {
        let value = self
            .obj
            .get(key)
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok());
        self.check(value, code)
    }

    pub(super) fn raw(&self, key: &str) -> Option<&'a Value> {
        self.obj.get(key)
    }

    /// Flush the collected codes into the report. Returns true if clean.
    pub(super) fn finish(self, report: &mut ValidationReport, category: &str, index: usize) -> bool {
        let clean = self.errors.is_empty();
        for code in self.errors {
            report.push(category, index as i64, code);
        }
        clean
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Usable as a single path component.
pub(super) fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\', '\0'])
}

/// Objects of one category.
///
/// A missing category reads as empty. A non-array category is reported as
/// `NOT_AN_ARRAY` at index -1, a non-object element as `NOT_AN_OBJECT`.
pub(super) fn entities<'v>(
    root: &'v Map<String, Value>,
    category: &str,
    report: &mut ValidationReport,
) -> Vec<(usize, &'v Map<String, Value>)> {
    match root.get(category) {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| match item {
                Value::Object(obj) => Some((i, obj)),
                _ => {
                    report.push(category, i as i64, "NOT_AN_OBJECT");
                    None
                }
            })
            .collect(),
        Some(_) => {
            report.push(category, -1, "NOT_AN_ARRAY");
            Vec::new()
        }
    }
}

/// Check the manifest was written under the installation's key.
pub(super) fn check_fingerprint(
    root: &Map<String, Value>,
    key: &MasterKey,
    report: &mut ValidationReport,
) {
    match root.get("masterKeyFingerprint").and_then(Value::as_str) {
        Some(fingerprint) if fingerprint == key.fingerprint() => {}
        Some(_) => report.push(MANIFEST_CATEGORY, -1, "MASTER_KEY_MISMATCH"),
        None => report.push(MANIFEST_CATEGORY, -1, "INVALID_FINGERPRINT"),
    }
}

/// How a version treats `users[].embedColor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum EmbedColorField {
    /// Not part of the schema; tenants get the default.
    Absent,
    /// Must be present and `#rrggbb`.
    Required,
}

/// Validated users and their API tokens.
pub(super) struct Users {
    pub tenants: Vec<TenantRecord>,
    pub api_tokens: Vec<PlannedToken>,
    /// Every id that parsed, valid entity or not.
    pub known_ids: HashSet<String>,
}

pub(super) fn read_users(
    root: &Map<String, Value>,
    key: &MasterKey,
    embed_color: EmbedColorField,
    report: &mut ValidationReport,
) -> Users {
    let mut users = Users {
        tenants: Vec::new(),
        api_tokens: Vec::new(),
        known_ids: HashSet::new(),
    };
    let mut path_ids = HashSet::new();
    let mut token_hashes = HashSet::new();

    for (index, obj) in entities(root, USERS, report) {
        let mut f = Fields::new(obj);

        let id = f.non_empty("id", "INVALID_ID");
        if let Some(ref id) = id {
            if !users.known_ids.insert(id.clone()) {
                f.fail("DUPLICATE_ID");
            }
        }

        let path_id = f
            .string("pathId", "INVALID_PATH_ID")
            .filter(|p| uuid::Uuid::parse_str(p).is_ok() && path_ids.insert(p.clone()));
        if path_id.is_none() {
            f.fail("INVALID_PATH_ID");
        }

        let created_at = f.timestamp("createdAt", "INVALID_CREATED_AT");
        let disabled = f.bool("disabled", "INVALID_DISABLED");
        let storage_quota = f.count("storageQuota", "INVALID_STORAGE_QUOTA");
        let upload_limit = f.count("uploadLimit", "INVALID_UPLOAD_LIMIT");
        let extensions = f.string_list("extensions", "INVALID_EXTENSIONS");
        let extension_mode = f.parsed::<ExtensionMode>("extensionMode", "INVALID_EXTENSION_MODE");
        let name_strategy = f.parsed::<NameStrategy>("nameStrategy", "INVALID_NAME_STRATEGY");

        let embed = match embed_color {
            EmbedColorField::Absent => Some(DEFAULT_EMBED_COLOR.to_string()),
            EmbedColorField::Required => {
                let color = f
                    .raw("embedColor")
                    .and_then(Value::as_str)
                    .filter(|c| is_valid_embed_color(c))
                    .map(str::to_string);
                if color.is_none() {
                    f.fail("INVALID_EMBED_COLOR");
                }
                color
            }
        };

        let audit_retention = f.count("auditRetentionDays", "INVALID_AUDIT_RETENTION");

        let auth_secret = f
            .nullable_string("authSecret", "INVALID_AUTH_SECRET")
            .filter(|s| s.as_deref().map_or(true, |sealed| key.opens(sealed)));
        if auth_secret.is_none() {
            f.fail("INVALID_AUTH_SECRET");
        }

        let backup_codes = f
            .string_list("backupCodes", "INVALID_BACKUP_CODES")
            .filter(|codes| codes.iter().all(|c| is_sha256_hex(c)));
        if backup_codes.is_none() {
            f.fail("INVALID_BACKUP_CODES");
        }

        // Token hashes are unique across every user.
        let tokens = read_tokens(f.raw("apiTokens")).filter(|tokens| {
            tokens
                .iter()
                .fold(true, |unique, (_, hash, _)| token_hashes.insert(hash.clone()) && unique)
        });
        if tokens.is_none() {
            f.fail("INVALID_API_TOKENS");
        }

        if !f.finish(report, USERS, index) {
            continue;
        }

        if let (
            Some(id),
            Some(path_id),
            Some(created_at),
            Some(disabled),
            Some(storage_quota),
            Some(upload_limit),
            Some(extensions),
            Some(extension_mode),
            Some(name_strategy),
            Some(embed_color),
            Some(audit_retention_days),
            Some(auth_secret),
            Some(backup_codes),
            Some(tokens),
        ) = (
            id,
            path_id,
            created_at,
            disabled,
            storage_quota,
            upload_limit,
            extensions,
            extension_mode,
            name_strategy,
            embed,
            audit_retention,
            auth_secret,
            backup_codes,
            tokens,
        ) {
            users
                .api_tokens
                .extend(tokens.into_iter().map(|(name, token_hash, created_at)| PlannedToken {
                    tenant_id: id.clone(),
                    name,
                    token_hash,
                    created_at,
                }));
            users.tenants.push(TenantRecord {
                id,
                path_id,
                created_at,
                disabled,
                storage_quota,
                upload_limit,
                extensions: Json(extensions),
                extension_mode,
                name_strategy,
                embed_color,
                audit_retention_days,
                auth_secret,
                backup_codes: Json(backup_codes),
            });
        }
    }

    users
}

/// `apiTokens`: missing reads as none; otherwise an array of
/// `{name, tokenHash, createdAt}`.
fn read_tokens(value: Option<&Value>) -> Option<Vec<(String, String, DateTime<Utc>)>> {
    let items = match value {
        None | Some(Value::Null) => return Some(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return None,
    };

    items
        .iter()
        .map(|item| {
            let obj = item.as_object()?;
            let name = obj.get("name")?.as_str()?.to_string();
            let hash = obj
                .get("tokenHash")?
                .as_str()
                .filter(|h| is_sha256_hex(h))?
                .to_string();
            let created_at = parse_timestamp(obj.get("createdAt")?.as_str()?)?;
            Some((name, hash, created_at))
        })
        .collect()
}

/// Files or pastebins.
pub(super) fn read_resources(
    root: &Map<String, Value>,
    category: &str,
    known_tenants: &HashSet<String>,
    key: &MasterKey,
    report: &mut ValidationReport,
) -> Vec<NewResource> {
    let mut resources = Vec::new();
    let mut seen = HashSet::new();

    for (index, obj) in entities(root, category, report) {
        let mut f = Fields::new(obj);

        let id = f
            .string("id", "INVALID_ID")
            .filter(|id| is_safe_id(id));
        match id {
            None => f.fail("INVALID_ID"),
            Some(ref id) if !seen.insert(id.clone()) => f.fail("DUPLICATE_ID"),
            Some(_) => {}
        }

        let tenant_id = f.non_empty("tenantId", "INVALID_TENANT_ID");
        if let Some(ref tenant_id) = tenant_id {
            if !known_tenants.contains(tenant_id) {
                f.fail("UNKNOWN_TENANT");
            }
        }

        let name = f.string("name", "INVALID_NAME");
        let size = f.count("size", "INVALID_SIZE");

        let password = f
            .nullable_string("password", "INVALID_PASSWORD")
            .filter(|p| p.as_deref().map_or(true, |sealed| key.opens(sealed)));
        if password.is_none() {
            f.fail("INVALID_PASSWORD");
        }

        let public = f.bool("public", "INVALID_PUBLIC");
        let views = f.count("views", "INVALID_VIEWS");
        let created_at = f.timestamp("createdAt", "INVALID_CREATED_AT");

        if !f.finish(report, category, index) {
            continue;
        }

        if let (
            Some(id),
            Some(tenant_id),
            Some(name),
            Some(size),
            Some(password),
            Some(public),
            Some(views),
            Some(created_at),
        ) = (id, tenant_id, name, size, password, public, views, created_at)
        {
            resources.push(NewResource {
                id,
                tenant_id,
                name,
                size,
                password,
                public,
                views,
                created_at,
            });
        }
    }

    resources
}

pub(super) fn read_short_urls(
    root: &Map<String, Value>,
    known_tenants: &HashSet<String>,
    report: &mut ValidationReport,
) -> Vec<NewShortUrl> {
    let mut urls = Vec::new();
    let mut seen = HashSet::new();

    for (index, obj) in entities(root, SHORT_URLS, report) {
        let mut f = Fields::new(obj);

        let id = f.non_empty("id", "INVALID_ID");
        if let Some(ref id) = id {
            if !seen.insert(id.clone()) {
                f.fail("DUPLICATE_ID");
            }
        }

        let tenant_id = f.non_empty("tenantId", "INVALID_TENANT_ID");
        if let Some(ref tenant_id) = tenant_id {
            if !known_tenants.contains(tenant_id) {
                f.fail("UNKNOWN_TENANT");
            }
        }

        let target = f.non_empty("target", "INVALID_TARGET");
        let visits = f.count("visits", "INVALID_VISITS");
        let created_at = f.timestamp("createdAt", "INVALID_CREATED_AT");

        if !f.finish(report, SHORT_URLS, index) {
            continue;
        }

        if let (Some(id), Some(tenant_id), Some(target), Some(visits), Some(created_at)) =
            (id, tenant_id, target, visits, created_at)
        {
            urls.push(NewShortUrl {
                id,
                tenant_id,
                target,
                visits,
                created_at,
            });
        }
    }

    urls
}

pub(super) fn read_audit_logs(
    root: &Map<String, Value>,
    report: &mut ValidationReport,
) -> Vec<PlannedAuditLog> {
    let mut logs = Vec::new();

    for (index, obj) in entities(root, AUDIT_LOGS, report) {
        let mut f = Fields::new(obj);

        let tenant_id = f.nullable_string("tenantId", "INVALID_TENANT_ID");
        let category = f.parsed::<AuditCategory>("category", "INVALID_CATEGORY");
        let message = f.string("message", "INVALID_MESSAGE");
        let created_at = f.timestamp("createdAt", "INVALID_CREATED_AT");

        if !f.finish(report, AUDIT_LOGS, index) {
            continue;
        }

        if let (Some(tenant_id), Some(category), Some(message), Some(created_at)) =
            (tenant_id, category, message, created_at)
        {
            logs.push(PlannedAuditLog {
                tenant_id,
                category,
                message,
                created_at,
            });
        }
    }

    logs
}

pub(super) fn read_invites(
    root: &Map<String, Value>,
    report: &mut ValidationReport,
) -> Vec<Invite> {
    let mut invites = Vec::new();
    let mut seen = HashSet::new();

    for (index, obj) in entities(root, INVITES, report) {
        let mut f = Fields::new(obj);

        let code = f.non_empty("code", "INVALID_CODE");
        if let Some(ref code) = code {
            if !seen.insert(code.clone()) {
                f.fail("DUPLICATE_ID");
            }
        }

        let created_by = f.non_empty("createdBy", "INVALID_CREATED_BY");
        let expires_at = f.nullable_timestamp("expiresAt", "INVALID_EXPIRES_AT");
        let used = f.bool("used", "INVALID_USED");

        if !f.finish(report, INVITES, index) {
            continue;
        }

        if let (Some(code), Some(created_by), Some(expires_at), Some(used)) =
            (code, created_by, expires_at, used)
        {
            invites.push(Invite {
                code,
                created_by,
                expires_at,
                used,
            });
        }
    }

    invites
}

pub(super) fn read_signup_domains(
    root: &Map<String, Value>,
    report: &mut ValidationReport,
) -> Vec<String> {
    let items = match root.get(SIGNUP_DOMAINS) {
        None => return Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => {
            report.push(SIGNUP_DOMAINS, -1, "NOT_AN_ARRAY");
            return Vec::new();
        }
    };

    let mut domains = Vec::new();
    for (index, item) in items.iter().enumerate() {
        match item.as_str() {
            Some(domain) if !domain.is_empty() && !domain.contains(char::is_whitespace) => {
                let domain = domain.to_ascii_lowercase();
                if !domains.contains(&domain) {
                    domains.push(domain);
                }
            }
            _ => report.push(SIGNUP_DOMAINS, index as i64, "INVALID_DOMAIN"),
        }
    }
    domains
}
