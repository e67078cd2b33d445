//! Database schema and migrations for hoard.
//!
//! Migrations are applied sequentially when the database is first opened or
//! upgraded.

/// Database migrations.
///
/// Each migration is a SQL script that will be executed in order.
/// The schema_version table tracks which migrations have been applied.
pub const MIGRATIONS: &[&str] = &[
    // v1: Tenants and their API tokens
    r#"
CREATE TABLE tenants (
    id                    TEXT PRIMARY KEY,
    path_id               TEXT NOT NULL UNIQUE,     -- uuid, never exposed
    created_at            TEXT NOT NULL,
    disabled              INTEGER NOT NULL DEFAULT 0,
    storage_quota         INTEGER NOT NULL DEFAULT 0,   -- bytes, 0 = unlimited
    upload_limit          INTEGER NOT NULL DEFAULT 0,   -- bytes, 0 = unlimited
    extensions            TEXT NOT NULL DEFAULT '[]',   -- JSON array
    extension_mode        TEXT NOT NULL DEFAULT 'deny', -- 'allow', 'deny'
    name_strategy         TEXT NOT NULL DEFAULT 'random',
    embed_color           TEXT NOT NULL DEFAULT '#2f3136',
    audit_retention_days  INTEGER NOT NULL DEFAULT 30,
    auth_secret           TEXT,                     -- sealed under the master key
    backup_codes          TEXT NOT NULL DEFAULT '[]'    -- JSON array of SHA-256 digests
);

CREATE TABLE api_tokens (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id   TEXT NOT NULL REFERENCES tenants(id),
    name        TEXT NOT NULL,
    token_hash  TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL
);

CREATE INDEX idx_api_tokens_tenant_id ON api_tokens(tenant_id);
"#,
    // v2: Files and pastebins
    r#"
CREATE TABLE files (
    id          TEXT PRIMARY KEY,
    tenant_id   TEXT NOT NULL REFERENCES tenants(id),
    name        TEXT NOT NULL,
    size        INTEGER NOT NULL DEFAULT 0,
    password    TEXT,                     -- sealed under the master key
    public      INTEGER NOT NULL DEFAULT 1,
    views       INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

CREATE INDEX idx_files_tenant_id ON files(tenant_id);

CREATE TABLE pastebins (
    id          TEXT PRIMARY KEY,
    tenant_id   TEXT NOT NULL REFERENCES tenants(id),
    name        TEXT NOT NULL,
    size        INTEGER NOT NULL DEFAULT 0,
    password    TEXT,
    public      INTEGER NOT NULL DEFAULT 1,
    views       INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

CREATE INDEX idx_pastebins_tenant_id ON pastebins(tenant_id);
"#,
    // v3: Short URLs
    r#"
CREATE TABLE short_urls (
    id          TEXT PRIMARY KEY,
    tenant_id   TEXT NOT NULL REFERENCES tenants(id),
    target      TEXT NOT NULL,
    visits      INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

CREATE INDEX idx_short_urls_tenant_id ON short_urls(tenant_id);
"#,
    // v4: Audit trail (tenant_id NULL = installation-level)
    r#"
CREATE TABLE audit_logs (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id   TEXT,
    category    TEXT NOT NULL,
    message     TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE INDEX idx_audit_logs_tenant_id ON audit_logs(tenant_id);
"#,
    // v5: Invites and sign-up domains
    r#"
CREATE TABLE invites (
    code        TEXT PRIMARY KEY,
    created_by  TEXT NOT NULL,
    expires_at  TEXT,
    used        INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE signup_domains (
    domain      TEXT PRIMARY KEY
);
"#,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_not_empty() {
        assert!(!MIGRATIONS.is_empty());
    }

    #[test]
    fn test_first_migration_contains_tenants_table() {
        let first = MIGRATIONS[0];
        assert!(first.contains("CREATE TABLE tenants"));
        assert!(first.contains("path_id"));
        assert!(first.contains("auth_secret"));
    }

    #[test]
    fn test_migrations_are_valid_sql() {
        for migration in MIGRATIONS {
            assert!(!migration.trim().is_empty());
            assert!(migration.contains("CREATE TABLE") || migration.contains("ALTER TABLE"));
        }
    }

    #[test]
    fn test_resource_tables_share_columns() {
        let resources = MIGRATIONS[1];
        assert!(resources.contains("CREATE TABLE files"));
        assert!(resources.contains("CREATE TABLE pastebins"));
        assert_eq!(resources.matches("password    TEXT").count(), 2);
    }
}
