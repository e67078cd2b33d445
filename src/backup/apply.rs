//! Second import phase: replace the installation with a validated plan.

use std::path::Path;

use sqlx::types::Json;
use sqlx::SqlitePool;
use tracing::{debug, error};

use super::{ImportPlan, ImportSummary};
use crate::storage::{move_dir, remove_dir_if_exists, DataPaths, FILES_DIR, PASTEBINS_DIR};
use crate::Result;

/// Cleared child tables first, `tenants` last.
const REPLACED_TABLES: &[&str] = &[
    "api_tokens",
    "files",
    "pastebins",
    "short_urls",
    "audit_logs",
    "invites",
    "signup_domains",
    "tenants",
];

pub(super) async fn apply(
    pool: &SqlitePool,
    paths: &DataPaths,
    archive: &Path,
    plan: &ImportPlan,
) -> Result<ImportSummary> {
    replace_rows(pool, plan).await?;

    if let Err(e) = swap_trees(paths, archive, plan).await {
        error!(
            "backup rows committed but blob trees under {:?} could not be replaced from {:?}: {}",
            paths.root(),
            archive,
            e
        );
        return Err(e.into());
    }

    Ok(ImportSummary {
        version: plan.version.to_string(),
        tenants: plan.tenants.len(),
        api_tokens: plan.api_tokens.len(),
        files: plan.files.len(),
        pastebins: plan.pastebins.len(),
        short_urls: plan.short_urls.len(),
        audit_logs: plan.audit_logs.len(),
        invites: plan.invites.len(),
        signup_domains: plan.signup_domains.len(),
    })
}

async fn replace_rows(pool: &SqlitePool, plan: &ImportPlan) -> Result<()> {
    let mut tx = pool.begin().await?;

    for table in REPLACED_TABLES {
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut *tx)
            .await?;
    }

    for tenant in &plan.tenants {
        sqlx::query(
            "INSERT INTO tenants (id, path_id, created_at, disabled, storage_quota, upload_limit,
                                  extensions, extension_mode, name_strategy, embed_color,
                                  audit_retention_days, auth_secret, backup_codes)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&tenant.id)
        .bind(&tenant.path_id)
        .bind(tenant.created_at)
        .bind(tenant.disabled)
        .bind(tenant.storage_quota)
        .bind(tenant.upload_limit)
        .bind(&tenant.extensions)
        .bind(tenant.extension_mode.as_str())
        .bind(tenant.name_strategy.as_str())
        .bind(&tenant.embed_color)
        .bind(tenant.audit_retention_days)
        .bind(&tenant.auth_secret)
        .bind(&tenant.backup_codes)
        .execute(&mut *tx)
        .await?;
    }

    for token in &plan.api_tokens {
        sqlx::query(
            "INSERT INTO api_tokens (tenant_id, name, token_hash, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&token.tenant_id)
        .bind(&token.name)
        .bind(&token.token_hash)
        .bind(token.created_at)
        .execute(&mut *tx)
        .await?;
    }

    for (table, resources) in [("files", &plan.files), ("pastebins", &plan.pastebins)] {
        for resource in resources {
            sqlx::query(&format!(
                "INSERT INTO {table} (id, tenant_id, name, size, password, public, views, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(&resource.id)
            .bind(&resource.tenant_id)
            .bind(&resource.name)
            .bind(resource.size)
            .bind(&resource.password)
            .bind(resource.public)
            .bind(resource.views)
            .bind(resource.created_at)
            .execute(&mut *tx)
            .await?;
        }
    }

    for url in &plan.short_urls {
        sqlx::query(
            "INSERT INTO short_urls (id, tenant_id, target, visits, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&url.id)
        .bind(&url.tenant_id)
        .bind(&url.target)
        .bind(url.visits)
        .bind(url.created_at)
        .execute(&mut *tx)
        .await?;
    }

    for log in &plan.audit_logs {
        sqlx::query(
            "INSERT INTO audit_logs (tenant_id, category, message, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&log.tenant_id)
        .bind(log.category.as_str())
        .bind(&log.message)
        .bind(log.created_at)
        .execute(&mut *tx)
        .await?;
    }

    for invite in &plan.invites {
        sqlx::query("INSERT INTO invites (code, created_by, expires_at, used) VALUES (?, ?, ?, ?)")
            .bind(&invite.code)
            .bind(&invite.created_by)
            .bind(invite.expires_at)
            .bind(invite.used)
            .execute(&mut *tx)
            .await?;
    }

    for domain in &plan.signup_domains {
        sqlx::query("INSERT INTO signup_domains (domain) VALUES (?)")
            .bind(domain)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Replace both blob roots with the archive's trees.
///
/// A root with no counterpart in the archive is recreated empty.
async fn swap_trees(paths: &DataPaths, archive: &Path, plan: &ImportPlan) -> std::io::Result<()> {
    let trees = [
        (paths.files_root(), archive.join(FILES_DIR), true),
        (
            paths.pastebin_root(),
            archive.join(PASTEBINS_DIR),
            plan.includes_pastebins,
        ),
    ];

    for (root, source, from_archive) in trees {
        remove_dir_if_exists(&root).await?;

        if from_archive && tokio::fs::try_exists(&source).await? {
            debug!("Moving {:?} into {:?}", source, root);
            move_dir(&source, &root).await?;
        } else {
            tokio::fs::create_dir_all(&root).await?;
        }
    }

    Ok(())
}
