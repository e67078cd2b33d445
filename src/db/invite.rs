//! Invites and allowed sign-up domains.
//!
//! Both are installation-level and only touched by backup import and export
//! within this crate.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::Result;

/// A sign-up invite.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Invite {
    pub code: String,
    pub created_by: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub used: bool,
}

/// Repository for invites.
pub struct InviteRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> InviteRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert an invite.
    pub async fn create(&self, invite: &Invite) -> Result<()> {
        sqlx::query("INSERT INTO invites (code, created_by, expires_at, used) VALUES (?, ?, ?, ?)")
            .bind(&invite.code)
            .bind(&invite.created_by)
            .bind(invite.expires_at)
            .bind(invite.used)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// List every invite.
    pub async fn list_all(&self) -> Result<Vec<Invite>> {
        let invites = sqlx::query_as::<_, Invite>(
            "SELECT code, created_by, expires_at, used FROM invites ORDER BY code",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(invites)
    }
}

/// Repository for allowed sign-up domains.
pub struct SignupDomainRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SignupDomainRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Allow a domain. Adding a known domain is a no-op.
    pub async fn add(&self, domain: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO signup_domains (domain) VALUES (?)")
            .bind(domain)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// List every allowed domain.
    pub async fn list_all(&self) -> Result<Vec<String>> {
        let domains: Vec<String> =
            sqlx::query_scalar("SELECT domain FROM signup_domains ORDER BY domain")
                .fetch_all(self.pool)
                .await?;
        Ok(domains)
    }
}
