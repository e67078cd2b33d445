//! Authentication material for tenants.
//!
//! This module provides password hashing, backup code and API token
//! generation, and the installation-wide [`AuthMode`].

pub mod codes;
mod password;

use serde::Deserialize;

pub use password::{hash_password, validate_password, verify_password, PasswordError};

use crate::HoardError;

/// Which auth secret representation tenants carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Argon2id password hash, sealed under the master key.
    #[default]
    Password,
    /// TOTP seed, sealed under the master key.
    Totp,
    /// Authentication is delegated; no secret is stored.
    External,
}

impl AuthMode {
    /// Whether tenants carry a sealed secret in this mode.
    pub fn stores_secret(&self) -> bool {
        !matches!(self, AuthMode::External)
    }
}

impl From<PasswordError> for HoardError {
    fn from(e: PasswordError) -> Self {
        match e {
            PasswordError::HashError(msg) => HoardError::Crypto(msg),
            other => HoardError::Validation(other.to_string()),
        }
    }
}
