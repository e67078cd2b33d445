//! Configuration module for hoard.

use serde::Deserialize;
use std::path::Path;

use crate::auth::AuthMode;
use crate::crypto::MasterKey;
use crate::{HoardError, Result};

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/hoard.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Blob storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding `files/` and `paste-bins/`.
    #[serde(default = "default_data_root")]
    pub data_root: String,
}

fn default_data_root() -> String {
    "data".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
        }
    }
}

/// Background job intervals.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between storage usage recomputations.
    #[serde(default = "default_accountant_interval")]
    pub accountant_interval_secs: u64,
    /// Seconds between disk/database reconciliation passes.
    #[serde(default = "default_reconciler_interval")]
    pub reconciler_interval_secs: u64,
}

fn default_accountant_interval() -> u64 {
    60 // 1 minute
}

fn default_reconciler_interval() -> u64 {
    600 // 10 minutes
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            accountant_interval_secs: default_accountant_interval(),
            reconciler_interval_secs: default_reconciler_interval(),
        }
    }
}

impl ScheduleConfig {
    /// Both intervals must be greater than zero.
    pub fn validate(&self) -> Result<()> {
        if self.accountant_interval_secs == 0 || self.reconciler_interval_secs == 0 {
            return Err(HoardError::Config(
                "schedule intervals must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Authentication storage configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthConfig {
    /// Which auth secret representation tenants carry.
    #[serde(default)]
    pub mode: AuthMode,
}

/// Encryption configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EncryptionConfig {
    /// Base64-encoded 32-byte master key.
    #[serde(default)]
    pub master_key: String,
}

impl EncryptionConfig {
    /// Decode the configured master key.
    pub fn master_key(&self) -> Result<MasterKey> {
        if self.master_key.is_empty() {
            return Err(HoardError::Config(
                "master_key is not set. \
                 Set it in config.toml or via HOARD_MASTER_KEY environment variable."
                    .to_string(),
            ));
        }
        MasterKey::from_base64("current", &self.master_key)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/hoard.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Blob storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Background job intervals.
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Authentication storage configuration.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Encryption configuration.
    #[serde(default)]
    pub encryption: EncryptionConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(HoardError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| HoardError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `HOARD_MASTER_KEY`: Override the master encryption key
    pub fn apply_env_overrides(&mut self) {
        if let Ok(master_key) = std::env::var("HOARD_MASTER_KEY") {
            if !master_key.is_empty() {
                self.encryption.master_key = master_key;
            }
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if:
    /// - the master key is missing or does not decode to 32 bytes
    /// - either job interval is zero
    pub fn validate(&self) -> Result<()> {
        self.encryption.master_key()?;
        self.schedule.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_B64: &str = "MDEyMzQ1Njc4OTAxMjM0NTY3ODkwMTIzNDU2Nzg5MDE=";

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.database.path, "data/hoard.db");
        assert_eq!(config.storage.data_root, "data");
        assert_eq!(config.schedule.accountant_interval_secs, 60);
        assert_eq!(config.schedule.reconciler_interval_secs, 600);
        assert_eq!(config.auth.mode, AuthMode::Password);
        assert!(config.encryption.master_key.is_empty());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, "logs/hoard.log");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = format!(
            r#"
[database]
path = "/var/lib/hoard/hoard.db"

[storage]
data_root = "/var/lib/hoard"

[schedule]
accountant_interval_secs = 30
reconciler_interval_secs = 300

[auth]
mode = "totp"

[encryption]
master_key = "{KEY_B64}"

[logging]
level = "debug"
file = "/var/log/hoard.log"
"#
        );

        let config = Config::parse(&toml).unwrap();

        assert_eq!(config.database.path, "/var/lib/hoard/hoard.db");
        assert_eq!(config.storage.data_root, "/var/lib/hoard");
        assert_eq!(config.schedule.accountant_interval_secs, 30);
        assert_eq!(config.schedule.reconciler_interval_secs, 300);
        assert_eq!(config.auth.mode, AuthMode::Totp);
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config() {
        let config = Config::parse("[schedule]\naccountant_interval_secs = 5\n").unwrap();

        assert_eq!(config.schedule.accountant_interval_secs, 5);
        assert_eq!(config.schedule.reconciler_interval_secs, 600);
        assert_eq!(config.database.path, "data/hoard.db");
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = Config::parse("[schedule\nbroken");
        assert!(matches!(result, Err(HoardError::Config(_))));
    }

    #[test]
    fn test_validate_requires_master_key() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("master_key is not set"));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.encryption.master_key = KEY_B64.to_string();
        config.schedule.reconciler_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_short_key() {
        let mut config = Config::default();
        config.encryption.master_key = "c2hvcnQ=".to_string();
        assert!(matches!(config.validate(), Err(HoardError::Crypto(_))));
    }
}
