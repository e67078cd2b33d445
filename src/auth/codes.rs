//! Backup codes, API tokens and TOTP seeds.
//!
//! Backup codes and API tokens are shown to the tenant once; only their
//! SHA-256 digests are stored.

use rand::Rng;
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};

/// Number of backup codes issued per generation.
pub const BACKUP_CODE_COUNT: usize = 10;

/// Length of one half of a backup code (`XXXXX-XXXXX`).
const BACKUP_CODE_HALF_LEN: usize = 5;

/// Prefix carried by every API token.
pub const API_TOKEN_PREFIX: &str = "hrd_";

/// TOTP seed length in bytes.
pub const TOTP_SEED_LEN: usize = 20;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Digest a backup code or API token for storage.
///
/// Backup codes are compared case-insensitively and without the dash.
pub fn digest(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Normalize a backup code as typed by a user.
pub fn normalize_code(code: &str) -> String {
    code.chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Generate one set of plaintext backup codes.
pub fn generate_backup_codes() -> Vec<String> {
    let mut rng = rand::rng();
    (0..BACKUP_CODE_COUNT)
        .map(|_| {
            let mut half = || -> String {
                (0..BACKUP_CODE_HALF_LEN)
                    .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
                    .collect()
            };
            let first = half();
            let second = half();
            format!("{first}-{second}")
        })
        .collect()
}

/// Generate a plaintext API token.
pub fn generate_api_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    format!("{API_TOKEN_PREFIX}{}", hex::encode(bytes))
}

/// Generate a TOTP seed, hex-encoded.
pub fn generate_totp_seed() -> String {
    let mut bytes = [0u8; TOTP_SEED_LEN];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
