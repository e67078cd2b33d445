//! Secret sealing under a named master key.
//!
//! Every stored secret (tenant auth secrets, file and pastebin passwords) is
//! sealed with AES-256-GCM. The stored form is `base64(nonce || ciphertext)`.

use std::fmt;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};

use crate::{HoardError, Result};

/// Nonce length for AES-GCM.
const NONCE_LEN: usize = 12;

/// Required master key length in bytes.
pub const KEY_LEN: usize = 32;

/// A named 256-bit master key.
#[derive(Clone)]
pub struct MasterKey {
    name: String,
    fingerprint: String,
    cipher: Aes256Gcm,
}

impl MasterKey {
    /// Build a key from raw bytes.
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LEN {
            return Err(HoardError::Crypto(format!(
                "master key must be {KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        let fingerprint = hex::encode(&Sha256::digest(bytes)[..16]);
        let key = Key::<Aes256Gcm>::from_slice(bytes);

        Ok(Self {
            name: name.into(),
            fingerprint,
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Build a key from its base64 encoding.
    pub fn from_base64(name: impl Into<String>, encoded: &str) -> Result<Self> {
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| HoardError::Crypto(format!("failed to decode master key: {e}")))?;
        Self::from_bytes(name, &bytes)
    }

    /// Generate a fresh random key.
    pub fn generate(name: impl Into<String>) -> Self {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        let fingerprint = hex::encode(&Sha256::digest(key.as_slice())[..16]);
        Self {
            name: name.into(),
            fingerprint,
            cipher: Aes256Gcm::new(&key),
        }
    }

    /// Key name, used in logs and audit messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stable fingerprint of the key material (hex, 32 chars).
    ///
    /// Recorded in backup manifests so an archive is never imported under the
    /// wrong key.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Seal `plaintext`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| HoardError::Crypto(format!("encryption failed: {e}")))?;

        let mut combined = nonce.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(general_purpose::STANDARD.encode(&combined))
    }

    /// Open a value produced by [`MasterKey::encrypt`].
    pub fn decrypt(&self, sealed: &str) -> Result<Vec<u8>> {
        let combined = general_purpose::STANDARD
            .decode(sealed)
            .map_err(|e| HoardError::Crypto(format!("failed to decode ciphertext: {e}")))?;

        if combined.len() < NONCE_LEN {
            return Err(HoardError::Crypto("ciphertext too short".to_string()));
        }

        let (nonce, ciphertext) = combined.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                HoardError::Crypto(format!("decryption under key '{}' failed", self.name))
            })
    }

    /// Seal a UTF-8 string.
    pub fn encrypt_str(&self, plaintext: &str) -> Result<String> {
        self.encrypt(plaintext.as_bytes())
    }

    /// Open a sealed UTF-8 string.
    pub fn decrypt_str(&self, sealed: &str) -> Result<String> {
        let bytes = self.decrypt(sealed)?;
        String::from_utf8(bytes)
            .map_err(|e| HoardError::Crypto(format!("invalid UTF-8 in secret: {e}")))
    }

    /// Whether `sealed` opens under this key.
    pub fn opens(&self, sealed: &str) -> bool {
        self.decrypt(sealed).is_ok()
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("name", &self.name)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// Move one sealed secret from `old` to `new` without changing its plaintext.
///
/// This is the only re-encryption path in the crate; tenant auth secrets,
/// file passwords and pastebin passwords all go through it.
pub fn rotate_secret(sealed: &str, old: &MasterKey, new: &MasterKey) -> Result<String> {
    let plaintext = old.decrypt(sealed)?;
    new.encrypt(&plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str, byte: u8) -> MasterKey {
        MasterKey::from_bytes(name, &[byte; KEY_LEN]).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let k = key("k", 1);
        let sealed = k.encrypt_str("hunter2").unwrap();
        assert_ne!(sealed, "hunter2");
        assert_eq!(k.decrypt_str(&sealed).unwrap(), "hunter2");
    }

    #[test]
    fn test_nonce_is_fresh() {
        let k = key("k", 1);
        assert_ne!(k.encrypt_str("same").unwrap(), k.encrypt_str("same").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let a = key("a", 1);
        let b = key("b", 2);
        let sealed = a.encrypt_str("secret").unwrap();
        assert!(matches!(b.decrypt(&sealed), Err(HoardError::Crypto(_))));
        assert!(!b.opens(&sealed));
    }

    #[test]
    fn test_rotate_secret_moves_to_new_key() {
        let old = key("old", 1);
        let new = key("new", 2);
        let sealed = old.encrypt_str("pw").unwrap();

        let rotated = rotate_secret(&sealed, &old, &new).unwrap();

        assert_eq!(new.decrypt_str(&rotated).unwrap(), "pw");
        assert!(!old.opens(&rotated));
    }

    #[test]
    fn test_rotate_secret_rejects_foreign_ciphertext() {
        let old = key("old", 1);
        let new = key("new", 2);
        let other = key("other", 3);
        let sealed = other.encrypt_str("pw").unwrap();

        assert!(rotate_secret(&sealed, &old, &new).is_err());
    }

    #[test]
    fn test_fingerprint_is_stable_and_distinct() {
        assert_eq!(key("a", 7).fingerprint(), key("b", 7).fingerprint());
        assert_ne!(key("a", 7).fingerprint(), key("a", 8).fingerprint());
        assert_eq!(key("a", 7).fingerprint().len(), 32);
    }

    #[test]
    fn test_from_base64() {
        let k = MasterKey::from_base64("b64", "MDEyMzQ1Njc4OTAxMjM0NTY3ODkwMTIzNDU2Nzg5MDE=")
            .unwrap();
        let raw = MasterKey::from_bytes("raw", b"01234567890123456789012345678901").unwrap();
        assert_eq!(k.fingerprint(), raw.fingerprint());
        assert!(MasterKey::from_base64("bad", "not base64!").is_err());
        assert!(MasterKey::from_base64("short", "c2hvcnQ=").is_err());
    }

    #[test]
    fn test_generate_produces_distinct_keys() {
        let a = MasterKey::generate("a");
        let b = MasterKey::generate("b");
        assert_ne!(a.fingerprint(), b.fingerprint());
        let sealed = a.encrypt_str("x").unwrap();
        assert!(!b.opens(&sealed));
    }

    #[test]
    fn test_decrypt_rejects_garbage() {
        let k = key("k", 1);
        assert!(k.decrypt("AAAA").is_err());
        assert!(k.decrypt("%%%").is_err());
    }

    #[test]
    fn test_debug_hides_key_material() {
        let k = key("named", 9);
        let debug = format!("{k:?}");
        assert!(debug.contains("named"));
        assert!(!debug.contains("cipher"));
    }
}
