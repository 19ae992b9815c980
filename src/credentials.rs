//! Credential resolution.
//!
//! Upstream API keys may be stored encrypted at rest. Values prefixed with
//! `ENC:` are hex(nonce ‖ ciphertext) under ChaCha20-Poly1305, decrypted
//! with a 32-byte key read from a key file; plaintext values resolve
//! unchanged.

use std::path::{Path, PathBuf};

use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use zeroize::Zeroize;

use crate::error::ProxyError;

const ENC_PREFIX: &str = "ENC:";
const NONCE_LEN: usize = 12;

/// Returns `true` if the value is stored encrypted.
#[must_use]
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(ENC_PREFIX)
}

/// Resolves stored credentials to their plaintext form.
pub struct CredentialResolver {
    key_file: PathBuf,
}

impl CredentialResolver {
    #[must_use]
    pub fn new(key_file: impl Into<PathBuf>) -> Self {
        Self {
            key_file: key_file.into(),
        }
    }

    /// Resolve a stored credential value.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Credential`] when the key file is missing or
    /// malformed, or when decryption fails.
    pub fn resolve(&self, value: &str) -> Result<String, ProxyError> {
        if !is_encrypted(value) {
            return Ok(value.to_string());
        }

        let combined = hex::decode(&value[ENC_PREFIX.len()..])
            .map_err(|e| ProxyError::Credential(format!("invalid hex in encrypted value: {e}")))?;
        if combined.len() < NONCE_LEN {
            return Err(ProxyError::Credential(
                "encrypted value too short".to_string(),
            ));
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let mut key_bytes = read_key_file(&self.key_file)?;
        let cipher = ChaCha20Poly1305::new_from_slice(&key_bytes)
            .map_err(|_| ProxyError::Credential("invalid key length".to_string()))?;
        key_bytes.zeroize();

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| ProxyError::Credential(format!("decryption failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|_| ProxyError::Credential("decrypted value is not valid UTF-8".to_string()))
    }
}

fn read_key_file(path: &Path) -> Result<Vec<u8>, ProxyError> {
    let hex_key = std::fs::read_to_string(path).map_err(|e| {
        ProxyError::Credential(format!("failed to read key file {}: {e}", path.display()))
    })?;
    let key = hex::decode(hex_key.trim())
        .map_err(|e| ProxyError::Credential(format!("invalid hex in key file: {e}")))?;
    if key.len() != 32 {
        return Err(ProxyError::Credential(
            "key file has invalid length (expected 32 bytes)".to_string(),
        ));
    }
    Ok(key)
}
