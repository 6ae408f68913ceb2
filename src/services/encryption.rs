//! Credential vault: symmetric encryption for persisted secrets.
//!
//! Connection passwords, SSH credentials, SMTP passwords and S3 secret keys
//! are stored as base64 AES-256-GCM ciphertexts produced here. The key is
//! process-wide, derived once at startup from `ENCRYPTION_KEY`.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

/// AES-256-GCM vault over string secrets.
///
/// Ciphertext layout before base64: nonce (12 bytes) || ciphertext+tag.
#[derive(Clone)]
pub struct EncryptionService {
    key: [u8; 32],
}

impl EncryptionService {
    /// Derive a 256-bit key from the configured passphrase.
    pub fn new(passphrase: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(passphrase.as_bytes());
        let digest = hasher.finalize();
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self { key }
    }

    /// Encrypt a plaintext secret into a base64 string.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| AppError::Internal(format!("cipher init: {}", e)))?;

        let nonce_bytes: [u8; 12] = rand::random();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| AppError::Internal(format!("encrypt: {}", e)))?;

        let mut combined = Vec::with_capacity(12 + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(combined))
    }

    /// Decrypt a base64 ciphertext back into the plaintext secret.
    ///
    /// Malformed or key-mismatched input yields `AppError::Decrypt`.
    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let data = BASE64.decode(encoded).map_err(|_| AppError::Decrypt)?;

        // nonce (12) + tag (16) is the minimum valid payload
        if data.len() < 28 {
            return Err(AppError::Decrypt);
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| AppError::Internal(format!("cipher init: {}", e)))?;

        let nonce = Nonce::from_slice(&data[0..12]);
        let plaintext = cipher
            .decrypt(nonce, &data[12..])
            .map_err(|_| AppError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| AppError::Decrypt)
    }

    /// Encrypt a possibly-empty secret; empty stays empty so optional
    /// credentials round-trip without padding the table with ciphertexts.
    pub fn encrypt_optional(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        self.encrypt(plaintext)
    }

    /// Counterpart of [`encrypt_optional`](Self::encrypt_optional).
    pub fn decrypt_optional(&self, encoded: &str) -> Result<String> {
        if encoded.is_empty() {
            return Ok(String::new());
        }
        self.decrypt(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let vault = EncryptionService::new("test-passphrase");
        let encrypted = vault.encrypt("secret credentials here").unwrap();
        let decrypted = vault.decrypt(&encrypted).unwrap();
        assert_eq!(decrypted, "secret credentials here");
    }

    #[test]
    fn test_wrong_key_fails() {
        let vault1 = EncryptionService::new("key1");
        let vault2 = EncryptionService::new("key2");

        let encrypted = vault1.encrypt("secret").unwrap();
        assert!(matches!(vault2.decrypt(&encrypted), Err(AppError::Decrypt)));
    }

    #[test]
    fn test_tampered_data_fails() {
        let vault = EncryptionService::new("key");
        let encrypted = vault.encrypt("secret").unwrap();

        let mut raw = BASE64.decode(&encrypted).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        let tampered = BASE64.encode(raw);

        assert!(matches!(vault.decrypt(&tampered), Err(AppError::Decrypt)));
    }

    #[test]
    fn test_not_base64_fails() {
        let vault = EncryptionService::new("key");
        assert!(matches!(
            vault.decrypt("definitely not base64!!!"),
            Err(AppError::Decrypt)
        ));
    }

    #[test]
    fn test_too_short_payload_fails() {
        let vault = EncryptionService::new("key");
        let short = BASE64.encode([0u8; 10]);
        assert!(matches!(vault.decrypt(&short), Err(AppError::Decrypt)));
    }

    #[test]
    fn test_different_encryptions_differ() {
        let vault = EncryptionService::new("key");
        let enc1 = vault.encrypt("same data").unwrap();
        let enc2 = vault.encrypt("same data").unwrap();

        // Random nonce per call
        assert_ne!(enc1, enc2);
        assert_eq!(vault.decrypt(&enc1).unwrap(), vault.decrypt(&enc2).unwrap());
    }

    #[test]
    fn test_optional_empty_passthrough() {
        let vault = EncryptionService::new("key");
        assert_eq!(vault.encrypt_optional("").unwrap(), "");
        assert_eq!(vault.decrypt_optional("").unwrap(), "");

        let enc = vault.encrypt_optional("ssh-key-material").unwrap();
        assert!(!enc.is_empty());
        assert_eq!(vault.decrypt_optional(&enc).unwrap(), "ssh-key-material");
    }
}
