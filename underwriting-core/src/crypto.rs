//! Crypto Vault: authenticated symmetric encryption for at-rest JSON blobs.
//!
//! Ciphertext layout is `nonce (12 bytes) || aead_ciphertext`. The key is a
//! single process-wide ChaCha20-Poly1305 key resolved once at startup; a
//! missing or malformed key is a fatal startup error.

use base64::Engine;
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),
    #[error("corrupted ciphertext")]
    CorruptedCiphertext,
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct VaultKey(Key);

impl VaultKey {
    /// Parses `ENCRYPTION_KEY`: 64 hex chars (32 bytes).
    pub fn from_hex(hex_str: &str) -> Result<Self, VaultError> {
        let bytes = hex::decode(hex_str).map_err(|e| VaultError::InvalidKey(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(VaultError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(VaultKey(*Key::from_slice(&bytes)))
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn generate() -> Self {
        VaultKey(ChaCha20Poly1305::generate_key(&mut OsRng))
    }
}

/// Symmetric vault sealing JSON values as opaque bytes.
#[derive(Clone)]
pub struct CryptoVault {
    key: VaultKey,
}

impl CryptoVault {
    pub fn new(key: VaultKey) -> Self {
        Self { key }
    }

    /// Serializes `value` canonically (stable field order from the struct's
    /// own `Serialize` impl) and seals it.
    pub fn encrypt(&self, value: &serde_json::Value) -> Result<Vec<u8>, VaultError> {
        let plaintext = serde_json::to_vec(value)?;
        let cipher = ChaCha20Poly1305::new(&self.key.0);
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| VaultError::CorruptedCiphertext)?;
        let mut out = Vec::with_capacity(nonce.len() + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn decrypt(&self, sealed: &[u8]) -> Result<serde_json::Value, VaultError> {
        if sealed.len() < 12 {
            return Err(VaultError::CorruptedCiphertext);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        let cipher = ChaCha20Poly1305::new(&self.key.0);
        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| VaultError::CorruptedCiphertext)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    pub fn encrypt_to_base64(&self, value: &serde_json::Value) -> Result<String, VaultError> {
        let sealed = self.encrypt(value)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(sealed))
    }

    pub fn decrypt_from_base64(&self, encoded: &str) -> Result<serde_json::Value, VaultError> {
        let sealed = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| VaultError::CorruptedCiphertext)?;
        self.decrypt(&sealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_nested_unicode_structures() {
        let vault = CryptoVault::new(VaultKey::generate());
        let value = json!({
            "applicant": {"full_name": "José Núñez 日本語", "phone": "+34-600-000-000"},
            "rows": [[1, "débito", null], [2, "crédito", 3.5]],
        });

        let sealed = vault.encrypt(&value).unwrap();
        let decrypted = vault.decrypt(&sealed).unwrap();
        assert_eq!(value, decrypted);
    }

    #[test]
    fn decrypt_rejects_tampered_ciphertext() {
        let vault = CryptoVault::new(VaultKey::generate());
        let mut sealed = vault.encrypt(&json!({"a": 1})).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(matches!(
            vault.decrypt(&sealed),
            Err(VaultError::CorruptedCiphertext)
        ));
    }

    #[test]
    fn decrypt_rejects_under_other_key() {
        let vault_a = CryptoVault::new(VaultKey::generate());
        let vault_b = CryptoVault::new(VaultKey::generate());
        let sealed = vault_a.encrypt(&json!({"a": 1})).unwrap();
        assert!(vault_b.decrypt(&sealed).is_err());
    }

    #[test]
    fn rejects_malformed_hex_key() {
        assert!(VaultKey::from_hex("not-hex").is_err());
        assert!(VaultKey::from_hex("aabb").is_err()); // too short
    }

    #[test]
    fn base64_round_trip() {
        let vault = CryptoVault::new(VaultKey::generate());
        let value = json!({"decision": "APPROVE"});
        let encoded = vault.encrypt_to_base64(&value).unwrap();
        assert_eq!(vault.decrypt_from_base64(&encoded).unwrap(), value);
    }
}
