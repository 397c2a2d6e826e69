//! Credential Cipher - AES-256-GCM for integration secrets at rest

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine};
use cloudgreet_common::{Error, Result};
use tracing::warn;

const NONCE_LEN: usize = 12;

/// Encrypts single credential values
///
/// Ciphertext is `base64(nonce || ciphertext)` with a fresh random nonce per
/// value.
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialCipher { .. }")
    }
}

impl CredentialCipher {
    /// Build from a base64-encoded 32-byte key
    pub fn from_base64_key(encoded: &str) -> Result<Self> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Config(format!("Encryption key is not valid base64: {}", e)))?;
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| {
            Error::Config(format!(
                "Encryption key must be 32 bytes, got {}",
                key.len()
            ))
        })?;
        Ok(Self { cipher })
    }

    /// Key from config, or a process-local random key when none is set
    pub fn from_config(encryption_key: Option<&str>) -> Result<Self> {
        match encryption_key.filter(|k| !k.trim().is_empty()) {
            Some(key) => Self::from_base64_key(key),
            None => {
                warn!(
                    "No security.encryption_key configured; integration credentials \
                     will not be readable after restart"
                );
                Ok(Self::generate())
            }
        }
    }

    /// Random key
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| Error::Crypto("Encryption failed".to_string()))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(payload))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let payload = STANDARD
            .decode(encoded)
            .map_err(|_| Error::Crypto("Ciphertext is not valid base64".to_string()))?;
        if payload.len() <= NONCE_LEN {
            return Err(Error::Crypto("Ciphertext is truncated".to_string()));
        }

        let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Crypto("Decryption failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| Error::Crypto("Decrypted value is not UTF-8".to_string()))
    }
}

/// `••••` followed by the last four characters; short values are fully hidden
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "••••".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("••••{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_with_fresh_nonces() {
        let cipher = CredentialCipher::generate();
        let first = cipher.encrypt("sk-live-123456").unwrap();
        let second = cipher.encrypt("sk-live-123456").unwrap();

        assert_ne!(first, second);
        assert!(!first.contains("sk-live"));
        assert_eq!(cipher.decrypt(&first).unwrap(), "sk-live-123456");
        assert_eq!(cipher.decrypt(&second).unwrap(), "sk-live-123456");
    }

    #[test]
    fn test_wrong_key_fails() {
        let ciphertext = CredentialCipher::generate().encrypt("secret").unwrap();
        let err = CredentialCipher::generate().decrypt(&ciphertext).unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = CredentialCipher::generate();
        let ciphertext = cipher.encrypt("secret").unwrap();
        let mut bytes = STANDARD.decode(&ciphertext).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(cipher.decrypt(&STANDARD.encode(bytes)).is_err());
        assert!(cipher.decrypt("AAAA").is_err());
    }

    #[test]
    fn test_key_from_base64() {
        let key = STANDARD.encode([7u8; 32]);
        let cipher = CredentialCipher::from_base64_key(&key).unwrap();
        let again = CredentialCipher::from_base64_key(&key).unwrap();
        let ciphertext = cipher.encrypt("token").unwrap();
        assert_eq!(again.decrypt(&ciphertext).unwrap(), "token");

        let short = STANDARD.encode([7u8; 16]);
        assert!(matches!(
            CredentialCipher::from_base64_key(&short),
            Err(Error::Config(_))
        ));
        assert!(CredentialCipher::from_base64_key("not base64!").is_err());
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("sk-live-abcd1234"), "••••1234");
        assert_eq!(mask_secret("abcd"), "••••");
        assert_eq!(mask_secret(""), "••••");
    }
}
