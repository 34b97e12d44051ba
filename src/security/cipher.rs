//! Credential keyring
//!
//! Host secrets are stored as `base64(nonce || AES-GCM ciphertext)`. The
//! keyring holds one or more keys; decryption tries them in order so secrets
//! written before a key rotation remain readable, encryption always uses the
//! first key. Plaintext only ever lives in a [`Zeroizing`] buffer.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use zeroize::Zeroizing;

use crate::config::CredentialsConfig;
use crate::error::{BridgeError, Result};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

enum AesKey {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

impl AesKey {
    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes.len() {
            16 => Aes128Gcm::new_from_slice(bytes)
                .ok()
                .map(|c| Self::Aes128(Box::new(c))),
            32 => Aes256Gcm::new_from_slice(bytes)
                .ok()
                .map(|c| Self::Aes256(Box::new(c))),
            _ => None,
        }
    }

    fn decrypt(&self, nonce: &[u8], ciphertext: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
        let nonce = Nonce::from_slice(nonce);
        let plain = match self {
            Self::Aes128(c) => c.decrypt(nonce, ciphertext).ok()?,
            Self::Aes256(c) => c.decrypt(nonce, ciphertext).ok()?,
        };
        Some(Zeroizing::new(plain))
    }

    fn encrypt(&self, plaintext: &[u8]) -> Option<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = match self {
            Self::Aes128(c) => c.encrypt(&nonce, plaintext).ok()?,
            Self::Aes256(c) => c.encrypt(&nonce, plaintext).ok()?,
        };
        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Some(out)
    }
}

/// Process-wide keyring, built once at startup and shared by handle.
pub struct CredentialCipher {
    keys: Vec<AesKey>,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher")
            .field("keys", &format_args!("[{} redacted]", self.keys.len()))
            .finish()
    }
}

impl CredentialCipher {
    /// Build the keyring from base64-encoded keys.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if the list is empty, a key is not valid
    /// base64, or a key is not 16 or 32 bytes long.
    pub fn from_config(config: &CredentialsConfig) -> Result<Self> {
        if config.aes_keys.is_empty() {
            return Err(BridgeError::ConfigInvalid {
                field: "credentials.aes_keys".to_string(),
                reason: "At least one key is required".to_string(),
            });
        }

        let mut keys = Vec::with_capacity(config.aes_keys.len());
        for (index, encoded) in config.aes_keys.iter().enumerate() {
            let raw = Zeroizing::new(STANDARD.decode(encoded.trim()).map_err(|e| {
                BridgeError::ConfigInvalid {
                    field: format!("credentials.aes_keys[{index}]"),
                    reason: format!("Key is not valid base64: {e}"),
                }
            })?);
            let key = AesKey::from_bytes(&raw).ok_or_else(|| BridgeError::ConfigInvalid {
                field: format!("credentials.aes_keys[{index}]"),
                reason: format!("Key must be 16 or 32 bytes, got {}", raw.len()),
            })?;
            keys.push(key);
        }

        Ok(Self { keys })
    }

    /// Number of keys in the ring
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Decrypt a stored secret.
    ///
    /// # Errors
    ///
    /// Returns `Credential` when the input is malformed or no key in the
    /// ring authenticates it.
    pub fn decrypt(&self, encoded: &str) -> Result<Zeroizing<String>> {
        let blob = STANDARD
            .decode(encoded.trim())
            .map_err(|_| BridgeError::Credential("secret is not valid base64".to_string()))?;
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(BridgeError::Credential("secret is too short".to_string()));
        }
        let (nonce, sealed) = blob.split_at(NONCE_LEN);

        let plain = self
            .keys
            .iter()
            .find_map(|key| key.decrypt(nonce, sealed))
            .ok_or_else(|| BridgeError::Credential("no key could decrypt the secret".to_string()))?;

        let text = std::str::from_utf8(&plain)
            .map_err(|_| BridgeError::Credential("secret is not valid UTF-8".to_string()))?;
        Ok(Zeroizing::new(text.to_owned()))
    }

    /// Encrypt a secret with the primary (first) key.
    ///
    /// # Errors
    ///
    /// Returns `Credential` if the AEAD backend refuses the input.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        self.encrypt_with(0, plaintext)
    }

    /// Encrypt with a specific key of the ring, e.g. to stage a secret for a
    /// key that will become primary after rotation.
    ///
    /// # Errors
    ///
    /// Returns `Credential` if `index` is out of range or the AEAD backend
    /// refuses the input.
    pub fn encrypt_with(&self, index: usize, plaintext: &str) -> Result<String> {
        let key = self.keys.get(index).ok_or_else(|| {
            BridgeError::Credential(format!(
                "key index {index} out of range ({} keys)",
                self.keys.len()
            ))
        })?;
        let sealed = key
            .encrypt(plaintext.as_bytes())
            .ok_or_else(|| BridgeError::Credential("encryption failed".to_string()))?;
        Ok(STANDARD.encode(sealed))
    }
}
