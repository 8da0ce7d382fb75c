//! Envelope cipher.
//!
//! Field payloads are encrypted with AES-256-GCM under a data key (DEK). The
//! DEK is generated locally, wrapped by the key-management backend named in
//! the key reference, and cached. Each encrypted field carries the wrapped
//! DEK so any reader with access to the KEK can recover it.
//!
//! ## Encrypted field layout
//!
//! ```text
//! 0x01 | u16 BE wrapped-DEK length | wrapped DEK | 12-byte nonce | ciphertext + 16-byte tag
//! ```
//!
//! The wrapped DEK is authenticated as associated data.

use std::sync::Arc;
use std::time::Duration;

use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use rand::RngCore;
use tracing::{debug, trace, warn};
use zeroize::Zeroizing;

use crate::core::cache::{CacheKey, DataKey, DekCache};
use crate::core::constants::{DEK_SIZE, FIELD_FORMAT_V1, NONCE_SIZE, TAG_SIZE};
use crate::core::kms::{KeyRef, KmsRegistry};
use crate::core::retry::RetryPolicy;
use crate::error::{CipherError, Error, Result};

/// Ciphertext that replaces a field's plaintext in the record tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedFieldValue {
    pub wrapped_key: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

impl EncryptedFieldValue {
    /// Serialize to the self-describing field layout.
    ///
    /// # Errors
    ///
    /// Returns `CipherError::EncryptionFailed` if the wrapped key does not
    /// fit the 16-bit length prefix.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let wrapped_len = u16::try_from(self.wrapped_key.len()).map_err(|_| {
            CipherError::EncryptionFailed(format!(
                "wrapped key too large: {} bytes",
                self.wrapped_key.len()
            ))
        })?;

        let mut out =
            Vec::with_capacity(3 + self.wrapped_key.len() + NONCE_SIZE + self.ciphertext.len());
        out.push(FIELD_FORMAT_V1);
        out.extend_from_slice(&wrapped_len.to_be_bytes());
        out.extend_from_slice(&self.wrapped_key);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        Ok(out)
    }

    /// Parse the field layout.
    ///
    /// # Errors
    ///
    /// Returns `CipherError::MalformedValue` on an unknown version byte or a
    /// value too short for its declared parts.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let malformed = |msg: String| -> Error { CipherError::MalformedValue(msg).into() };

        let (&version, rest) = bytes
            .split_first()
            .ok_or_else(|| malformed("empty value".into()))?;
        if version != FIELD_FORMAT_V1 {
            return Err(malformed(format!("unknown format version {:#04x}", version)));
        }
        if rest.len() < 2 {
            return Err(malformed("missing wrapped key length".into()));
        }
        let (len_bytes, rest) = rest.split_at(2);
        let wrapped_len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;

        if rest.len() < wrapped_len + NONCE_SIZE + TAG_SIZE {
            return Err(malformed(format!(
                "value too short: {} bytes after header, wrapped key claims {}",
                rest.len(),
                wrapped_len
            )));
        }
        let (wrapped_key, rest) = rest.split_at(wrapped_len);
        let (nonce, ciphertext) = rest.split_at(NONCE_SIZE);

        let mut nonce_arr = [0u8; NONCE_SIZE];
        nonce_arr.copy_from_slice(nonce);
        Ok(Self {
            wrapped_key: wrapped_key.to_vec(),
            nonce: nonce_arr,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Generates, wraps, caches and applies data keys.
#[derive(Debug)]
pub struct EnvelopeCipher {
    kms: Arc<KmsRegistry>,
    cache: DekCache,
    retry: RetryPolicy,
}

impl EnvelopeCipher {
    pub fn new(kms: Arc<KmsRegistry>, dek_ttl: Duration, retry: RetryPolicy) -> Self {
        Self {
            kms,
            cache: DekCache::new(dek_ttl),
            retry,
        }
    }

    pub fn cache(&self) -> &DekCache {
        &self.cache
    }

    /// The DEK new fields for `key_ref` are encrypted with.
    ///
    /// On a cache miss a fresh random DEK is generated and wrapped. Callers
    /// encrypting several fields of one record resolve this once and reuse it.
    ///
    /// # Errors
    ///
    /// Returns the backend's `KmsError` once retries are exhausted.
    pub fn data_key(&self, key_ref: &KeyRef) -> Result<Arc<DataKey>> {
        self.cache
            .get_or_load(&CacheKey::Write(key_ref.clone()), || self.generate(key_ref))
    }

    fn generate(&self, key_ref: &KeyRef) -> Result<DataKey> {
        let backend = self.kms.get(&key_ref.kms_type)?;

        let mut plaintext = Zeroizing::new(vec![0u8; DEK_SIZE]);
        OsRng.fill_bytes(&mut plaintext);

        let wrapped = self
            .retry
            .run("kms wrap", || backend.wrap(key_ref, &plaintext))?;

        debug!(key = %key_ref, wrapped_len = wrapped.len(), "generated data key");
        Ok(DataKey::new(plaintext, wrapped))
    }

    /// DEK for a wrapped key found in a message.
    ///
    /// # Errors
    ///
    /// Returns the backend's `KmsError`. An unwrap failure also invalidates
    /// every cached DEK for `key_ref`.
    pub fn unwrap_key(&self, key_ref: &KeyRef, wrapped: &[u8]) -> Result<Arc<DataKey>> {
        let slot = CacheKey::for_wrapped(key_ref, wrapped);
        self.cache.get_or_load(&slot, || {
            let backend = self.kms.get(&key_ref.kms_type)?;
            let plaintext = self
                .retry
                .run("kms unwrap", || backend.unwrap(key_ref, wrapped))
                .map_err(|e| {
                    warn!(key = %key_ref, error = %e, "unwrap failed, invalidating cached keys");
                    self.cache.invalidate(key_ref);
                    e
                })?;
            if plaintext.len() != DEK_SIZE {
                return Err(crate::error::KmsError::InvalidKeyMaterial(format!(
                    "unwrapped key is {} bytes, expected {}",
                    plaintext.len(),
                    DEK_SIZE
                ))
                .into());
            }
            Ok(DataKey::new(plaintext, wrapped.to_vec()))
        })
    }

    /// Encrypt a payload under an already resolved DEK.
    ///
    /// # Errors
    ///
    /// Returns `CipherError::EncryptionFailed` on a local cipher error.
    pub fn encrypt_with(&self, key: &DataKey, plaintext: &[u8]) -> Result<EncryptedFieldValue> {
        let cipher = Aes256Gcm::new_from_slice(key.plaintext())
            .map_err(|e| CipherError::EncryptionFailed(format!("{}", e)))?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: key.wrapped(),
                },
            )
            .map_err(|_| CipherError::EncryptionFailed("AES-GCM encryption failed".into()))?;

        trace!(
            plaintext_len = plaintext.len(),
            ciphertext_len = ciphertext.len(),
            "encrypted field"
        );

        let mut nonce_arr = [0u8; NONCE_SIZE];
        nonce_arr.copy_from_slice(nonce.as_slice());
        Ok(EncryptedFieldValue {
            wrapped_key: key.wrapped().to_vec(),
            nonce: nonce_arr,
            ciphertext,
        })
    }

    /// Encrypt a field payload for `key_ref`.
    ///
    /// # Errors
    ///
    /// Returns a `KmsError` if the DEK cannot be resolved, or
    /// `CipherError::EncryptionFailed`.
    pub fn encrypt_field(&self, key_ref: &KeyRef, plaintext: &[u8]) -> Result<EncryptedFieldValue> {
        let key = self.data_key(key_ref)?;
        self.encrypt_with(&key, plaintext)
    }

    /// Decrypt a field payload.
    ///
    /// # Errors
    ///
    /// Returns a `KmsError` if the embedded DEK cannot be unwrapped, or
    /// `CipherError::DecryptionFailed` on an authentication failure.
    pub fn decrypt_field(&self, key_ref: &KeyRef, value: &EncryptedFieldValue) -> Result<Vec<u8>> {
        let key = self.unwrap_key(key_ref, &value.wrapped_key)?;
        let cipher = Aes256Gcm::new_from_slice(key.plaintext())
            .map_err(|e| CipherError::DecryptionFailed(format!("{}", e)))?;

        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&value.nonce),
                Payload {
                    msg: &value.ciphertext,
                    aad: &value.wrapped_key,
                },
            )
            .map_err(|_| {
                CipherError::DecryptionFailed(
                    "authentication failed: wrong key or corrupted ciphertext".into(),
                )
            })?;

        trace!(plaintext_len = plaintext.len(), "decrypted field");
        Ok(plaintext)
    }

    /// Encrypt and serialize in one step.
    pub fn seal(&self, key: &DataKey, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.encrypt_with(key, plaintext)?.to_bytes()
    }

    /// Parse and decrypt in one step.
    pub fn open(&self, key_ref: &KeyRef, bytes: &[u8]) -> Result<Vec<u8>> {
        let value = EncryptedFieldValue::from_bytes(bytes)?;
        self.decrypt_field(key_ref, &value)
    }
}
