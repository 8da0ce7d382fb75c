//! Local KMS backend.
//!
//! Derives one KEK per key id from a shared secret with HKDF-SHA256 and wraps
//! data keys with AES-256-GCM. Every process configured with the same secret
//! can unwrap; any other secret is denied. Intended for development and tests.

use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use hkdf::Hkdf;
use sha2::Sha256;
use tracing::trace;
use zeroize::Zeroizing;

use super::{KeyRef, KmsBackend};
use crate::core::constants::{DEK_SIZE, NONCE_SIZE, TAG_SIZE};
use crate::error::{KmsError, Result};

const HKDF_SALT: &[u8] = b"fieldguard-local-kms";

/// Secret-derived key-encryption-keys.
pub struct LocalKms {
    secret: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for LocalKms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKms")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl LocalKms {
    /// `kmsType` served by this backend.
    pub const TYPE: &'static str = "local-kms";

    /// Create a backend from a shared secret.
    ///
    /// # Errors
    ///
    /// Returns `KmsError::InvalidKeyMaterial` if the secret is empty.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(KmsError::InvalidKeyMaterial("local kms secret is empty".into()).into());
        }
        Ok(Self {
            secret: Zeroizing::new(secret.to_vec()),
        })
    }

    fn kek(&self, key_ref: &KeyRef) -> Result<Aes256Gcm> {
        let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), &self.secret);
        let mut okm = Zeroizing::new([0u8; DEK_SIZE]);
        hk.expand(key_ref.kms_key_id.as_bytes(), &mut okm[..])
            .map_err(|e| KmsError::InvalidKeyMaterial(format!("kek derivation failed: {}", e)))?;
        Aes256Gcm::new_from_slice(&okm[..])
            .map_err(|e| KmsError::InvalidKeyMaterial(format!("{}", e)).into())
    }
}

impl KmsBackend for LocalKms {
    fn kms_type(&self) -> &str {
        Self::TYPE
    }

    fn wrap(&self, key_ref: &KeyRef, plaintext_key: &[u8]) -> Result<Vec<u8>> {
        trace!(key = %key_ref, "wrapping with local kms");

        let cipher = self.kek(key_ref)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext_key,
                    aad: key_ref.kek_name.as_bytes(),
                },
            )
            .map_err(|_| KmsError::InvalidKeyMaterial("local kms wrap failed".into()))?;

        let mut wrapped = Vec::with_capacity(NONCE_SIZE + sealed.len());
        wrapped.extend_from_slice(nonce.as_slice());
        wrapped.extend_from_slice(&sealed);
        Ok(wrapped)
    }

    fn unwrap(&self, key_ref: &KeyRef, wrapped_key: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        trace!(key = %key_ref, "unwrapping with local kms");

        if wrapped_key.len() < NONCE_SIZE + TAG_SIZE {
            return Err(KmsError::InvalidKeyMaterial(format!(
                "wrapped key too short: {} bytes",
                wrapped_key.len()
            ))
            .into());
        }
        let (nonce, sealed) = wrapped_key.split_at(NONCE_SIZE);
        let cipher = self.kek(key_ref)?;
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: key_ref.kek_name.as_bytes(),
                },
            )
            .map_err(|_| KmsError::AccessDenied {
                key: key_ref.to_string(),
                reason: "local kms secret does not unwrap this data key".into(),
            })?;
        Ok(Zeroizing::new(plaintext))
    }
}
