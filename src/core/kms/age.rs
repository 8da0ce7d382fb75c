//! Age KMS backend.
//!
//! The key id of an `age` key reference is an X25519 recipient (`age1...`).
//! Wrapping encrypts the data key to that recipient; unwrapping needs one of
//! the identities this process was configured with.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ::age::x25519;
use tracing::trace;
use zeroize::Zeroizing;

use super::{KeyRef, KmsBackend};
use crate::error::{KmsError, Result};

/// Age-based key wrapping with x25519 keys.
pub struct AgeKms {
    identities: Vec<x25519::Identity>,
}

impl std::fmt::Debug for AgeKms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgeKms")
            .field("identities", &self.identities.len())
            .finish()
    }
}

impl AgeKms {
    /// `kmsType` served by this backend.
    pub const TYPE: &'static str = "age";

    /// Create a backend that can unwrap for the given identities.
    ///
    /// A backend without identities can still wrap.
    pub fn new(identities: Vec<x25519::Identity>) -> Self {
        Self { identities }
    }

    /// Load identities from age key files (`AGE-SECRET-KEY-1...` lines).
    ///
    /// Blank lines and `#` comments are skipped.
    ///
    /// # Errors
    ///
    /// Returns `KmsError::InvalidKeyMaterial` if a file cannot be read or
    /// holds a malformed key.
    pub fn from_identity_files(paths: &[PathBuf]) -> Result<Self> {
        let mut identities = Vec::new();
        for path in paths {
            identities.extend(read_identity_file(path)?);
        }
        Ok(Self::new(identities))
    }

    fn recipient(key_ref: &KeyRef) -> Result<x25519::Recipient> {
        x25519::Recipient::from_str(&key_ref.kms_key_id).map_err(|e| {
            KmsError::KeyNotFound(format!("invalid age recipient {}: {}", key_ref.kms_key_id, e))
                .into()
        })
    }
}

fn read_identity_file(path: &Path) -> Result<Vec<x25519::Identity>> {
    let contents = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
        KmsError::InvalidKeyMaterial(format!("cannot read {}: {}", path.display(), e))
    })?);

    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            x25519::Identity::from_str(line).map_err(|e| {
                KmsError::InvalidKeyMaterial(format!("{}: {}", path.display(), e)).into()
            })
        })
        .collect()
}

impl KmsBackend for AgeKms {
    fn kms_type(&self) -> &str {
        Self::TYPE
    }

    fn wrap(&self, key_ref: &KeyRef, plaintext_key: &[u8]) -> Result<Vec<u8>> {
        trace!(key = %key_ref, "wrapping with age");

        let recipient = Self::recipient(key_ref)?;
        let encryptor =
            ::age::Encryptor::with_recipients(std::iter::once(&recipient as &dyn ::age::Recipient))
                .map_err(|e| KmsError::InvalidKeyMaterial(format!("{}", e)))?;

        let mut wrapped = Vec::new();
        let mut writer = encryptor
            .wrap_output(&mut wrapped)
            .map_err(|e| KmsError::InvalidKeyMaterial(format!("{}", e)))?;
        writer.write_all(plaintext_key)?;
        writer.finish()?;

        trace!(wrapped_len = wrapped.len(), "wrapped with age");
        Ok(wrapped)
    }

    fn unwrap(&self, key_ref: &KeyRef, wrapped_key: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        trace!(key = %key_ref, "unwrapping with age");

        if self.identities.is_empty() {
            return Err(KmsError::AccessDenied {
                key: key_ref.to_string(),
                reason: "no age identities configured".into(),
            }
            .into());
        }

        let decryptor = ::age::Decryptor::new(wrapped_key)
            .map_err(|e| KmsError::InvalidKeyMaterial(format!("{}", e)))?;
        let mut reader = decryptor
            .decrypt(self.identities.iter().map(|i| i as &dyn ::age::Identity))
            .map_err(|e| match e {
                ::age::DecryptError::NoMatchingKeys => KmsError::AccessDenied {
                    key: key_ref.to_string(),
                    reason: "no configured age identity matches".into(),
                },
                other => KmsError::InvalidKeyMaterial(format!("{}", other)),
            })?;

        let mut plaintext = Zeroizing::new(Vec::new());
        reader.read_to_end(&mut plaintext)?;
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use ::age::secrecy::ExposeSecret;

    fn key_ref_for(identity: &x25519::Identity) -> KeyRef {
        KeyRef::new("age-kek", AgeKms::TYPE, identity.to_public().to_string())
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let identity = x25519::Identity::generate();
        let key_ref = key_ref_for(&identity);
        let kms = AgeKms::new(vec![identity]);

        let wrapped = kms.wrap(&key_ref, b"0123456789abcdef0123456789abcdef").unwrap();
        let plain = kms.unwrap(&key_ref, &wrapped).unwrap();
        assert_eq!(plain.as_slice(), b"0123456789abcdef0123456789abcdef");
    }

    #[test]
    fn test_unwrap_without_matching_identity() {
        let owner = x25519::Identity::generate();
        let key_ref = key_ref_for(&owner);
        let wrapped = AgeKms::new(vec![owner]).wrap(&key_ref, b"dek").unwrap();

        let stranger = AgeKms::new(vec![x25519::Identity::generate()]);
        let err = stranger.unwrap(&key_ref, &wrapped).unwrap_err();
        assert!(matches!(err, Error::Kms(KmsError::AccessDenied { .. })));
    }

    #[test]
    fn test_invalid_recipient() {
        let kms = AgeKms::new(vec![]);
        let key_ref = KeyRef::new("k", AgeKms::TYPE, "not-an-age-key");
        let err = kms.wrap(&key_ref, b"dek").unwrap_err();
        assert!(matches!(err, Error::Kms(KmsError::KeyNotFound(_))));
    }

    #[test]
    fn test_identity_file_loading() {
        let identity = x25519::Identity::generate();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.txt");
        std::fs::write(
            &path,
            format!(
                "# created: today\n# public key: {}\n{}\n",
                identity.to_public(),
                identity.to_string().expose_secret()
            ),
        )
        .unwrap();

        let kms = AgeKms::from_identity_files(&[path]).unwrap();
        let key_ref = key_ref_for(&identity);
        let wrapped = kms.wrap(&key_ref, b"dek").unwrap();
        assert_eq!(kms.unwrap(&key_ref, &wrapped).unwrap().as_slice(), b"dek");
    }
}
