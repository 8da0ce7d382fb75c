//! Key-management backends.
//!
//! A backend wraps and unwraps data-encryption-keys with a key-encryption-key
//! it holds. Backends are selected by the `kmsType` string carried in rule
//! parameters and live in a [`KmsRegistry`] populated explicitly at startup.
//!
//! ## Backends
//!
//! - **local-kms**: Always available. KEK derived from a shared secret.
//! - **age**: Always available. KEK is an age X25519 recipient.
//! - **aws-kms**: Feature-gated (`aws`). Uses AWS Key Management Service.
//! - **gcp-kms**: Feature-gated (`gcp`). Uses Google Cloud KMS via gcloud CLI.
//!
//! ## Adding a New Backend
//!
//! 1. Implement the `KmsBackend` trait
//! 2. Add the implementation in a new file (e.g., `azure.rs`, `vault.rs`)
//! 3. Feature-gate if appropriate
//! 4. Register it in `KmsRegistry::register_from_config`

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use crate::core::config::Config;
use crate::core::constants;
use crate::error::{KmsError, Result, RuleError};

mod age;
mod local;

#[cfg(feature = "aws")]
pub mod aws;

#[cfg(feature = "gcp")]
pub mod gcp;

pub use self::age::AgeKms;
pub use local::LocalKms;

/// Identifies a key-encryption-key held by a backend.
///
/// Never carries key material.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRef {
    pub kek_name: String,
    pub kms_type: String,
    pub kms_key_id: String,
}

impl KeyRef {
    pub fn new(
        kek_name: impl Into<String>,
        kms_type: impl Into<String>,
        kms_key_id: impl Into<String>,
    ) -> Self {
        Self {
            kek_name: kek_name.into(),
            kms_type: kms_type.into(),
            kms_key_id: kms_key_id.into(),
        }
    }

    /// Build a key reference from rule parameters.
    ///
    /// # Errors
    ///
    /// Returns `RuleError::MissingParam` naming the first absent parameter.
    pub fn from_params(params: &BTreeMap<String, String>) -> Result<Self> {
        let get = |name: &'static str| {
            params
                .get(name)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or(RuleError::MissingParam(name))
        };
        Ok(Self {
            kek_name: get(constants::PARAM_KEK_NAME)?,
            kms_type: get(constants::PARAM_KMS_TYPE)?,
            kms_key_id: get(constants::PARAM_KMS_KEY_ID)?,
        })
    }
}

impl fmt::Display for KeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}:{})", self.kek_name, self.kms_type, self.kms_key_id)
    }
}

/// Wrap/unwrap capability of an external key service.
///
/// Implementations block on their network round trip. Transient failures
/// should surface as `KmsError::Unavailable` so callers can retry them.
pub trait KmsBackend: Send + Sync + fmt::Debug {
    /// The `kmsType` this backend serves (e.g. `aws-kms`).
    fn kms_type(&self) -> &str;

    /// Encrypt a plaintext data key under the referenced KEK.
    ///
    /// # Errors
    ///
    /// Returns `KmsError` if the key is unknown, access is denied, or the
    /// service cannot be reached.
    fn wrap(&self, key_ref: &KeyRef, plaintext_key: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt a wrapped data key under the referenced KEK.
    ///
    /// # Errors
    ///
    /// Returns `KmsError` if the key is unknown, access is denied, the
    /// wrapped key is not valid for this KEK, or the service cannot be reached.
    fn unwrap(&self, key_ref: &KeyRef, wrapped_key: &[u8]) -> Result<Zeroizing<Vec<u8>>>;
}

/// Backends keyed by `kmsType`.
#[derive(Default)]
pub struct KmsRegistry {
    backends: RwLock<BTreeMap<String, Arc<dyn KmsBackend>>>,
}

impl fmt::Debug for KmsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KmsRegistry")
            .field("types", &self.types())
            .finish()
    }
}

static GLOBAL: OnceLock<Arc<KmsRegistry>> = OnceLock::new();

impl KmsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry, empty until backends are registered.
    pub fn global() -> Arc<KmsRegistry> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(KmsRegistry::new())))
    }

    /// Register a backend under its `kmsType`, replacing any previous one.
    pub fn register(&self, backend: Arc<dyn KmsBackend>) {
        let kms_type = backend.kms_type().to_string();
        debug!(kms_type = %kms_type, "registering kms backend");
        self.backends.write().insert(kms_type, backend);
    }

    /// Backend serving `kms_type`.
    ///
    /// # Errors
    ///
    /// Returns `KmsError::UnsupportedType` if nothing is registered for it.
    pub fn get(&self, kms_type: &str) -> Result<Arc<dyn KmsBackend>> {
        self.backends
            .read()
            .get(kms_type)
            .cloned()
            .ok_or_else(|| KmsError::UnsupportedType(kms_type.to_string()).into())
    }

    /// Registered `kmsType` names, sorted.
    pub fn types(&self) -> Vec<String> {
        self.backends.read().keys().cloned().collect()
    }

    /// Register every backend the configuration enables.
    ///
    /// Order is fixed: local, age, aws, gcp.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured backend cannot be constructed
    /// (unreadable age identity, AWS config load failure, ...).
    pub fn register_from_config(&self, config: &Config) -> Result<()> {
        if let Some(secret) = config.local_secret() {
            self.register(Arc::new(LocalKms::new(secret)?));
        }

        if !config.kms.age.identities.is_empty() {
            self.register(Arc::new(AgeKms::from_identity_files(
                &config.kms.age.identities,
            )?));
        }

        #[cfg(feature = "aws")]
        if config.kms.aws.enabled {
            self.register(Arc::new(aws::AwsKms::new()?));
        }

        #[cfg(feature = "gcp")]
        if config.kms.gcp.enabled {
            self.register(Arc::new(gcp::GcpKms::new()));
        }

        Ok(())
    }
}
