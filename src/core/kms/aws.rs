//! AWS KMS backend.
//!
//! Wraps data keys with AWS Key Management Service Encrypt/Decrypt.
//! Enable with `--features aws`.
//!
//! ## Usage
//!
//! ```toml
//! [kms.aws]
//! enabled = true
//! ```
//!
//! Rules then reference `encrypt.kms.type = "aws-kms"` and a key ARN or alias
//! in `encrypt.kms.key.id`. Credentials come from the environment
//! (AWS_ACCESS_KEY_ID, etc.) or the default credential provider chain.

use aws_sdk_kms::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_kms::primitives::Blob;
use tracing::trace;
use zeroize::Zeroizing;

use super::{KeyRef, KmsBackend};
use crate::error::{KmsError, Result};

/// AWS KMS key wrapping.
///
/// Owns a current-thread runtime to drive the async SDK from the blocking
/// backend interface.
pub struct AwsKms {
    runtime: tokio::runtime::Runtime,
    client: aws_sdk_kms::Client,
}

impl std::fmt::Debug for AwsKms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsKms").finish_non_exhaustive()
    }
}

impl AwsKms {
    /// `kmsType` served by this backend.
    pub const TYPE: &'static str = "aws-kms";

    /// Load AWS config from the environment and build a client.
    ///
    /// # Errors
    ///
    /// Returns `KmsError::Unavailable` if the runtime cannot be created.
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| KmsError::Unavailable(format!("failed to create runtime: {}", e)))?;

        let config =
            runtime.block_on(aws_config::load_defaults(aws_config::BehaviorVersion::latest()));
        let client = aws_sdk_kms::Client::new(&config);

        Ok(Self { runtime, client })
    }
}

/// Map an SDK failure onto the backend error classes.
fn classify<E, R>(key_ref: &KeyRef, err: SdkError<E, R>) -> KmsError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    if matches!(
        err,
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) | SdkError::ResponseError(_)
    ) {
        return KmsError::Unavailable(format!("{}", err));
    }

    let message = err.message().unwrap_or("no message").to_string();
    match err.code() {
        Some("AccessDeniedException") | Some("IncorrectKeyException") => KmsError::AccessDenied {
            key: key_ref.to_string(),
            reason: message,
        },
        Some("NotFoundException")
        | Some("DisabledException")
        | Some("KMSInvalidStateException") => {
            KmsError::KeyNotFound(format!("{}: {}", key_ref.kms_key_id, message))
        }
        Some("InvalidCiphertextException") => KmsError::InvalidKeyMaterial(message),
        Some("DependencyTimeoutException") | Some("KMSInternalException") => {
            KmsError::Unavailable(message)
        }
        _ => KmsError::Unavailable(format!("{}", err)),
    }
}

impl KmsBackend for AwsKms {
    fn kms_type(&self) -> &str {
        Self::TYPE
    }

    fn wrap(&self, key_ref: &KeyRef, plaintext_key: &[u8]) -> Result<Vec<u8>> {
        trace!(key = %key_ref, "wrapping with AWS KMS");

        self.runtime.block_on(async {
            let result = self
                .client
                .encrypt()
                .key_id(&key_ref.kms_key_id)
                .plaintext(Blob::new(plaintext_key))
                .send()
                .await
                .map_err(|e| classify(key_ref, e))?;

            let blob = result
                .ciphertext_blob()
                .ok_or_else(|| KmsError::InvalidKeyMaterial("no ciphertext returned".into()))?;

            trace!(wrapped_len = blob.as_ref().len(), "wrapped with AWS KMS");
            Ok::<_, crate::error::Error>(blob.as_ref().to_vec())
        })
    }

    fn unwrap(&self, key_ref: &KeyRef, wrapped_key: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        trace!(key = %key_ref, "unwrapping with AWS KMS");

        self.runtime.block_on(async {
            let result = self
                .client
                .decrypt()
                .key_id(&key_ref.kms_key_id)
                .ciphertext_blob(Blob::new(wrapped_key))
                .send()
                .await
                .map_err(|e| classify(key_ref, e))?;

            let plaintext = result
                .plaintext()
                .ok_or_else(|| KmsError::InvalidKeyMaterial("no plaintext returned".into()))?;

            Ok::<_, crate::error::Error>(Zeroizing::new(plaintext.as_ref().to_vec()))
        })
    }
}
