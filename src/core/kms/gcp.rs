//! Google Cloud KMS backend.
//!
//! Wraps data keys with Cloud KMS via the gcloud CLI. Enable with
//! `--features gcp`.
//!
//! ## Requirements
//!
//! - `gcloud` CLI must be installed and authenticated
//! - User must have cloudkms.cryptoKeyVersions.useToEncrypt and useToDecrypt permissions
//!
//! Rules reference `encrypt.kms.type = "gcp-kms"` and a full resource name in
//! `encrypt.kms.key.id`:
//! `projects/my-project/locations/global/keyRings/my-ring/cryptoKeys/my-key`

use std::io::Write;
use std::process::{Command, Stdio};

use tracing::trace;
use zeroize::Zeroizing;

use super::{KeyRef, KmsBackend};
use crate::error::{KmsError, Result};

/// Google Cloud KMS key wrapping using the gcloud CLI.
#[derive(Debug, Default)]
pub struct GcpKms;

/// Components of a `projects/*/locations/*/keyRings/*/cryptoKeys/*` name.
#[derive(Debug, PartialEq)]
struct ResourceName {
    project: String,
    location: String,
    keyring: String,
    key: String,
}

impl ResourceName {
    fn parse(name: &str) -> Result<Self> {
        let parts: Vec<&str> = name.split('/').collect();

        if parts.len() != 8
            || parts[0] != "projects"
            || parts[2] != "locations"
            || parts[4] != "keyRings"
            || parts[6] != "cryptoKeys"
        {
            return Err(KmsError::KeyNotFound(format!(
                "invalid GCP KMS resource name format: {}",
                name
            ))
            .into());
        }

        Ok(Self {
            project: parts[1].to_string(),
            location: parts[3].to_string(),
            keyring: parts[5].to_string(),
            key: parts[7].to_string(),
        })
    }
}

impl GcpKms {
    /// `kmsType` served by this backend.
    pub const TYPE: &'static str = "gcp-kms";

    pub fn new() -> Self {
        Self
    }

    /// Pipe `input` through `gcloud kms <verb>` and return stdout.
    fn run(&self, verb: &str, key_ref: &KeyRef, input: &[u8]) -> Result<Vec<u8>> {
        let resource = ResourceName::parse(&key_ref.kms_key_id)?;

        let (in_flag, out_flag) = match verb {
            "encrypt" => ("--plaintext-file", "--ciphertext-file"),
            _ => ("--ciphertext-file", "--plaintext-file"),
        };

        let mut child = Command::new("gcloud")
            .args([
                "kms",
                verb,
                "--project",
                &resource.project,
                "--location",
                &resource.location,
                "--keyring",
                &resource.keyring,
                "--key",
                &resource.key,
                in_flag,
                "-",
                out_flag,
                "-",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| KmsError::Unavailable(format!("failed to spawn gcloud: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input)
                .map_err(|e| KmsError::Unavailable(format!("failed to write to gcloud: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| KmsError::Unavailable(format!("gcloud command failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_stderr(key_ref, verb, &stderr).into());
        }

        Ok(output.stdout)
    }
}

/// Map gcloud's stderr onto the backend error classes.
fn classify_stderr(key_ref: &KeyRef, verb: &str, stderr: &str) -> KmsError {
    if stderr.contains("PERMISSION_DENIED") {
        KmsError::AccessDenied {
            key: key_ref.to_string(),
            reason: stderr.trim().to_string(),
        }
    } else if stderr.contains("NOT_FOUND") {
        KmsError::KeyNotFound(key_ref.kms_key_id.clone())
    } else if stderr.contains("INVALID_ARGUMENT") {
        KmsError::InvalidKeyMaterial(stderr.trim().to_string())
    } else {
        KmsError::Unavailable(format!("gcloud kms {} failed: {}", verb, stderr.trim()))
    }
}

impl KmsBackend for GcpKms {
    fn kms_type(&self) -> &str {
        Self::TYPE
    }

    fn wrap(&self, key_ref: &KeyRef, plaintext_key: &[u8]) -> Result<Vec<u8>> {
        trace!(key = %key_ref, "wrapping with GCP KMS");
        self.run("encrypt", key_ref, plaintext_key)
    }

    fn unwrap(&self, key_ref: &KeyRef, wrapped_key: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        trace!(key = %key_ref, "unwrapping with GCP KMS");
        self.run("decrypt", key_ref, wrapped_key).map(Zeroizing::new)
    }
}
