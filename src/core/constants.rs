//! Constants used throughout fieldguard.
//!
//! Centralizes rule parameter names, wire markers and default policies.

/// Rule parameter naming the key-encryption-key.
pub const PARAM_KEK_NAME: &str = "encrypt.kek.name";

/// Rule parameter selecting the key-management backend.
pub const PARAM_KMS_TYPE: &str = "encrypt.kms.type";

/// Rule parameter with the backend-specific key identifier.
pub const PARAM_KMS_KEY_ID: &str = "encrypt.kms.key.id";

/// Rule type handled by the envelope cipher.
pub const ENCRYPT_RULE_TYPE: &str = "ENCRYPT";

/// Schema field annotation carrying tags.
pub const FIELD_TAGS_PROPERTY: &str = "confluent:tags";

/// Leading byte of every framed message.
pub const WIRE_MAGIC: u8 = 0x00;

/// Leading byte of every encrypted field value.
pub const FIELD_FORMAT_V1: u8 = 0x01;

/// Deepest value nesting accepted when decoding a body.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Most zero-width collection items (nulls, empty records) one body may
/// decode to.
pub const MAX_ZERO_WIDTH_ITEMS: usize = 65_536;

/// AES-256 key size in bytes.
pub const DEK_SIZE: usize = 32;

/// AES-GCM nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Default Data-Key Cache time-to-live.
pub const DEFAULT_DEK_TTL_SECS: u64 = 300;

/// Default freshness of a subject's latest schema.
pub const DEFAULT_SCHEMA_TTL_SECS: u64 = 300;

/// Default retry budget for transient failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default first backoff delay.
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 100;

/// Default backoff ceiling.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 2_000;

/// Configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = "fieldguard.toml";

/// Default directory of the file-backed registry.
pub const REGISTRY_DIR: &str = ".fieldguard/registry";

/// Environment variable holding the local KMS secret.
pub const LOCAL_SECRET_ENV: &str = "LOCAL_SECRET";
