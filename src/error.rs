//! Error types.
//!
//! One enum per concern, all folded into [`Error`]. [`Error::kind`] maps any
//! error onto the failure taxonomy callers use to tell policy, key-access and
//! connectivity problems apart.

use std::fmt;

use thiserror::Error;

/// Key-management backend failures.
#[derive(Error, Debug)]
pub enum KmsError {
    #[error("access denied to key {key}: {reason}")]
    AccessDenied { key: String, reason: String },

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("kms backend unavailable: {0}")]
    Unavailable(String),

    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("no kms backend registered for type '{0}'")]
    UnsupportedType(String),
}

/// Local symmetric cipher failures.
#[derive(Error, Debug)]
pub enum CipherError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("malformed encrypted value: {0}")]
    MalformedValue(String),
}

/// Registry collaborator failures.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("schema registry unavailable: {0}")]
    Unavailable(String),

    #[error("schema not found: id {0}")]
    SchemaNotFound(u32),

    #[error("subject not found: {0}")]
    SubjectNotFound(String),

    #[error("version {version} not found for subject {subject}")]
    VersionNotFound { subject: String, version: u32 },

    #[error("registry storage error: {0}")]
    Storage(String),
}

/// Schema definition and body codec failures.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("invalid schema: {0}")]
    Parse(String),

    #[error("type mismatch at '{path}': expected {expected}")]
    TypeMismatch { path: String, expected: String },

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),
}

/// Rule definition failures.
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("missing rule parameter: {0}")]
    MissingParam(&'static str),

    #[error("unsupported rule type: {0}")]
    UnsupportedType(String),

    #[error("field type {0} cannot be encrypted")]
    UnsupportedField(String),

    #[error("invalid onFailure action: {0}")]
    InvalidOnFailure(String),

    #[error("invalid rule mode: {0}")]
    InvalidMode(String),

    #[error("invalid rule kind: {0}")]
    InvalidKind(String),
}

/// Wire framing failures.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("message too short: {0} bytes")]
    Truncated(usize),

    #[error("unknown magic byte: {0:#04x}")]
    UnknownMagic(u8),

    #[error("invalid message encoding: {0}")]
    Encoding(String),
}

/// Configuration failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),

    #[error("failed to read config: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Main error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Kms(#[from] KmsError),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A rule transform failed and its onFailure policy surfaced the error.
    #[error("rule '{rule}' failed on subject '{subject}' at field '{field}': {source}")]
    RuleEvaluation {
        subject: String,
        rule: String,
        field: String,
        #[source]
        source: Box<Error>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure classes reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RegistryUnavailable,
    SchemaNotFound,
    KeyAccessDenied,
    KeyNotFound,
    BackendUnavailable,
    InvalidKeyMaterial,
    EncryptionFailed,
    DecryptionFailed,
    RuleEvaluationFailed,
    InvalidSchema,
    InvalidPayload,
    Config,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Error {
    /// Failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Kms(e) => match e {
                KmsError::AccessDenied { .. } | KmsError::UnsupportedType(_) => {
                    ErrorKind::KeyAccessDenied
                }
                KmsError::KeyNotFound(_) => ErrorKind::KeyNotFound,
                KmsError::Unavailable(_) => ErrorKind::BackendUnavailable,
                KmsError::InvalidKeyMaterial(_) => ErrorKind::InvalidKeyMaterial,
            },
            Self::Cipher(e) => match e {
                CipherError::EncryptionFailed(_) => ErrorKind::EncryptionFailed,
                CipherError::DecryptionFailed(_) | CipherError::MalformedValue(_) => {
                    ErrorKind::DecryptionFailed
                }
            },
            Self::Registry(e) => match e {
                RegistryError::Unavailable(_) => ErrorKind::RegistryUnavailable,
                RegistryError::SchemaNotFound(_)
                | RegistryError::SubjectNotFound(_)
                | RegistryError::VersionNotFound { .. } => ErrorKind::SchemaNotFound,
                RegistryError::Storage(_) => ErrorKind::Io,
            },
            Self::Schema(_) => ErrorKind::InvalidSchema,
            Self::Rule(_) | Self::RuleEvaluation { .. } => ErrorKind::RuleEvaluationFailed,
            Self::Wire(_) | Self::Json(_) => ErrorKind::InvalidPayload,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Failure class of the underlying cause, looking through rule context.
    pub fn root_kind(&self) -> ErrorKind {
        match self {
            Self::RuleEvaluation { source, .. } => source.root_kind(),
            other => other.kind(),
        }
    }

    /// Whether the failure is transient and may be retried with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RegistryUnavailable | ErrorKind::BackendUnavailable
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
