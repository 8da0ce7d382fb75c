//! Configuration file management.
//!
//! Handles reading and validating `fieldguard.toml`. Registry and transport
//! endpoints/credentials are carried as opaque strings for the bootstrap
//! layer; only cache, retry, resolver and KMS settings are interpreted here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::constants;
use crate::core::resolver::StalePolicy;
use crate::core::retry::RetryPolicy;
use crate::error::{ConfigError, Result};

/// Process configuration stored in `fieldguard.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub registry: RegistryConfig,
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub resolver: ResolverConfig,
    pub kms: KmsConfig,
}

/// Registry endpoint. `url` and credentials are not interpreted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Directory of the file-backed registry
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(constants::REGISTRY_DIR),
            url: None,
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Data-Key Cache time-to-live
    pub dek_ttl_secs: u64,
    /// How long a subject's latest schema is trusted before re-fetching
    pub schema_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dek_ttl_secs: constants::DEFAULT_DEK_TTL_SECS,
            schema_ttl_secs: constants::DEFAULT_SCHEMA_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: constants::DEFAULT_MAX_RETRIES,
            initial_backoff_ms: constants::DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: constants::DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// What to do when the registry is down and a cached ruleset exists
    pub on_unavailable: StalePolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KmsConfig {
    pub local: LocalKmsConfig,
    pub age: AgeKmsConfig,
    pub aws: ToggleConfig,
    pub gcp: ToggleConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalKmsConfig {
    /// Shared secret; falls back to the `LOCAL_SECRET` environment variable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgeKmsConfig {
    /// age identity files used to unwrap
    pub identities: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToggleConfig {
    pub enabled: bool,
}

impl Config {
    /// Locate and load the configuration.
    ///
    /// Lookup order: `explicit`, `./fieldguard.toml`, then
    /// `<config dir>/fieldguard/config.toml`. With no file found, defaults
    /// are returned.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if `explicit` does not exist, or a
    /// read/parse/validation error for the file that was found.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.display().to_string()).into());
            }
            return Self::load(path);
        }

        let local = PathBuf::from(constants::CONFIG_FILE);
        if local.exists() {
            return Self::load(&local);
        }

        if let Some(global) = dirs::config_dir().map(|d| d.join("fieldguard").join("config.toml"))
        {
            if global.exists() {
                return Self::load(&global);
            }
        }

        debug!("no config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadFile`, `ConfigError::Parse` or
    /// `ConfigError::Invalid`.
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading config");

        let contents = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        let config = Self::parse(&contents)?;

        debug!(
            dek_ttl_secs = config.cache.dek_ttl_secs,
            max_retries = config.retry.max_retries,
            "config loaded"
        );
        Ok(config)
    }

    /// Parse and validate TOML contents.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for zero TTLs or an initial backoff
    /// larger than the maximum.
    pub fn validate(&self) -> Result<()> {
        if self.cache.dek_ttl_secs == 0 {
            return Err(
                ConfigError::Invalid("cache.dek_ttl_secs must be greater than 0".into()).into(),
            );
        }
        if self.cache.schema_ttl_secs == 0 {
            return Err(
                ConfigError::Invalid("cache.schema_ttl_secs must be greater than 0".into()).into(),
            );
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::Invalid(format!(
                "retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.retry.initial_backoff_ms, self.retry.max_backoff_ms
            ))
            .into());
        }
        Ok(())
    }

    pub fn dek_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.dek_ttl_secs)
    }

    pub fn schema_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.schema_ttl_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
        }
    }

    /// Local KMS secret from the file, else from `LOCAL_SECRET`.
    pub fn local_secret(&self) -> Option<String> {
        self.kms
            .local
            .secret
            .clone()
            .or_else(|| std::env::var(constants::LOCAL_SECRET_ENV).ok())
            .filter(|s| !s.is_empty())
    }
}
