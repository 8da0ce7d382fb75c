//! Schema registry collaborator.
//!
//! The registry stores schema definitions with their metadata and rule sets,
//! assigns schema ids, and versions them per subject. The pipeline only talks
//! to it through the [`Registry`] trait.
//!
//! ## Implementations
//!
//! - [`MemoryRegistry`]: in-process, used by tests and embedding callers
//! - [`FileRegistry`]: JSON file on disk, shared between CLI invocations
//!
//! A client for a remote registry service implements the same trait and maps
//! connection failures to `RegistryError::Unavailable` so they are retried.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::core::rules::RuleSet;
use crate::core::schema::Schema;
use crate::error::{Result, SchemaError};

mod file;
mod memory;

pub use file::FileRegistry;
pub use memory::MemoryRegistry;

/// Schema type understood by the body codec.
pub const SCHEMA_TYPE_AVRO: &str = "AVRO";

/// Metadata registered alongside a schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Dotted field path to tags
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

/// A schema definition as stored by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaInfo {
    pub schema: String,
    #[serde(default = "default_schema_type")]
    pub schema_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_set: Option<RuleSet>,
}

fn default_schema_type() -> String {
    SCHEMA_TYPE_AVRO.to_string()
}

impl SchemaInfo {
    /// An Avro schema without metadata or rules.
    pub fn avro(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            schema_type: default_schema_type(),
            metadata: None,
            rule_set: None,
        }
    }

    pub fn with_rule_set(mut self, rule_set: RuleSet) -> Self {
        self.rule_set = Some(rule_set);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Parse the definition and attach metadata tags.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::Parse` for a non-Avro schema type or an invalid
    /// definition.
    pub fn parse(&self) -> Result<Schema> {
        if !self.schema_type.eq_ignore_ascii_case(SCHEMA_TYPE_AVRO) {
            return Err(SchemaError::Parse(format!(
                "unsupported schema type '{}'",
                self.schema_type
            ))
            .into());
        }
        let tags = self
            .metadata
            .as_ref()
            .map(|m| m.tags.clone())
            .unwrap_or_default();
        Ok(Schema::parse(&self.schema)?.with_path_tags(tags))
    }

    /// Rule set, empty when none is attached.
    pub fn rules(&self) -> RuleSet {
        self.rule_set.clone().unwrap_or_default()
    }
}

/// A schema registered under a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredSchema {
    pub id: u32,
    pub subject: String,
    pub version: u32,
    #[serde(flatten)]
    pub info: SchemaInfo,
}

/// Registry operations used by the pipeline.
pub trait Registry: Send + Sync + std::fmt::Debug {
    /// Register a schema under a subject.
    ///
    /// Registering content already present under the subject returns the
    /// existing id without creating a new version.
    ///
    /// # Returns
    ///
    /// The schema id.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Unavailable` or `RegistryError::Storage`.
    fn register_schema(&self, subject: &str, info: &SchemaInfo) -> Result<u32>;

    /// Fetch a schema by id.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::SchemaNotFound` for an unknown id.
    fn get_schema_by_id(&self, id: u32) -> Result<SchemaInfo>;

    /// Fetch the latest version registered under a subject.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::SubjectNotFound` for an unknown subject.
    fn get_latest_for_subject(&self, subject: &str) -> Result<RegisteredSchema>;

    /// Fetch a specific version of a subject.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::VersionNotFound` or
    /// `RegistryError::SubjectNotFound`.
    fn get_version(&self, subject: &str, version: u32) -> Result<RegisteredSchema>;

    /// All registered subjects, sorted.
    fn subjects(&self) -> Result<Vec<String>>;
}
