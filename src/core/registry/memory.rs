//! In-process registry.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{RegisteredSchema, Registry, SchemaInfo};
use crate::error::{RegistryError, Result};

/// Registry contents, shared by the in-memory and file-backed registries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct State {
    /// Schema with id `n` is at index `n - 1`
    schemas: Vec<SchemaInfo>,
    subjects: BTreeMap<String, Vec<SubjectVersion>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SubjectVersion {
    version: u32,
    id: u32,
    registered_at: DateTime<Utc>,
}

impl State {
    /// Returns the id and whether a new version was created.
    pub(super) fn register(&mut self, subject: &str, info: &SchemaInfo) -> Result<(u32, bool)> {
        let id = match self.schemas.iter().position(|s| s == info) {
            Some(index) => index as u32 + 1,
            None => {
                self.schemas.push(info.clone());
                u32::try_from(self.schemas.len())
                    .map_err(|_| RegistryError::Storage("schema id space exhausted".into()))?
            }
        };

        let versions = self.subjects.entry(subject.to_string()).or_default();
        if versions.iter().any(|v| v.id == id) {
            return Ok((id, false));
        }
        let version = versions.last().map_or(1, |v| v.version + 1);
        versions.push(SubjectVersion {
            version,
            id,
            registered_at: Utc::now(),
        });
        debug!(subject, id, version, "registered schema");
        Ok((id, true))
    }

    pub(super) fn by_id(&self, id: u32) -> Result<SchemaInfo> {
        id.checked_sub(1)
            .and_then(|i| self.schemas.get(i as usize))
            .cloned()
            .ok_or_else(|| RegistryError::SchemaNotFound(id).into())
    }

    pub(super) fn latest(&self, subject: &str) -> Result<RegisteredSchema> {
        let latest = self
            .subjects
            .get(subject)
            .and_then(|v| v.last())
            .ok_or_else(|| RegistryError::SubjectNotFound(subject.to_string()))?;
        self.registered(subject, latest)
    }

    pub(super) fn version(&self, subject: &str, version: u32) -> Result<RegisteredSchema> {
        let versions = self
            .subjects
            .get(subject)
            .ok_or_else(|| RegistryError::SubjectNotFound(subject.to_string()))?;
        let entry = versions
            .iter()
            .find(|v| v.version == version)
            .ok_or_else(|| RegistryError::VersionNotFound {
                subject: subject.to_string(),
                version,
            })?;
        self.registered(subject, entry)
    }

    pub(super) fn subjects(&self) -> Vec<String> {
        self.subjects.keys().cloned().collect()
    }

    fn registered(&self, subject: &str, entry: &SubjectVersion) -> Result<RegisteredSchema> {
        Ok(RegisteredSchema {
            id: entry.id,
            subject: subject.to_string(),
            version: entry.version,
            info: self.by_id(entry.id)?,
        })
    }
}

/// Registry held in process memory.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    state: RwLock<State>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Registry for MemoryRegistry {
    fn register_schema(&self, subject: &str, info: &SchemaInfo) -> Result<u32> {
        self.state.write().register(subject, info).map(|(id, _)| id)
    }

    fn get_schema_by_id(&self, id: u32) -> Result<SchemaInfo> {
        self.state.read().by_id(id)
    }

    fn get_latest_for_subject(&self, subject: &str) -> Result<RegisteredSchema> {
        self.state.read().latest(subject)
    }

    fn get_version(&self, subject: &str, version: u32) -> Result<RegisteredSchema> {
        self.state.read().version(subject, version)
    }

    fn subjects(&self) -> Result<Vec<String>> {
        Ok(self.state.read().subjects())
    }
}
