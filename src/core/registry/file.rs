//! File-backed registry.
//!
//! Stores the whole registry as `registry.json` in a directory. Every call
//! reloads the file, so separate processes (e.g. a `produce` and a later
//! `consume`) observe each other's registrations.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use super::memory::State;
use super::{RegisteredSchema, Registry, SchemaInfo};
use crate::error::{RegistryError, Result};

const REGISTRY_FILE: &str = "registry.json";

/// Registry persisted as JSON on disk.
#[derive(Debug)]
pub struct FileRegistry {
    dir: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileRegistry {
    /// Registry rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self) -> PathBuf {
        self.dir.join(REGISTRY_FILE)
    }

    fn load(&self) -> Result<State> {
        let path = self.path();
        if !path.exists() {
            return Ok(State::default());
        }
        let contents = fs::read_to_string(&path).map_err(|e| {
            RegistryError::Storage(format!("failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            RegistryError::Storage(format!("corrupt registry file {}: {}", path.display(), e))
                .into()
        })
    }

    fn save(&self, state: &State) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            RegistryError::Storage(format!("failed to create {}: {}", self.dir.display(), e))
        })?;
        let contents = serde_json::to_string_pretty(state)?;

        // write then rename so readers never see a partial file
        let tmp = self.dir.join(format!("{}.tmp", REGISTRY_FILE));
        fs::write(&tmp, contents)
            .and_then(|_| fs::rename(&tmp, self.path()))
            .map_err(|e| {
                RegistryError::Storage(format!("failed to write {}: {}", self.path().display(), e))
                    .into()
            })
    }
}

impl Registry for FileRegistry {
    fn register_schema(&self, subject: &str, info: &SchemaInfo) -> Result<u32> {
        let _guard = self.write_lock.lock();
        let mut state = self.load()?;
        let (id, created) = state.register(subject, info)?;
        if created {
            self.save(&state)?;
            debug!(path = %self.path().display(), "registry saved");
        }
        Ok(id)
    }

    fn get_schema_by_id(&self, id: u32) -> Result<SchemaInfo> {
        self.load()?.by_id(id)
    }

    fn get_latest_for_subject(&self, subject: &str) -> Result<RegisteredSchema> {
        self.load()?.latest(subject)
    }

    fn get_version(&self, subject: &str, version: u32) -> Result<RegisteredSchema> {
        self.load()?.version(subject, version)
    }

    fn subjects(&self) -> Result<Vec<String>> {
        Ok(self.load()?.subjects())
    }
}
