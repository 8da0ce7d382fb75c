//! Rule Resolver.
//!
//! Fetches schemas and their rule sets from the registry and caches them.
//! Lookups by id and by subject+version are immutable and cached for the
//! life of the process. The latest version of a subject is re-fetched once
//! older than the schema TTL.
//!
//! When the registry is unavailable and only a stale latest entry is cached,
//! [`StalePolicy`] decides between failing and serving the stale entry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::flight::SingleFlight;
use crate::core::registry::{Registry, SchemaInfo};
use crate::core::retry::RetryPolicy;
use crate::core::rules::RuleSet;
use crate::core::schema::Schema;
use crate::error::{ErrorKind, Result};

/// Behavior when the registry is unavailable and a stale entry exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalePolicy {
    /// Surface `RegistryUnavailable`
    #[default]
    Fail,
    /// Serve the last known schema and rule set
    #[serde(rename = "stale")]
    ServeStale,
}

/// Schema and rule set for one registered schema id.
#[derive(Debug)]
pub struct ResolvedSchema {
    pub id: u32,
    /// Known when resolved through a subject
    pub subject: Option<String>,
    pub version: Option<u32>,
    pub schema: Schema,
    pub rule_set: RuleSet,
}

impl ResolvedSchema {
    fn from_info(
        id: u32,
        subject: Option<String>,
        version: Option<u32>,
        info: &SchemaInfo,
    ) -> Result<Self> {
        Ok(Self {
            id,
            subject,
            version,
            schema: info.parse()?,
            rule_set: info.rules(),
        })
    }

    /// Subject name, or the schema id when the subject is unknown.
    pub fn label(&self) -> String {
        match &self.subject {
            Some(s) => s.clone(),
            None => format!("schema id {}", self.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Lookup {
    Id(u32),
    Latest(String),
    Version(String, u32),
}

struct Latest {
    resolved: Arc<ResolvedSchema>,
    fetched_at: Instant,
}

/// Caching front of the registry.
pub struct RuleResolver {
    registry: Arc<dyn Registry>,
    by_id: RwLock<HashMap<u32, Arc<ResolvedSchema>>>,
    latest: RwLock<HashMap<String, Latest>>,
    versions: RwLock<HashMap<(String, u32), Arc<ResolvedSchema>>>,
    flights: SingleFlight<Lookup>,
    ttl: Duration,
    retry: RetryPolicy,
    on_unavailable: StalePolicy,
}

impl std::fmt::Debug for RuleResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleResolver")
            .field("registry", &self.registry)
            .field("cached_ids", &self.by_id.read().len())
            .field("ttl", &self.ttl)
            .field("on_unavailable", &self.on_unavailable)
            .finish()
    }
}

impl RuleResolver {
    pub fn new(
        registry: Arc<dyn Registry>,
        ttl: Duration,
        retry: RetryPolicy,
        on_unavailable: StalePolicy,
    ) -> Self {
        Self {
            registry,
            by_id: RwLock::new(HashMap::new()),
            latest: RwLock::new(HashMap::new()),
            versions: RwLock::new(HashMap::new()),
            flights: SingleFlight::new(),
            ttl,
            retry,
            on_unavailable,
        }
    }

    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    /// Latest schema and rule set for `subject`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::SubjectNotFound`, a schema parse error, or
    /// `RegistryError::Unavailable` once retries are exhausted and the stale
    /// policy does not apply.
    pub fn resolve(&self, subject: &str) -> Result<Arc<ResolvedSchema>> {
        if let Some(fresh) = self.fresh_latest(subject) {
            return Ok(fresh);
        }

        let _flight = self.flights.acquire(&Lookup::Latest(subject.to_string()));
        if let Some(fresh) = self.fresh_latest(subject) {
            return Ok(fresh);
        }

        let fetched = self
            .retry
            .run("registry latest", || self.registry.get_latest_for_subject(subject));

        let registered = match fetched {
            Ok(registered) => registered,
            Err(e) => return self.fallback_stale(subject, e),
        };

        let resolved = match self.versions.read().get(&(subject.to_string(), registered.version)) {
            Some(cached) if cached.id == registered.id => Arc::clone(cached),
            _ => Arc::new(ResolvedSchema::from_info(
                registered.id,
                Some(subject.to_string()),
                Some(registered.version),
                &registered.info,
            )?),
        };
        debug!(
            subject,
            id = resolved.id,
            version = registered.version,
            rules = resolved.rule_set.domain_rules.len(),
            "resolved latest schema"
        );

        self.store(subject, registered.version, &resolved);
        self.latest.write().insert(
            subject.to_string(),
            Latest {
                resolved: Arc::clone(&resolved),
                fetched_at: Instant::now(),
            },
        );
        Ok(resolved)
    }

    /// A pinned version of `subject`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::VersionNotFound` or the registry's error.
    pub fn resolve_pinned(&self, subject: &str, version: u32) -> Result<Arc<ResolvedSchema>> {
        let key = (subject.to_string(), version);
        if let Some(hit) = self.versions.read().get(&key) {
            return Ok(Arc::clone(hit));
        }

        let _flight = self.flights.acquire(&Lookup::Version(subject.to_string(), version));
        if let Some(hit) = self.versions.read().get(&key) {
            return Ok(Arc::clone(hit));
        }

        let registered = self
            .retry
            .run("registry version", || self.registry.get_version(subject, version))?;
        let resolved = Arc::new(ResolvedSchema::from_info(
            registered.id,
            Some(subject.to_string()),
            Some(version),
            &registered.info,
        )?);
        debug!(subject, version, id = resolved.id, "resolved pinned schema");

        self.store(subject, version, &resolved);
        Ok(resolved)
    }

    /// Schema and rule set for a schema id read from the wire.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::SchemaNotFound` or the registry's error.
    pub fn resolve_by_id(&self, id: u32) -> Result<Arc<ResolvedSchema>> {
        if let Some(hit) = self.by_id.read().get(&id) {
            return Ok(Arc::clone(hit));
        }

        let _flight = self.flights.acquire(&Lookup::Id(id));
        if let Some(hit) = self.by_id.read().get(&id) {
            return Ok(Arc::clone(hit));
        }

        let info = self
            .retry
            .run("registry by id", || self.registry.get_schema_by_id(id))?;
        let resolved = Arc::new(ResolvedSchema::from_info(id, None, None, &info)?);
        debug!(id, rules = resolved.rule_set.domain_rules.len(), "resolved schema by id");

        self.by_id.write().insert(id, Arc::clone(&resolved));
        Ok(resolved)
    }

    /// Forget the cached latest version of `subject`.
    pub fn invalidate(&self, subject: &str) {
        if self.latest.write().remove(subject).is_some() {
            debug!(subject, "invalidated latest schema");
        }
    }

    fn fresh_latest(&self, subject: &str) -> Option<Arc<ResolvedSchema>> {
        self.latest
            .read()
            .get(subject)
            .filter(|l| l.fetched_at.elapsed() < self.ttl)
            .map(|l| Arc::clone(&l.resolved))
    }

    fn fallback_stale(
        &self,
        subject: &str,
        err: crate::error::Error,
    ) -> Result<Arc<ResolvedSchema>> {
        if err.kind() != ErrorKind::RegistryUnavailable
            || self.on_unavailable != StalePolicy::ServeStale
        {
            return Err(err);
        }
        match self.latest.read().get(subject) {
            Some(stale) => {
                warn!(
                    subject,
                    id = stale.resolved.id,
                    age_secs = stale.fetched_at.elapsed().as_secs(),
                    error = %err,
                    "registry unavailable, serving stale schema"
                );
                Ok(Arc::clone(&stale.resolved))
            }
            None => Err(err),
        }
    }

    fn store(&self, subject: &str, version: u32, resolved: &Arc<ResolvedSchema>) {
        self.versions
            .write()
            .entry((subject.to_string(), version))
            .or_insert_with(|| Arc::clone(resolved));
        self.by_id
            .write()
            .entry(resolved.id)
            .or_insert_with(|| Arc::clone(resolved));
    }
}
