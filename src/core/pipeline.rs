//! Serialize/Deserialize Pipeline.
//!
//! Producer path: object → JSON → field tree checked against the subject's
//! schema → write-mode rules → Avro body → framed message.
//!
//! Consumer path: framed message → schema id → schema and rules by id →
//! field tree → read-mode rules → JSON → object.
//!
//! A record that fails produces no bytes; shared caches are left as they were.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as Json;
use tracing::{debug, trace};

use crate::core::config::Config;
use crate::core::envelope::EnvelopeCipher;
use crate::core::evaluator::RuleEvaluator;
use crate::core::kms::KmsRegistry;
use crate::core::registry::{Registry, SchemaInfo};
use crate::core::resolver::{ResolvedSchema, RuleResolver};
use crate::core::rules::Direction;
use crate::core::wire;
use crate::error::Result;

/// Which part of a message a schema describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerdeKind {
    Key,
    Value,
}

/// Subject for `topic` under the topic-name strategy.
pub fn subject_name(topic: &str, kind: SerdeKind) -> String {
    match kind {
        SerdeKind::Key => format!("{}-key", topic),
        SerdeKind::Value => format!("{}-value", topic),
    }
}

/// Field-encrypting serializer and deserializer.
#[derive(Debug, Clone)]
pub struct Pipeline {
    resolver: Arc<RuleResolver>,
    evaluator: RuleEvaluator,
}

impl Pipeline {
    pub fn new(resolver: Arc<RuleResolver>, evaluator: RuleEvaluator) -> Self {
        Self { resolver, evaluator }
    }

    /// Build a pipeline with cache, retry and stale settings from `config`.
    pub fn from_config(
        config: &Config,
        registry: Arc<dyn Registry>,
        kms: Arc<KmsRegistry>,
    ) -> Self {
        let retry = config.retry_policy();
        let resolver = RuleResolver::new(
            registry,
            config.schema_ttl(),
            retry,
            config.resolver.on_unavailable,
        );
        let cipher = EnvelopeCipher::new(kms, config.dek_ttl(), retry);
        Self::new(Arc::new(resolver), RuleEvaluator::new(Arc::new(cipher)))
    }

    pub fn resolver(&self) -> &RuleResolver {
        &self.resolver
    }

    pub fn evaluator(&self) -> &RuleEvaluator {
        &self.evaluator
    }

    /// Register a schema and drop the cached latest version of `subject`.
    pub fn register(&self, subject: &str, info: &SchemaInfo) -> Result<u32> {
        let id = self.resolver.registry().register_schema(subject, info)?;
        self.resolver.invalidate(subject);
        Ok(id)
    }

    /// Serialize `object` against the latest schema of `subject`.
    ///
    /// # Errors
    ///
    /// Returns registry, schema or rule evaluation errors. Nothing is
    /// produced for a failed record.
    pub fn serialize<T: Serialize>(&self, subject: &str, object: &T) -> Result<Vec<u8>> {
        self.serialize_value(subject, &serde_json::to_value(object)?)
    }

    /// Serialize `object` against a pinned version of `subject`.
    pub fn serialize_pinned<T: Serialize>(
        &self,
        subject: &str,
        version: u32,
        object: &T,
    ) -> Result<Vec<u8>> {
        let resolved = self.resolver.resolve_pinned(subject, version)?;
        self.encode(&resolved, subject, &serde_json::to_value(object)?)
    }

    /// Serialize a JSON document against the latest schema of `subject`.
    pub fn serialize_value(&self, subject: &str, json: &Json) -> Result<Vec<u8>> {
        let resolved = self.resolver.resolve(subject)?;
        self.encode(&resolved, subject, json)
    }

    /// Deserialize a message into `T`.
    ///
    /// # Errors
    ///
    /// Returns wire, registry, schema or rule evaluation errors, or a JSON
    /// error if the decoded record does not fit `T`.
    pub fn deserialize<T: DeserializeOwned>(&self, message: &[u8]) -> Result<T> {
        Ok(serde_json::from_value(self.deserialize_value(message)?)?)
    }

    /// Deserialize a message into a JSON document.
    pub fn deserialize_value(&self, message: &[u8]) -> Result<Json> {
        let (id, body) = wire::unframe(message)?;
        let resolved = self.resolver.resolve_by_id(id)?;
        let schema = &resolved.schema;

        let record = schema.decode(body)?;
        let record = self.evaluator.apply(
            &resolved.label(),
            schema,
            &resolved.rule_set,
            Direction::Read,
            record,
        )?;

        trace!(id, body_len = body.len(), "deserialized record");
        Ok(schema.value_to_json(&record))
    }

    fn encode(&self, resolved: &ResolvedSchema, subject: &str, json: &Json) -> Result<Vec<u8>> {
        let schema = &resolved.schema;
        let record = schema.value_from_json(json)?;
        let record = self.evaluator.apply(
            subject,
            schema,
            &resolved.rule_set,
            Direction::Write,
            record,
        )?;

        let body = schema.encode(&record)?;
        debug!(subject, id = resolved.id, body_len = body.len(), "serialized record");
        Ok(wire::frame(resolved.id, &body))
    }
}
