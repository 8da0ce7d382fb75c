//! Fieldguard - schema-bound field-level encryption for pub/sub records.
//!
//! Fields tagged in a record's schema (e.g. `PII`) are encrypted on the
//! producer side by ENCRYPT rules attached to the schema in the registry, and
//! transparently decrypted by any consumer with access to the key-encryption
//! key. The broker only ever sees ciphertext for those fields.
//!
//! # Architecture
//!
//! ```text
//! src/
//! ├── cli/              # Command-line interface
//! │   ├── register      # Register a schema with rules
//! │   ├── produce       # Serialize records to wire bytes
//! │   ├── consume       # Deserialize wire bytes to records
//! │   └── completions   # Shell completions
//! └── core/             # Core library components
//!     ├── kms/          # Key-management backends
//!     │   ├── mod       # KmsBackend trait and registry
//!     │   ├── local     # Secret-derived KEK
//!     │   ├── age       # age X25519 recipients
//!     │   ├── aws       # AWS KMS (feature "aws")
//!     │   └── gcp       # GCP Cloud KMS (feature "gcp")
//!     ├── cache         # Data-key cache with TTL
//!     ├── envelope      # DEK generation, wrap/unwrap, AES-GCM fields
//!     ├── rules         # Rule / RuleSet model
//!     ├── schema/       # Avro schemas, field tags, value tree, codec
//!     ├── registry/     # Registry trait, memory and file registries
//!     ├── resolver      # Caching schema + rule lookup
//!     ├── evaluator     # Applies rules to a record tree
//!     ├── wire          # Magic byte + schema id framing
//!     ├── pipeline      # serialize / deserialize
//!     ├── flight        # Single-flight loads
//!     ├── retry         # Bounded exponential backoff
//!     └── config        # fieldguard.toml
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use fieldguard::core::config::Config;
//! use fieldguard::core::kms::{KmsRegistry, LocalKms};
//! use fieldguard::core::pipeline::{subject_name, Pipeline, SerdeKind};
//! use fieldguard::core::registry::{MemoryRegistry, SchemaInfo};
//! use fieldguard::core::rules::{Rule, RuleSet};
//!
//! # fn main() -> fieldguard::error::Result<()> {
//! let kms = Arc::new(KmsRegistry::new());
//! kms.register(Arc::new(LocalKms::new("secret")?));
//!
//! let pipeline = Pipeline::from_config(&Config::default(), Arc::new(MemoryRegistry::new()), kms);
//! let subject = subject_name("users", SerdeKind::Value);
//! let schema = r#"{"type": "record", "name": "User", "fields": [
//!     {"name": "ssn", "type": "string", "confluent:tags": ["PII"]}
//! ]}"#;
//! let rule = Rule::encrypt("encryptPII", &["PII"], "kek1", "local-kms", "key-1");
//! pipeline.register(&subject, &SchemaInfo::avro(schema).with_rule_set(RuleSet::new(vec![rule])))?;
//!
//! let bytes = pipeline.serialize(&subject, &serde_json::json!({"ssn": "123-45-6789"}))?;
//! let record: serde_json::Value = pipeline.deserialize(&bytes)?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod core;
pub mod error;
