//! Instrumented KMS backend and registry doubles.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use fieldguard::core::envelope::EnvelopeCipher;
use fieldguard::core::evaluator::RuleEvaluator;
use fieldguard::core::kms::{KeyRef, KmsBackend, KmsRegistry, LocalKms};
use fieldguard::core::pipeline::Pipeline;
use fieldguard::core::registry::{MemoryRegistry, RegisteredSchema, Registry, SchemaInfo};
use fieldguard::core::resolver::{RuleResolver, StalePolicy};
use fieldguard::core::retry::RetryPolicy;
use fieldguard::core::rules::{Rule, RuleSet};
use fieldguard::error::{KmsError, RegistryError, Result};
use zeroize::Zeroizing;

/// `kmsType` served by [`CountingKms`].
pub const TEST_KMS_TYPE: &str = "test-kms";

/// Local KMS that counts calls and can be switched off.
#[derive(Debug)]
pub struct CountingKms {
    inner: LocalKms,
    pub wraps: AtomicUsize,
    pub unwraps: AtomicUsize,
    pub unavailable: AtomicBool,
    delay: Duration,
}

impl CountingKms {
    pub fn new(secret: &str) -> Self {
        Self {
            inner: LocalKms::new(secret).expect("valid secret"),
            wraps: AtomicUsize::new(0),
            unwraps: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
            delay: Duration::ZERO,
        }
    }

    /// Make every call take at least `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn wraps(&self) -> usize {
        self.wraps.load(Ordering::SeqCst)
    }

    pub fn unwraps(&self) -> usize {
        self.unwraps.load(Ordering::SeqCst)
    }

    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        thread::sleep(self.delay);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(KmsError::Unavailable("connection reset by peer".into()).into());
        }
        Ok(())
    }
}

impl KmsBackend for CountingKms {
    fn kms_type(&self) -> &str {
        TEST_KMS_TYPE
    }

    fn wrap(&self, key_ref: &KeyRef, plaintext_key: &[u8]) -> Result<Vec<u8>> {
        self.wraps.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.wrap(key_ref, plaintext_key)
    }

    fn unwrap(&self, key_ref: &KeyRef, wrapped_key: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.unwraps.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.unwrap(key_ref, wrapped_key)
    }
}

/// In-memory registry that counts fetches and can be switched off.
#[derive(Debug, Default)]
pub struct FlakyRegistry {
    inner: MemoryRegistry,
    pub fetches: AtomicUsize,
    pub down: AtomicBool,
}

impl FlakyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(RegistryError::Unavailable("503 service unavailable".into()).into());
        }
        Ok(())
    }
}

impl Registry for FlakyRegistry {
    fn register_schema(&self, subject: &str, info: &SchemaInfo) -> Result<u32> {
        self.inner.register_schema(subject, info)
    }

    fn get_schema_by_id(&self, id: u32) -> Result<SchemaInfo> {
        self.check()?;
        self.inner.get_schema_by_id(id)
    }

    fn get_latest_for_subject(&self, subject: &str) -> Result<RegisteredSchema> {
        self.check()?;
        self.inner.get_latest_for_subject(subject)
    }

    fn get_version(&self, subject: &str, version: u32) -> Result<RegisteredSchema> {
        self.check()?;
        self.inner.get_version(subject, version)
    }

    fn subjects(&self) -> Result<Vec<String>> {
        self.inner.subjects()
    }
}

/// A KMS registry holding only `backend`.
pub fn kms_with(backend: Arc<CountingKms>) -> Arc<KmsRegistry> {
    let kms = Arc::new(KmsRegistry::new());
    kms.register(backend);
    kms
}

/// Knobs for [`pipeline_with`].
pub struct Settings {
    pub dek_ttl: Duration,
    pub schema_ttl: Duration,
    pub retry: RetryPolicy,
    pub on_unavailable: StalePolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dek_ttl: Duration::from_secs(60),
            schema_ttl: Duration::from_secs(60),
            retry: RetryPolicy::none(),
            on_unavailable: StalePolicy::Fail,
        }
    }
}

/// Pipeline over `registry` and `kms` with explicit settings.
pub fn pipeline_with(
    registry: Arc<dyn Registry>,
    kms: Arc<KmsRegistry>,
    settings: Settings,
) -> Pipeline {
    let resolver = RuleResolver::new(
        registry,
        settings.schema_ttl,
        settings.retry,
        settings.on_unavailable,
    );
    let cipher = EnvelopeCipher::new(kms, settings.dek_ttl, settings.retry);
    Pipeline::new(Arc::new(resolver), RuleEvaluator::new(Arc::new(cipher)))
}

/// The PII encryption rule against [`CountingKms`].
pub fn encrypt_pii_rule() -> Rule {
    Rule::encrypt("encryptPII", &["PII"], "kek1", TEST_KMS_TYPE, "mykey")
}

/// Schema info for `schema` with the given rules.
pub fn schema_with_rules(schema: &str, rules: Vec<Rule>) -> SchemaInfo {
    let info = SchemaInfo::avro(schema);
    if rules.is_empty() {
        info
    } else {
        info.with_rule_set(RuleSet::new(rules))
    }
}
