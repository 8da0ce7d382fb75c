//! Data-Key Cache.
//!
//! Holds plaintext data keys in memory for a bounded time. Producer keys are
//! cached per key reference; reader keys are cached per key reference and
//! wrapped-key digest, since every producer may have wrapped its own DEK.
//! Entries are never shared across key references.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::{debug, trace};
use zeroize::Zeroizing;

use crate::core::flight::SingleFlight;
use crate::core::kms::KeyRef;
use crate::error::Result;

/// Plaintext DEK together with its wrapped form.
pub struct DataKey {
    plaintext: Zeroizing<Vec<u8>>,
    wrapped: Vec<u8>,
}

impl DataKey {
    pub fn new(plaintext: Zeroizing<Vec<u8>>, wrapped: Vec<u8>) -> Self {
        Self { plaintext, wrapped }
    }

    pub fn plaintext(&self) -> &[u8] {
        &self.plaintext
    }

    pub fn wrapped(&self) -> &[u8] {
        &self.wrapped
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataKey")
            .field("plaintext", &"[REDACTED]")
            .field("wrapped_len", &self.wrapped.len())
            .finish()
    }
}

/// Cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// The DEK a producer encrypts new fields with.
    Write(KeyRef),
    /// A DEK recovered from a wrapped key found in a message.
    Read(KeyRef, [u8; 32]),
}

impl CacheKey {
    /// Slot for a wrapped DEK read from a message.
    pub fn for_wrapped(key_ref: &KeyRef, wrapped: &[u8]) -> Self {
        Self::Read(key_ref.clone(), Sha256::digest(wrapped).into())
    }

    pub fn key_ref(&self) -> &KeyRef {
        match self {
            Self::Write(k) | Self::Read(k, _) => k,
        }
    }
}

struct Entry {
    key: Arc<DataKey>,
    expires_at: Instant,
}

/// TTL cache of data keys with single-flight loading.
pub struct DekCache {
    entries: RwLock<HashMap<CacheKey, Entry>>,
    flights: SingleFlight<CacheKey>,
    ttl: Duration,
}

impl std::fmt::Debug for DekCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DekCache")
            .field("entries", &self.entries.read().len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl DekCache {
    /// Create a cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            flights: SingleFlight::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached key if present and unexpired. Expired entries are evicted.
    pub fn get(&self, slot: &CacheKey) -> Option<Arc<DataKey>> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(slot) {
                Some(entry) if entry.expires_at > now => return Some(Arc::clone(&entry.key)),
                Some(_) => {}
                None => return None,
            }
        }

        trace!(key = %slot.key_ref(), "data key expired");
        let mut entries = self.entries.write();
        if entries.get(slot).is_some_and(|e| e.expires_at <= now) {
            entries.remove(slot);
        }
        None
    }

    /// Insert or replace an entry.
    pub fn put(&self, slot: CacheKey, key: Arc<DataKey>, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries.write().insert(slot, Entry { key, expires_at });
    }

    /// Drop every entry for `key_ref`, producer and reader slots alike.
    pub fn invalidate(&self, key_ref: &KeyRef) {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|slot, _| slot.key_ref() != key_ref);
        debug!(
            key = %key_ref,
            evicted = before - entries.len(),
            "invalidated data keys"
        );
    }

    /// Cached key, or the result of `load` stored under the cache TTL.
    ///
    /// Concurrent callers for the same cold slot run `load` once; the rest
    /// wait and read the stored result. A failed load stores nothing.
    pub fn get_or_load(
        &self,
        slot: &CacheKey,
        load: impl FnOnce() -> Result<DataKey>,
    ) -> Result<Arc<DataKey>> {
        if let Some(hit) = self.get(slot) {
            return Ok(hit);
        }

        let _flight = self.flights.acquire(slot);
        if let Some(hit) = self.get(slot) {
            trace!(key = %slot.key_ref(), "data key loaded by concurrent caller");
            return Ok(hit);
        }

        let key = Arc::new(load()?);
        self.put(slot.clone(), Arc::clone(&key), self.ttl);
        Ok(key)
    }

    /// Number of live and expired entries held.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KmsError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn key_ref(name: &str) -> KeyRef {
        KeyRef::new(name, "local-kms", "id")
    }

    fn data_key(byte: u8) -> DataKey {
        DataKey::new(Zeroizing::new(vec![byte; 32]), vec![byte; 8])
    }

    #[test]
    fn test_put_get() {
        let cache = DekCache::new(Duration::from_secs(60));
        let slot = CacheKey::Write(key_ref("a"));
        assert!(cache.get(&slot).is_none());

        cache.put(slot.clone(), Arc::new(data_key(1)), Duration::from_secs(60));
        assert_eq!(cache.get(&slot).unwrap().plaintext(), &[1u8; 32][..]);
    }

    #[test]
    fn test_expired_entry_is_miss() {
        let cache = DekCache::new(Duration::from_secs(60));
        let slot = CacheKey::Write(key_ref("a"));
        cache.put(slot.clone(), Arc::new(data_key(1)), Duration::from_millis(10));
        thread::sleep(Duration::from_millis(30));
        assert!(cache.get(&slot).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_drops_all_slots_for_key_ref() {
        let cache = DekCache::new(Duration::from_secs(60));
        let a = key_ref("a");
        let b = key_ref("b");
        cache.put(CacheKey::Write(a.clone()), Arc::new(data_key(1)), cache.ttl());
        cache.put(CacheKey::for_wrapped(&a, b"w1"), Arc::new(data_key(2)), cache.ttl());
        cache.put(CacheKey::Write(b.clone()), Arc::new(data_key(3)), cache.ttl());

        cache.invalidate(&a);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&CacheKey::Write(b)).is_some());
    }

    #[test]
    fn test_slots_not_shared_across_key_refs() {
        let cache = DekCache::new(Duration::from_secs(60));
        cache.put(CacheKey::Write(key_ref("a")), Arc::new(data_key(1)), cache.ttl());
        assert!(cache.get(&CacheKey::Write(key_ref("b"))).is_none());
        assert_ne!(
            CacheKey::for_wrapped(&key_ref("a"), b"w"),
            CacheKey::for_wrapped(&key_ref("b"), b"w")
        );
    }

    #[test]
    fn test_failed_load_caches_nothing() {
        let cache = DekCache::new(Duration::from_secs(60));
        let slot = CacheKey::Write(key_ref("a"));
        let result = cache.get_or_load(&slot, || Err(KmsError::Unavailable("down".into()).into()));
        assert!(result.is_err());
        assert!(cache.is_empty());

        let key = cache.get_or_load(&slot, || Ok(data_key(9))).unwrap();
        assert_eq!(key.wrapped(), &[9u8; 8][..]);
    }

    #[test]
    fn test_concurrent_cold_load_runs_once() {
        let cache = Arc::new(DekCache::new(Duration::from_secs(60)));
        let loads = Arc::new(AtomicUsize::new(0));
        let slot = CacheKey::Write(key_ref("hot"));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let loads = Arc::clone(&loads);
                let slot = slot.clone();
                thread::spawn(move || {
                    cache
                        .get_or_load(&slot, || {
                            loads.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            Ok(data_key(4))
                        })
                        .unwrap()
                })
            })
            .collect();

        for h in handles {
            assert_eq!(h.join().unwrap().plaintext(), &[4u8; 32][..]);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_debug_redacts_plaintext() {
        let key = data_key(0xAB);
        let dbg = format!("{:?}", key);
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains("171"));
    }
}
