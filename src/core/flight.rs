//! Per-key single-flight coalescing.
//!
//! A caller that misses a cache takes the key's flight before loading. A
//! second caller for the same key blocks on the flight, then re-checks the
//! cache and finds the first caller's result instead of issuing its own
//! network round trip. If the first caller failed, nothing was cached and the
//! waiter performs the load itself.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

/// Registry of in-progress loads, one lock per key.
#[derive(Debug)]
pub struct SingleFlight<K> {
    slots: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> SingleFlight<K> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Block until no other caller holds `key`, then hold it.
    pub fn acquire(&self, key: &K) -> Flight<'_, K> {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        // Lock outside the map lock so other keys are not blocked.
        let guard = slot.lock_arc();
        Flight {
            group: self,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    /// Number of keys with a holder or waiters.
    pub fn in_flight(&self) -> usize {
        self.slots.lock().len()
    }
}

impl<K: Eq + Hash + Clone> Default for SingleFlight<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive hold on one key, released on drop.
pub struct Flight<'a, K: Eq + Hash + Clone> {
    group: &'a SingleFlight<K>,
    key: K,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl<K: Eq + Hash + Clone> Drop for Flight<'_, K> {
    fn drop(&mut self) {
        let mut slots = self.group.slots.lock();
        self.guard.take();
        // Only the map's own reference left: nobody is waiting.
        if slots
            .get(&self.key)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_slot_removed_after_release() {
        let flights: SingleFlight<String> = SingleFlight::new();
        {
            let _f = flights.acquire(&"a".to_string());
            assert_eq!(flights.in_flight(), 1);
        }
        assert_eq!(flights.in_flight(), 0);
    }

    #[test]
    fn test_same_key_is_serialized() {
        let flights = Arc::new(SingleFlight::<u32>::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let flights = Arc::clone(&flights);
                let active = Arc::clone(&active);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    let _f = flights.acquire(&7);
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[test]
    fn test_different_keys_do_not_block() {
        let flights: SingleFlight<u32> = SingleFlight::new();
        let _a = flights.acquire(&1);
        let _b = flights.acquire(&2);
        assert_eq!(flights.in_flight(), 2);
    }
}
