//! Key-value store port with TTL semantics
//!
//! The distributed lock relies on two atomic operations: set-if-absent with
//! expiry, and compare-and-delete keyed on the stored value.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Cross-process coordination store
pub trait KeyValueStore: Send + Sync {
    /// Atomically set `key` to `value` with a TTL, only if absent.
    /// Returns true when the key was set.
    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> bool;

    /// Current value for `key`, if present and unexpired
    fn get(&self, key: &str) -> Option<String>;

    /// Atomically delete `key` only if its value equals `expected`.
    /// Returns true when the key was deleted.
    fn compare_and_delete(&self, key: &str, expected: &str) -> bool;

    /// Remaining TTL for `key`, if present and unexpired
    fn time_to_live(&self, key: &str) -> Option<Duration>;
}

/// In-process implementation with lazy expiry
#[derive(Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_expired(deadline: Instant) -> bool {
        Instant::now() >= deadline
    }
}

impl KeyValueStore for MemoryKvStore {
    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> bool {
        // The entry API gives us the atomicity; expired entries are treated
        // as absent and overwritten.
        let deadline = Instant::now() + ttl;
        match self.entries.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if Self::is_expired(occupied.get().1) {
                    occupied.insert((value.to_string(), deadline));
                    true
                } else {
                    false
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert((value.to_string(), deadline));
                true
            }
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        if Self::is_expired(entry.1) {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.0.clone())
    }

    fn compare_and_delete(&self, key: &str, expected: &str) -> bool {
        self.entries
            .remove_if(key, |_, (value, deadline)| {
                value == expected && !Self::is_expired(*deadline)
            })
            .is_some()
    }

    fn time_to_live(&self, key: &str) -> Option<Duration> {
        let entry = self.entries.get(key)?;
        entry.1.checked_duration_since(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_if_absent_contention() {
        let kv = MemoryKvStore::new();
        assert!(kv.set_if_absent("lock:task:a", "one", Duration::from_secs(10)));
        assert!(!kv.set_if_absent("lock:task:a", "two", Duration::from_secs(10)));
        assert_eq!(kv.get("lock:task:a").as_deref(), Some("one"));
    }

    #[test]
    fn test_compare_and_delete_requires_ownership() {
        let kv = MemoryKvStore::new();
        kv.set_if_absent("k", "owner", Duration::from_secs(10));
        assert!(!kv.compare_and_delete("k", "intruder"));
        assert!(kv.compare_and_delete("k", "owner"));
        assert!(kv.get("k").is_none());
    }

    #[test]
    fn test_ttl_expiry() {
        let kv = MemoryKvStore::new();
        kv.set_if_absent("k", "v", Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(kv.get("k").is_none());
        // Expired entry counts as absent
        assert!(kv.set_if_absent("k", "v2", Duration::from_secs(10)));
    }
}
