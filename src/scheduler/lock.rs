//! Distributed task locking over the key-value port
//!
//! One named lock per task id under `lock:task:{task_id}`. The value is a
//! random 128-bit lock id; only the holder of that id may release, via
//! compare-and-delete. The TTL guarantees release after a crash.

use crate::store::KeyValueStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default lock TTL
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(300);
/// Default delay between acquisition attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
/// Default maximum time to wait for a lock
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30);

/// Lock manager bound to a key-value store
#[derive(Clone)]
pub struct DistributedTaskLock {
    kv: Arc<dyn KeyValueStore>,
}

/// A held lock; releases on drop unless released explicitly
pub struct LockGuard {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    lock_id: String,
    released: bool,
}

impl LockGuard {
    /// The opaque lock id stored under the key
    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }

    /// Release now; returns false when the lock was no longer owned
    pub fn release(mut self) -> bool {
        self.released = true;
        let released = self.kv.compare_and_delete(&self.key, &self.lock_id);
        if released {
            debug!(key = %self.key, "released lock");
        }
        released
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            self.kv.compare_and_delete(&self.key, &self.lock_id);
        }
    }
}

fn lock_key(task_id: &str) -> String {
    format!("lock:task:{}", task_id)
}

impl DistributedTaskLock {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Acquire the lock for a task, retrying until `max_wait` elapses.
    /// Returns None on timeout.
    pub async fn acquire(
        &self,
        task_id: &str,
        ttl: Duration,
        retry_delay: Duration,
        max_wait: Duration,
    ) -> Option<LockGuard> {
        let key = lock_key(task_id);
        let lock_id = Uuid::new_v4().to_string();
        let deadline = Instant::now() + max_wait;

        loop {
            if self.kv.set_if_absent(&key, &lock_id, ttl) {
                debug!(task_id, "acquired lock");
                return Some(LockGuard {
                    kv: self.kv.clone(),
                    key,
                    lock_id,
                    released: false,
                });
            }
            if Instant::now() + retry_delay > deadline {
                warn!(task_id, max_wait_secs = max_wait.as_secs(), "lock acquisition timed out");
                return None;
            }
            tokio::time::sleep(retry_delay).await;
        }
    }

    /// Acquire with the default contention policy
    pub async fn acquire_default(&self, task_id: &str, ttl: Duration) -> Option<LockGuard> {
        self.acquire(task_id, ttl, DEFAULT_RETRY_DELAY, DEFAULT_MAX_WAIT)
            .await
    }

    /// Whether the task lock is currently held
    pub fn is_locked(&self, task_id: &str) -> bool {
        self.kv.get(&lock_key(task_id)).is_some()
    }

    /// Remaining TTL, if the lock is held
    pub fn lock_ttl(&self, task_id: &str) -> Option<Duration> {
        self.kv.time_to_live(&lock_key(task_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKvStore;

    fn manager() -> DistributedTaskLock {
        DistributedTaskLock::new(Arc::new(MemoryKvStore::new()))
    }

    #[tokio::test]
    async fn test_mutual_exclusion() {
        let lock = manager();
        let guard = lock
            .acquire(
                "sync",
                Duration::from_secs(30),
                Duration::from_millis(5),
                Duration::from_millis(20),
            )
            .await
            .unwrap();
        assert!(lock.is_locked("sync"));

        // Second holder times out while the first holds
        let contender = lock
            .acquire(
                "sync",
                Duration::from_secs(30),
                Duration::from_millis(5),
                Duration::from_millis(20),
            )
            .await;
        assert!(contender.is_none());

        assert!(guard.release());
        assert!(!lock.is_locked("sync"));
    }

    #[tokio::test]
    async fn test_release_on_drop() {
        let lock = manager();
        {
            let _guard = lock
                .acquire_default("scoped", Duration::from_secs(30))
                .await
                .unwrap();
            assert!(lock.is_locked("scoped"));
        }
        assert!(!lock.is_locked("scoped"));
    }

    #[tokio::test]
    async fn test_ttl_reported() {
        let lock = manager();
        let _guard = lock
            .acquire_default("ttl", Duration::from_secs(300))
            .await
            .unwrap();
        let remaining = lock.lock_ttl("ttl").unwrap();
        assert!(remaining <= Duration::from_secs(300));
        assert!(remaining > Duration::from_secs(290));
    }
}
