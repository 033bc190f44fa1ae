//! Lazily created per-key mutual exclusion.
//!
//! Used to serialize payment completion per trade number: providers retry
//! callbacks and sometimes deliver duplicates concurrently, and the
//! read-check-update of an order must not interleave with itself.
//!
//! Entries are created on first use and stay for the lifetime of the
//! registry. Callers with an unbounded key space should run
//! [`KeyMutexRegistry::prune_idle`] periodically.

use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
struct KeyLock {
    mutex: Arc<AsyncMutex<()>>,
    /// Guard held on behalf of a `lock_unguarded` caller.
    parked: Mutex<Option<OwnedMutexGuard<()>>>,
}

/// Registry of one mutex per string key.
///
/// Holders of the same key are serialized; different keys never contend
/// with each other. Waiters are not served in any particular order.
///
/// Waiting is unbounded. Wrap [`lock`](Self::lock) in
/// `tokio::time::timeout` to bound it.
#[derive(Debug, Default)]
pub struct KeyMutexRegistry {
    locks: DashMap<String, Arc<KeyLock>>,
}

/// Exclusive hold on one key, released on drop.
#[derive(Debug)]
#[must_use = "the key is unlocked as soon as the guard is dropped"]
pub struct KeyLockGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl KeyLockGuard {
    /// The locked key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the key now.
    pub fn unlock(self) {}
}

impl KeyMutexRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<KeyLock> {
        if let Some(existing) = self.locks.get(key) {
            return Arc::clone(existing.value());
        }
        // The shard lock taken by `entry` makes find-or-create atomic for
        // this key without blocking keys in other shards.
        Arc::clone(self.locks.entry(key.to_string()).or_default().value())
    }

    /// Wait for exclusive ownership of `key`.
    ///
    /// The map is never locked while waiting.
    pub async fn lock(&self, key: &str) -> KeyLockGuard {
        let mutex = Arc::clone(&self.entry(key).mutex);
        let guard = mutex.lock_owned().await;
        KeyLockGuard {
            key: key.to_string(),
            _guard: guard,
        }
    }

    /// Take ownership of `key` if nobody holds it.
    pub fn try_lock(&self, key: &str) -> Option<KeyLockGuard> {
        let mutex = Arc::clone(&self.entry(key).mutex);
        mutex.try_lock_owned().ok().map(|guard| KeyLockGuard {
            key: key.to_string(),
            _guard: guard,
        })
    }

    /// Wait for exclusive ownership of `key`, keeping it until
    /// [`unlock`](Self::unlock) is called with the same key.
    pub async fn lock_unguarded(&self, key: &str) {
        let entry = self.entry(key);
        let guard = Arc::clone(&entry.mutex).lock_owned().await;
        *entry.parked.lock().unwrap_or_else(PoisonError::into_inner) = Some(guard);
    }

    /// Release a key taken with [`lock_unguarded`](Self::lock_unguarded).
    ///
    /// Unknown keys and keys not currently held that way are ignored.
    pub fn unlock(&self, key: &str) {
        let Some(entry) = self.locks.get(key).map(|e| Arc::clone(e.value())) else {
            return;
        };
        let guard = entry
            .parked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(guard);
    }

    /// Whether an entry exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.locks.contains_key(key)
    }

    /// Number of keys with an entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Remove entries that nobody holds, waits on, or is about to lock.
    ///
    /// Returns how many entries were removed.
    pub fn prune_idle(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, entry| {
            // Another reference means a caller is between lookup and lock.
            Arc::strong_count(entry) > 1
                || Arc::strong_count(&entry.mutex) > 1
                || entry.mutex.try_lock().is_err()
        });
        before.saturating_sub(self.locks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let registry = KeyMutexRegistry::new();
        let guard = registry.lock("T1").await;
        assert_eq!(guard.key(), "T1");

        assert!(registry.try_lock("T1").is_none());
        assert!(timeout(Duration::from_millis(20), registry.lock("T1"))
            .await
            .is_err());

        guard.unlock();
        assert!(registry.try_lock("T1").is_some());
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_contend() {
        let registry = KeyMutexRegistry::new();
        let _a = registry.lock("A").await;
        let b = timeout(Duration::from_millis(50), registry.lock("B")).await;
        assert!(b.is_ok());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_serialized_holders_see_prior_writes() {
        let registry = Arc::new(KeyMutexRegistry::new());
        let value = Arc::new(AtomicUsize::new(0));
        let in_section = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let value = Arc::clone(&value);
                let in_section = Arc::clone(&in_section);
                tokio::spawn(async move {
                    for _ in 0..25 {
                        let _guard = registry.lock("order").await;
                        assert_eq!(in_section.fetch_add(1, Ordering::SeqCst), 0);
                        // Non-atomic read-modify-write; lost updates show up
                        // in the final count if two holders overlap.
                        let seen = value.load(Ordering::Relaxed);
                        tokio::task::yield_now().await;
                        value.store(seen + 1, Ordering::Relaxed);
                        in_section.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(value.load(Ordering::SeqCst), 200);
    }

    #[tokio::test]
    async fn test_unguarded_lock_and_unlock() {
        let registry = KeyMutexRegistry::new();
        registry.lock_unguarded("T1").await;
        assert!(registry.try_lock("T1").is_none());

        registry.unlock("T1");
        assert!(registry.try_lock("T1").is_some());
    }

    #[tokio::test]
    async fn test_unlock_unknown_key_is_noop() {
        let registry = KeyMutexRegistry::new();
        registry.unlock("never-seen");
        assert!(!registry.contains("never-seen"));

        // Unlocking a key held through a guard does not steal it.
        let _guard = registry.lock("held").await;
        registry.unlock("held");
        assert!(registry.try_lock("held").is_none());
    }

    #[tokio::test]
    async fn test_waiter_proceeds_after_unlock() {
        let registry = Arc::new(KeyMutexRegistry::new());
        registry.lock_unguarded("T1").await;

        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let _guard = registry.lock("T1").await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        registry.unlock("T1");
        timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_guard_released_on_cancellation() {
        let registry = Arc::new(KeyMutexRegistry::new());
        let (locked_tx, locked_rx) = tokio::sync::oneshot::channel();
        let holder = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let _guard = registry.lock("T1").await;
                let _ = locked_tx.send(());
                std::future::pending::<()>().await;
            })
        };
        locked_rx.await.unwrap();
        assert!(registry.try_lock("T1").is_none());

        holder.abort();
        let _ = holder.await;
        assert!(registry.try_lock("T1").is_some());
    }

    #[tokio::test]
    async fn test_entries_are_kept_until_pruned() {
        let registry = KeyMutexRegistry::new();
        registry.lock("idle").await.unlock();
        let _held = registry.lock("held").await;
        registry.lock_unguarded("parked").await;

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.prune_idle(), 1);
        assert!(!registry.contains("idle"));
        assert!(registry.contains("held"));
        assert!(registry.contains("parked"));
    }
}
