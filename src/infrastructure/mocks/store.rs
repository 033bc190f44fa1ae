//! In-memory stand-in for the networked store.

use crate::application::error::StoreError;
use crate::application::ports::SharedStore;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// In-memory [`SharedStore`] for tests.
///
/// Mirrors the Redis semantics the networked limiters rely on. TTLs are
/// recorded but never enforced. The store can be switched to fail every
/// call, and can yield to the scheduler after each command so that
/// concurrent callers interleave the way they would over a network.
///
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreState>>,
    unreachable: Arc<AtomicBool>,
    interleave: bool,
}

#[derive(Debug, Default)]
struct StoreState {
    counters: HashMap<String, i64>,
    peaks: HashMap<String, i64>,
    lists: HashMap<String, VecDeque<String>>,
    ttls: HashMap<String, Duration>,
}

impl MemoryStore {
    /// Create an empty, reachable store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Yield to the scheduler after every command.
    pub fn with_interleaving(mut self) -> Self {
        self.interleave = true;
        self
    }

    /// Make every subsequent command fail (or succeed again).
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Current value of an integer key (0 if absent).
    pub fn counter(&self, key: &str) -> i64 {
        self.state().counters.get(key).copied().unwrap_or(0)
    }

    /// Highest value an integer key has held.
    pub fn peak(&self, key: &str) -> i64 {
        self.state().peaks.get(key).copied().unwrap_or(0)
    }

    /// Contents of a list, head first.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.state()
            .lists
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Append a raw value at the tail of a list.
    pub fn push_raw(&self, key: &str, value: &str) {
        self.state()
            .lists
            .entry(key.to_string())
            .or_default()
            .push_back(value.to_string());
    }

    /// Last TTL set on a key.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.state().ttls.get(key).copied()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.inner
            .lock()
            .expect("MemoryStore mutex poisoned - a test thread panicked while holding the lock")
    }

    fn ensure_reachable(&self) -> Result<(), StoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "connection refused (simulated)".to_string(),
            ));
        }
        Ok(())
    }

    async fn settle(&self) {
        if self.interleave {
            tokio::task::yield_now().await;
        }
    }

    async fn add(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.ensure_reachable()?;
        let value = {
            let mut state = self.state();
            let value = {
                let counter = state.counters.entry(key.to_string()).or_insert(0);
                *counter += delta;
                *counter
            };
            let peak = state.peaks.entry(key.to_string()).or_insert(value);
            *peak = (*peak).max(value);
            value
        };
        self.settle().await;
        Ok(value)
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.add(key, 1).await
    }

    async fn decr(&self, key: &str) -> Result<i64, StoreError> {
        self.add(key, -1).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.ensure_reachable()?;
        self.state().ttls.insert(key.to_string(), ttl);
        self.settle().await;
        Ok(())
    }

    async fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        self.ensure_reachable()?;
        let len = self.state().lists.get(key).map_or(0, VecDeque::len);
        self.settle().await;
        Ok(len)
    }

    async fn list_push_front(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.ensure_reachable()?;
        self.state()
            .lists
            .entry(key.to_string())
            .or_default()
            .push_front(value);
        self.settle().await;
        Ok(())
    }

    async fn list_back(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.ensure_reachable()?;
        let back = self
            .state()
            .lists
            .get(key)
            .and_then(|list| list.back().cloned());
        self.settle().await;
        Ok(back)
    }

    async fn list_trim(&self, key: &str, len: usize) -> Result<(), StoreError> {
        self.ensure_reachable()?;
        if let Some(list) = self.state().lists.get_mut(key) {
            list.truncate(len);
        }
        self.settle().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counter_and_peak() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("c").await.unwrap(), 1);
        assert_eq!(store.incr("c").await.unwrap(), 2);
        assert_eq!(store.decr("c").await.unwrap(), 1);
        assert_eq!(store.counter("c"), 1);
        assert_eq!(store.peak("c"), 2);
    }

    #[tokio::test]
    async fn test_list_operations() {
        let store = MemoryStore::new();
        for value in ["1", "2", "3"] {
            store.list_push_front("l", value.to_string()).await.unwrap();
        }
        assert_eq!(store.list_len("l").await.unwrap(), 3);
        assert_eq!(store.list_back("l").await.unwrap().as_deref(), Some("1"));

        store.list_trim("l", 2).await.unwrap();
        assert_eq!(store.list("l"), vec!["3".to_string(), "2".to_string()]);
        assert_eq!(store.list_back("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unreachable() {
        let store = MemoryStore::new();
        store.set_unreachable(true);
        assert!(matches!(
            store.incr("c").await,
            Err(StoreError::Unavailable(_))
        ));

        store.set_unreachable(false);
        assert!(store.incr("c").await.is_ok());
    }
}
