//! In-process limiter adapters.
//!
//! State lives in sharded `DashMap`s for the lifetime of the limiter
//! instance. Entries are created on first use and are only removed by an
//! explicit sweep (`sweep_expired`, `prune_idle`).

use crate::application::ports::{BurstLimiter, Clock, ConcurrencyLimiter};
use crate::domain::window::SlidingWindow;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Sliding-window burst limiter keeping its windows in process memory.
///
/// Exact per process: the window of a key is updated under its shard lock.
#[derive(Debug)]
pub struct LocalBurstLimiter {
    windows: DashMap<String, SlidingWindow>,
    clock: Arc<dyn Clock>,
    entry_expiration: Duration,
}

impl LocalBurstLimiter {
    /// Create a limiter whose idle windows become sweepable after
    /// `entry_expiration`.
    pub fn new(clock: Arc<dyn Clock>, entry_expiration: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            clock,
            entry_expiration,
        }
    }

    /// Synchronous form of [`BurstLimiter::check`].
    pub fn check_now(&self, key: &str, limit: u32, window_secs: u64) -> bool {
        let now = self.clock.now();
        let window = Duration::from_secs(window_secs);

        if let Some(mut existing) = self.windows.get_mut(key) {
            return existing.try_admit(now, limit, window);
        }
        self.windows
            .entry(key.to_string())
            .or_default()
            .try_admit(now, limit, window)
    }

    /// Drop windows that have been idle longer than the entry expiration.
    ///
    /// Returns how many windows were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows
            .retain(|_, window| !window.is_idle(now, self.entry_expiration));
        before.saturating_sub(self.windows.len())
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `interval` on the
    /// current tokio runtime.
    ///
    /// Abort the returned handle to stop sweeping.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = self.sweep_expired();
                if removed > 0 {
                    tracing::debug!(removed, "swept idle burst windows");
                }
            }
        })
    }

    /// Number of keys with a window.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether no key has a window.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[async_trait]
impl BurstLimiter for LocalBurstLimiter {
    async fn check(&self, key: &str, limit: u32, window_secs: u64) -> bool {
        self.check_now(key, limit, window_secs)
    }
}

/// In-flight counter per key with exact enforcement.
///
/// Admission is a compare-and-swap loop, so a counter can never be pushed
/// past the limit by an acquire. Releases are plain decrements and are not
/// checked against acquires.
#[derive(Debug, Default)]
pub struct LocalConcurrencyLimiter {
    counters: DashMap<String, Arc<AtomicI64>>,
}

impl LocalConcurrencyLimiter {
    /// Create an empty limiter.
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, key: &str) -> Arc<AtomicI64> {
        if let Some(counter) = self.counters.get(key) {
            return Arc::clone(counter.value());
        }
        Arc::clone(
            self.counters
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AtomicI64::new(0)))
                .value(),
        )
    }

    /// Synchronous form of [`ConcurrencyLimiter::acquire`].
    pub fn try_acquire(&self, key: &str, limit: u32) -> bool {
        let counter = self.counter(key);
        let limit = i64::from(limit);
        let mut current = counter.load(Ordering::Acquire);
        loop {
            if current >= limit {
                return false;
            }
            match counter.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Synchronous form of [`ConcurrencyLimiter::release`].
    ///
    /// An unmatched release drives the counter below zero.
    pub fn release_now(&self, key: &str) {
        self.counter(key).fetch_sub(1, Ordering::AcqRel);
    }

    /// Current in-flight count for `key` (0 if never seen).
    pub fn count(&self, key: &str) -> i64 {
        self.counters
            .get(key)
            .map(|counter| counter.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Remove counters that are at zero and not referenced elsewhere.
    ///
    /// Returns how many counters were removed.
    pub fn prune_idle(&self) -> usize {
        let before = self.counters.len();
        self.counters.retain(|_, counter| {
            Arc::strong_count(counter) > 1 || counter.load(Ordering::Acquire) != 0
        });
        before.saturating_sub(self.counters.len())
    }

    /// Number of keys with a counter.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether no key has a counter.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[async_trait]
impl ConcurrencyLimiter for LocalConcurrencyLimiter {
    async fn acquire(&self, key: &str, limit: u32) -> bool {
        self.try_acquire(key, limit)
    }

    async fn release(&self, key: &str) {
        self.release_now(key);
    }

    fn release_detached(self: Arc<Self>, key: String) {
        self.release_now(&key);
    }
}
