//! Limiter adapters sharing state across processes through a [`SharedStore`].
//!
//! ## Approximate enforcement
//!
//! Every check is a sequence of separate store commands. Concurrent callers
//! can interleave between them, so:
//!
//! - the burst window can admit a few requests more than its limit when
//!   callers race on the read-check-write sequence;
//! - the concurrency counter can transiently read above its limit, by the
//!   number of callers racing between `INCR` and the compensating `DECR`.
//!
//! Closing these gaps needs an atomic check-and-increment on the store side
//! (a server-side script); this module issues plain commands only.
//!
//! ## Failure policy
//!
//! Store failures never reject a request. A failed read fails open: the
//! request is admitted, a warning is logged and the failure is counted in
//! [`AdmissionMetrics::backend_failures`]. There are no retries.

use crate::application::error::StoreError;
use crate::application::metrics::AdmissionMetrics;
use crate::application::ports::{BurstLimiter, Clock, ConcurrencyLimiter, SharedStore};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Extra lifetime given to a burst window beyond its length.
pub const BURST_TTL_MARGIN: Duration = Duration::from_secs(10);

/// Lifetime of a concurrency counter, reclaiming slots of crashed holders.
pub const CONCURRENCY_TTL: Duration = Duration::from_secs(5 * 60);

/// Burst limiter over a list of second-precision timestamps per key.
///
/// The list holds the newest sample at its head and at most `limit`
/// samples. A full list admits only once its oldest sample is `window`
/// seconds old.
#[derive(Debug, Clone)]
pub struct NetworkedBurstLimiter {
    store: Arc<dyn SharedStore>,
    clock: Arc<dyn Clock>,
    metrics: AdmissionMetrics,
}

impl NetworkedBurstLimiter {
    /// Create a burst limiter over `store`.
    pub fn new(store: Arc<dyn SharedStore>, clock: Arc<dyn Clock>, metrics: AdmissionMetrics) -> Self {
        Self {
            store,
            clock,
            metrics,
        }
    }

    async fn try_check(&self, key: &str, limit: u32, window_secs: u64) -> Result<bool, StoreError> {
        if limit == 0 {
            return Ok(false);
        }
        let ttl = Duration::from_secs(window_secs) + BURST_TTL_MARGIN;
        let now = self.clock.unix_seconds();

        let len = self.store.list_len(key).await?;
        if len < limit as usize {
            self.record(key, now, ttl, None).await;
            return Ok(true);
        }

        let oldest = match self.store.list_back(key).await? {
            Some(raw) => parse_timestamp(key, &raw)?,
            // Emptied (expired) between the two reads; there is room again.
            None => {
                self.record(key, now, ttl, Some(limit as usize)).await;
                return Ok(true);
            }
        };

        if now.saturating_sub(oldest) >= window_secs {
            self.record(key, now, ttl, Some(limit as usize)).await;
            Ok(true)
        } else {
            self.refresh_ttl(key, ttl).await;
            Ok(false)
        }
    }

    /// Push `now`, optionally trim, then refresh the TTL.
    ///
    /// The admit decision is already made; write failures are only logged.
    async fn record(&self, key: &str, now: u64, ttl: Duration, trim_to: Option<usize>) {
        if let Err(e) = self.store.list_push_front(key, now.to_string()).await {
            self.log_write_failure(key, "push", &e);
        }
        if let Some(len) = trim_to {
            if let Err(e) = self.store.list_trim(key, len).await {
                self.log_write_failure(key, "trim", &e);
            }
        }
        self.refresh_ttl(key, ttl).await;
    }

    async fn refresh_ttl(&self, key: &str, ttl: Duration) {
        if let Err(e) = self.store.expire(key, ttl).await {
            self.log_write_failure(key, "expire", &e);
        }
    }

    fn log_write_failure(&self, key: &str, op: &'static str, error: &StoreError) {
        self.metrics.record_backend_failure();
        tracing::warn!(error = %error, key = %key, op, "burst window write failed");
    }
}

#[async_trait]
impl BurstLimiter for NetworkedBurstLimiter {
    async fn check(&self, key: &str, limit: u32, window_secs: u64) -> bool {
        match self.try_check(key, limit, window_secs).await {
            Ok(admitted) => admitted,
            Err(e) => {
                self.metrics.record_backend_failure();
                tracing::warn!(error = %e, key = %key, "burst check failed, admitting request");
                true
            }
        }
    }
}

fn parse_timestamp(key: &str, raw: &str) -> Result<u64, StoreError> {
    raw.trim().parse().map_err(|_| StoreError::Parse {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

/// Concurrency limiter over an integer counter per key.
#[derive(Debug, Clone)]
pub struct NetworkedConcurrencyLimiter {
    store: Arc<dyn SharedStore>,
    metrics: AdmissionMetrics,
}

impl NetworkedConcurrencyLimiter {
    /// Create a concurrency limiter over `store`.
    pub fn new(store: Arc<dyn SharedStore>, metrics: AdmissionMetrics) -> Self {
        Self { store, metrics }
    }
}

#[async_trait]
impl ConcurrencyLimiter for NetworkedConcurrencyLimiter {
    async fn acquire(&self, key: &str, limit: u32) -> bool {
        let current = match self.store.incr(key).await {
            Ok(current) => current,
            Err(e) => {
                self.metrics.record_backend_failure();
                tracing::warn!(error = %e, key = %key, "concurrency check failed, admitting request");
                return true;
            }
        };

        if current == 1 {
            if let Err(e) = self.store.expire(key, CONCURRENCY_TTL).await {
                self.metrics.record_backend_failure();
                tracing::warn!(error = %e, key = %key, "failed to set concurrency counter ttl");
            }
        }

        if current > i64::from(limit) {
            if let Err(e) = self.store.decr(key).await {
                self.metrics.record_backend_failure();
                tracing::warn!(error = %e, key = %key, "failed to roll back concurrency counter");
            }
            return false;
        }
        true
    }

    async fn release(&self, key: &str) {
        if let Err(e) = self.store.decr(key).await {
            self.metrics.record_backend_failure();
            tracing::warn!(error = %e, key = %key, "failed to release concurrency slot");
        }
    }

    fn release_detached(self: Arc<Self>, key: String) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { self.release(&key).await });
            }
            Err(_) => {
                self.metrics.record_backend_failure();
                tracing::warn!(
                    key = %key,
                    ttl_secs = CONCURRENCY_TTL.as_secs(),
                    "no runtime to release concurrency slot, leaving it to expire"
                );
            }
        }
    }
}
