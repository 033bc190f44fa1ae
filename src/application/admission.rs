//! Admission decision logic.
//!
//! Per request:
//!
//! ```text
//! Unchecked ─┬─ disabled or unscoped ──────────────────────────► Passthrough
//!            └─ BurstCheck ─┬─ over rate ──────────────────────► Rejected
//!                           └─ ConcurrencyCheck ─┬─ saturated ─► Rejected
//!                                                └─ Admitted ─► Downstream ─► Released
//! ```
//!
//! The burst check always runs first, so a burst rejection never takes a
//! concurrency slot. An admitted request owns a [`ConcurrencySlot`] that
//! gives the slot back when dropped.

use crate::application::config::AdmissionConfig;
use crate::application::error::AdmissionError;
use crate::application::metrics::AdmissionMetrics;
use crate::application::ports::{BurstLimiter, ConcurrencyLimiter};
use crate::domain::scope::{CallerIdentity, ScopeKey};
use std::fmt;
use std::sync::Arc;

/// Outcome of a successful admission.
#[derive(Debug)]
#[must_use = "dropping an admission releases its concurrency slot"]
pub enum Admission {
    /// No checks applied: admission control is off or the caller is unscoped
    Passthrough,
    /// Checks passed
    Admitted {
        /// Scope the request was checked under
        scope: ScopeKey,
        /// Held in-flight slot, if the concurrency check is active
        slot: Option<ConcurrencySlot>,
    },
}

impl Admission {
    /// Whether checks were skipped.
    pub fn is_passthrough(&self) -> bool {
        matches!(self, Admission::Passthrough)
    }

    /// Give back the concurrency slot, if any, waiting for the store.
    pub async fn release(self) {
        if let Admission::Admitted {
            slot: Some(slot), ..
        } = self
        {
            slot.release().await;
        }
    }
}

/// One in-flight slot for a scope.
///
/// Released exactly once: by [`release`](Self::release), or on drop when the
/// owning request panics or is cancelled.
#[must_use = "dropping a slot releases it immediately"]
pub struct ConcurrencySlot {
    key: String,
    limiter: Option<Arc<dyn ConcurrencyLimiter>>,
}

impl ConcurrencySlot {
    fn new(key: String, limiter: Arc<dyn ConcurrencyLimiter>) -> Self {
        Self {
            key,
            limiter: Some(limiter),
        }
    }

    /// Storage key of the slot's counter.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Give the slot back, waiting for the store.
    pub async fn release(mut self) {
        if let Some(limiter) = self.limiter.take() {
            limiter.release(&self.key).await;
        }
    }
}

impl fmt::Debug for ConcurrencySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrencySlot")
            .field("key", &self.key)
            .field("held", &self.limiter.is_some())
            .finish()
    }
}

impl Drop for ConcurrencySlot {
    fn drop(&mut self) {
        if let Some(limiter) = self.limiter.take() {
            limiter.release_detached(std::mem::take(&mut self.key));
        }
    }
}

/// Runs the burst and concurrency checks for a request.
#[derive(Clone)]
pub struct AdmissionGate {
    config: AdmissionConfig,
    burst: Arc<dyn BurstLimiter>,
    concurrency: Arc<dyn ConcurrencyLimiter>,
    metrics: AdmissionMetrics,
}

impl AdmissionGate {
    /// Create a gate over a pair of limiters.
    pub fn new(
        config: AdmissionConfig,
        burst: Arc<dyn BurstLimiter>,
        concurrency: Arc<dyn ConcurrencyLimiter>,
        metrics: AdmissionMetrics,
    ) -> Self {
        Self {
            config,
            burst,
            concurrency,
            metrics,
        }
    }

    /// Decide whether the caller may proceed.
    ///
    /// # Errors
    /// `BurstExceeded` or `ConcurrencyExceeded` when a check rejects.
    pub async fn admit(&self, identity: &CallerIdentity) -> Result<Admission, AdmissionError> {
        if !self.config.enabled {
            self.metrics.record_passthrough();
            return Ok(Admission::Passthrough);
        }
        let Some(scope) = identity.scope_key() else {
            self.metrics.record_passthrough();
            return Ok(Admission::Passthrough);
        };

        if self.config.burst_active() {
            let limit = self.config.burst_limit;
            let window_secs = self.config.burst_window_secs;
            if !self.burst.check(&scope.burst_key(), limit, window_secs).await {
                self.metrics.record_burst_rejected();
                tracing::debug!(scope = %scope, limit, window_secs, "burst limit exceeded");
                return Err(AdmissionError::BurstExceeded { limit, window_secs });
            }
        }

        let slot = if self.config.concurrency_active() {
            let limit = self.config.concurrency_limit;
            let key = scope.concurrency_key();
            if !self.concurrency.acquire(&key, limit).await {
                self.metrics.record_concurrency_rejected();
                tracing::debug!(scope = %scope, limit, "concurrency limit exceeded");
                return Err(AdmissionError::ConcurrencyExceeded { limit });
            }
            Some(ConcurrencySlot::new(key, Arc::clone(&self.concurrency)))
        } else {
            None
        };

        self.metrics.record_admitted();
        Ok(Admission::Admitted { scope, slot })
    }

    /// The configuration this gate enforces.
    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Metrics recorded by this gate.
    pub fn metrics(&self) -> &AdmissionMetrics {
        &self.metrics
    }
}

impl fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("config", &self.config)
            .field("burst", &self.burst)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}
