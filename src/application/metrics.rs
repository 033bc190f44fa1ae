//! Observability metrics for admission control.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters describing admission decisions.
///
/// Cloning shares the underlying counters.
#[derive(Debug, Clone, Default)]
pub struct AdmissionMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Requests that skipped admission (feature off or unscoped)
    passthrough: AtomicU64,
    /// Requests admitted after checks
    admitted: AtomicU64,
    /// Requests rejected by the burst limiter
    burst_rejected: AtomicU64,
    /// Requests rejected by the concurrency limiter
    concurrency_rejected: AtomicU64,
    /// Store failures absorbed by failing open
    backend_failures: AtomicU64,
}

impl AdmissionMetrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_passthrough(&self) {
        self.inner.passthrough.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_admitted(&self) {
        self.inner.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_burst_rejected(&self) {
        self.inner.burst_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_concurrency_rejected(&self) {
        self.inner
            .concurrency_rejected
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_backend_failure(&self) {
        self.inner.backend_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Requests that bypassed admission.
    pub fn passthrough(&self) -> u64 {
        self.inner.passthrough.load(Ordering::Relaxed)
    }

    /// Requests admitted after checks.
    pub fn admitted(&self) -> u64 {
        self.inner.admitted.load(Ordering::Relaxed)
    }

    /// Requests rejected by the burst limiter.
    pub fn burst_rejected(&self) -> u64 {
        self.inner.burst_rejected.load(Ordering::Relaxed)
    }

    /// Requests rejected by the concurrency limiter.
    pub fn concurrency_rejected(&self) -> u64 {
        self.inner.concurrency_rejected.load(Ordering::Relaxed)
    }

    /// Store failures that were absorbed by failing open.
    pub fn backend_failures(&self) -> u64 {
        self.inner.backend_failures.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            passthrough: self.passthrough(),
            admitted: self.admitted(),
            burst_rejected: self.burst_rejected(),
            concurrency_rejected: self.concurrency_rejected(),
            backend_failures: self.backend_failures(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        self.inner.passthrough.store(0, Ordering::Relaxed);
        self.inner.admitted.store(0, Ordering::Relaxed);
        self.inner.burst_rejected.store(0, Ordering::Relaxed);
        self.inner.concurrency_rejected.store(0, Ordering::Relaxed);
        self.inner.backend_failures.store(0, Ordering::Relaxed);
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Requests that skipped every check
    pub passthrough: u64,
    /// Requests admitted after checking
    pub admitted: u64,
    /// Requests rejected by the burst limit
    pub burst_rejected: u64,
    /// Requests rejected by the concurrency limit
    pub concurrency_rejected: u64,
    /// Shared store failures absorbed by failing open
    pub backend_failures: u64,
}

impl MetricsSnapshot {
    /// Total rejections of either kind.
    pub fn rejected(&self) -> u64 {
        self.burst_rejected.saturating_add(self.concurrency_rejected)
    }

    /// Fraction of checked requests that were rejected (0.0 to 1.0).
    ///
    /// Passthrough requests are not checked and do not count.
    pub fn rejection_rate(&self) -> f64 {
        let checked = self.admitted.saturating_add(self.rejected());
        if checked == 0 {
            0.0
        } else {
            self.rejected() as f64 / checked as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let metrics = AdmissionMetrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_rejection_rate() {
        let metrics = AdmissionMetrics::new();
        assert_eq!(metrics.snapshot().rejection_rate(), 0.0);

        metrics.record_passthrough();
        metrics.record_admitted();
        metrics.record_burst_rejected();
        metrics.record_concurrency_rejected();
        metrics.record_admitted();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.rejected(), 2);
        assert!((snapshot.rejection_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clone_shares_counters() {
        let metrics = AdmissionMetrics::new();
        let other = metrics.clone();
        other.record_backend_failure();
        other.record_backend_failure();
        assert_eq!(metrics.backend_failures(), 2);

        metrics.reset();
        assert_eq!(other.backend_failures(), 0);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::thread;

        let metrics = AdmissionMetrics::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        m.record_admitted();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.admitted(), 800);
    }
}
