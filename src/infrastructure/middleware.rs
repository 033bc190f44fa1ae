//! Admission middleware wiring.
//!
//! [`AdmissionController`] picks the limiter backend once, at build time,
//! and wraps downstream handlers so their concurrency slot is always given
//! back.

use crate::application::{
    admission::{Admission, AdmissionGate},
    config::AdmissionConfig,
    error::{AdmissionError, ConfigError},
    metrics::AdmissionMetrics,
    ports::{BurstLimiter, Clock, ConcurrencyLimiter, SharedStore},
};
use crate::domain::scope::CallerIdentity;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::local::{LocalBurstLimiter, LocalConcurrencyLimiter};
use crate::infrastructure::networked::{NetworkedBurstLimiter, NetworkedConcurrencyLimiter};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Where limiter state lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// In this process only
    Local,
    /// In a [`SharedStore`] shared by every instance
    Networked,
}

/// Builder for constructing an [`AdmissionController`].
#[derive(Default)]
pub struct AdmissionControllerBuilder {
    config: AdmissionConfig,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Arc<dyn SharedStore>>,
    metrics: Option<AdmissionMetrics>,
}

impl AdmissionControllerBuilder {
    /// Set the limits to enforce.
    pub fn with_config(mut self, config: AdmissionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set a custom clock (default: system clock).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Keep limiter state in a shared store instead of in process.
    pub fn with_shared_store(mut self, store: Arc<dyn SharedStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Record into existing metrics instead of a fresh set.
    pub fn with_metrics(mut self, metrics: AdmissionMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the controller.
    ///
    /// # Errors
    /// Returns `ConfigError` if the configuration is invalid.
    pub fn build(self) -> Result<AdmissionController, ConfigError> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let metrics = self.metrics.unwrap_or_default();

        let (burst, concurrency, local) = match self.store {
            Some(store) => {
                let burst: Arc<dyn BurstLimiter> = Arc::new(NetworkedBurstLimiter::new(
                    Arc::clone(&store),
                    clock,
                    metrics.clone(),
                ));
                let concurrency: Arc<dyn ConcurrencyLimiter> =
                    Arc::new(NetworkedConcurrencyLimiter::new(store, metrics.clone()));
                (burst, concurrency, None)
            }
            None => {
                let local = LocalLimiters {
                    burst: Arc::new(LocalBurstLimiter::new(
                        clock,
                        self.config.local_entry_expiration,
                    )),
                    concurrency: Arc::new(LocalConcurrencyLimiter::new()),
                };
                let burst: Arc<dyn BurstLimiter> = local.burst.clone();
                let concurrency: Arc<dyn ConcurrencyLimiter> = local.concurrency.clone();
                (burst, concurrency, Some(local))
            }
        };

        let backend = if local.is_some() {
            Backend::Local
        } else {
            Backend::Networked
        };
        tracing::debug!(
            ?backend,
            enabled = self.config.enabled,
            burst_limit = self.config.burst_limit,
            burst_window_secs = self.config.burst_window_secs,
            concurrency_limit = self.config.concurrency_limit,
            "admission controller built"
        );

        Ok(AdmissionController {
            gate: AdmissionGate::new(self.config, burst, concurrency, metrics),
            backend,
            local,
        })
    }
}

#[derive(Debug, Clone)]
struct LocalLimiters {
    burst: Arc<LocalBurstLimiter>,
    concurrency: Arc<LocalConcurrencyLimiter>,
}

/// Per-caller burst and concurrency admission in front of a handler.
///
/// Clones share limiter state and metrics.
///
/// # Example
///
/// ```rust
/// use gateway_admission::{AdmissionConfig, AdmissionController, CallerIdentity};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let controller = AdmissionController::builder()
///     .with_config(AdmissionConfig::enabled().with_burst(3, 10))
///     .build()
///     .unwrap();
///
/// let caller = CallerIdentity::token(7, 42);
/// let reply = controller.run(&caller, || async { "ok" }).await;
/// assert_eq!(reply, Ok("ok"));
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AdmissionController {
    gate: AdmissionGate,
    backend: Backend,
    local: Option<LocalLimiters>,
}

impl AdmissionController {
    /// Create a builder for configuring the controller.
    ///
    /// Defaults:
    /// - Config: [`AdmissionConfig::default`] (disabled)
    /// - Backend: local
    /// - Clock: system clock
    pub fn builder() -> AdmissionControllerBuilder {
        AdmissionControllerBuilder::default()
    }

    /// Run the admission checks for a caller.
    ///
    /// The returned [`Admission`] holds the caller's concurrency slot until it
    /// is released or dropped.
    ///
    /// # Errors
    /// `BurstExceeded` or `ConcurrencyExceeded` when a check rejects.
    pub async fn admit(&self, identity: &CallerIdentity) -> Result<Admission, AdmissionError> {
        self.gate.admit(identity).await
    }

    /// Admit the caller, run `downstream`, then give the slot back.
    ///
    /// The slot is released whether the handler returns, panics, or is
    /// cancelled by dropping the returned future.
    ///
    /// # Errors
    /// The rejection, if the caller was not admitted. `downstream` is not
    /// called in that case.
    pub async fn run<F, Fut, T>(
        &self,
        identity: &CallerIdentity,
        downstream: F,
    ) -> Result<T, AdmissionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let admission = self.admit(identity).await?;
        let output = downstream().await;
        admission.release().await;
        Ok(output)
    }

    /// Backend selected at build time.
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// The enforced configuration.
    pub fn config(&self) -> &AdmissionConfig {
        self.gate.config()
    }

    /// Admission metrics.
    pub fn metrics(&self) -> &AdmissionMetrics {
        self.gate.metrics()
    }

    /// Drop idle local state: expired burst windows and zero counters.
    ///
    /// Returns the number of entries removed. A no-op for the networked
    /// backend, whose keys expire in the store.
    pub fn sweep_idle(&self) -> usize {
        match &self.local {
            Some(local) => local.burst.sweep_expired() + local.concurrency.prune_idle(),
            None => 0,
        }
    }

    /// Periodically drop expired local burst windows.
    ///
    /// Returns `None` for the networked backend. Must be called from within
    /// a tokio runtime.
    pub fn spawn_sweeper(&self, interval: Duration) -> Option<JoinHandle<()>> {
        self.local
            .as_ref()
            .map(|local| Arc::clone(&local.burst).spawn_sweeper(interval))
    }
}
