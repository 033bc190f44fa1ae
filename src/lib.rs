//! # gateway-admission
//!
//! Per-caller admission control and per-key mutual exclusion for an API
//! gateway.
//!
//! The crate provides two things:
//!
//! - An admission middleware that enforces a **burst limit** (requests per
//!   sliding window) and a **concurrency limit** (requests in flight) per
//!   caller. Limiter state lives either in process or in a shared store
//!   such as Redis, chosen once when the controller is built.
//! - A registry of lazily created **per-key mutexes**, used to make payment
//!   provider callbacks idempotent when they are delivered more than once or
//!   concurrently.
//!
//! ## Quick Start
//!
//! ```rust
//! use gateway_admission::{AdmissionConfig, AdmissionController, AdmissionError, CallerIdentity};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! // 3 requests per 10 seconds, 2 in flight, per caller.
//! let controller = AdmissionController::builder()
//!     .with_config(
//!         AdmissionConfig::enabled()
//!             .with_burst(3, 10)
//!             .with_concurrency_limit(2),
//!     )
//!     .build()
//!     .expect("valid config");
//!
//! let caller = CallerIdentity::token(7, 42);
//! for _ in 0..3 {
//!     assert!(controller.run(&caller, || async { "ok" }).await.is_ok());
//! }
//!
//! let rejected = controller.run(&caller, || async { "ok" }).await.unwrap_err();
//! assert_eq!(rejected.status_code(), 429);
//! assert!(matches!(rejected, AdmissionError::BurstExceeded { .. }));
//! # }
//! ```
//!
//! ## Scopes
//!
//! Callers are limited per **scope**: the API token when the request carries
//! one (`t:<token id>`), otherwise the user (`u:<user id>`). Requests with
//! neither bypass every check. Storage keys are `rc:burst:<scope>` and
//! `rc:conc:<scope>` for both backends.
//!
//! ## Backends
//!
//! | | Local | Networked |
//! |---|---|---|
//! | State | `DashMap` in this process | [`SharedStore`] (Redis) |
//! | Burst window | monotonic instants | unix-second list, TTL window + 10 s |
//! | Concurrency | exact (compare-and-swap) | approximate (`INCR`/`DECR`), TTL 300 s |
//! | Store failure | n/a | fail open, WARN log, counted |
//!
//! The networked backend issues plain commands with no server-side script,
//! so callers racing on the same key may briefly exceed a limit.
//!
//! ## Releasing slots
//!
//! An admitted request holds a [`ConcurrencySlot`] inside its [`Admission`].
//! [`AdmissionController::run`] releases it when the handler finishes; if
//! the handler panics or its future is dropped, the slot is released from
//! `Drop` instead.
//!
//! ## Payment completion
//!
//! ```rust
//! use gateway_admission::{KeyMutexRegistry, NotifyAck, PaymentCompleter, PaymentNotification, SystemClock, TopUpOrder};
//! use gateway_admission::infrastructure::mocks::{MemoryLedger, MemoryOrderRepository, StaticVerifier};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let orders = MemoryOrderRepository::new();
//! orders.insert(TopUpOrder::pending("T1", 7, 500));
//!
//! let completer = PaymentCompleter::new(
//!     Arc::new(KeyMutexRegistry::new()),
//!     Arc::new(orders.clone()),
//!     Arc::new(MemoryLedger::new()),
//!     Arc::new(StaticVerifier::accept()),
//!     Arc::new(SystemClock::new()),
//! );
//!
//! let notification: PaymentNotification =
//!     [("out_trade_no", "T1"), ("trade_status", "TRADE_SUCCESS")].into_iter().collect();
//! assert_eq!(completer.handle_notification(&notification).await, NotifyAck::Success);
//! // A duplicate delivery is acknowledged without crediting again.
//! assert_eq!(completer.handle_notification(&notification).await, NotifyAck::Success);
//! # }
//! ```
//!
//! ## Features
//!
//! - `redis-storage`: `RedisStore`, a [`SharedStore`] over Redis
//! - `serde`: `Serialize`/`Deserialize` for [`AdmissionConfig`]
//! - `test-helpers`: the mocks in `infrastructure::mocks`

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    order::{OrderStatus, PaymentNotification, TopUpOrder},
    scope::{CallerIdentity, ScopeKey},
    window::SlidingWindow,
};

pub use application::{
    admission::{Admission, AdmissionGate, ConcurrencySlot},
    config::AdmissionConfig,
    error::{AdmissionError, ConfigError, PaymentError, StoreError},
    key_mutex::{KeyLockGuard, KeyMutexRegistry},
    metrics::{AdmissionMetrics, MetricsSnapshot},
    payment::{CompletionOutcome, NotifyAck, PaymentCompleter},
    ports::{
        BurstLimiter, Clock, ConcurrencyLimiter, NotificationVerifier, OrderRepository,
        QuotaLedger, RefundGateway, SharedStore,
    },
    refund::{OrderRefunder, RefundOutcome},
};

pub use infrastructure::{
    clock::SystemClock,
    local::{LocalBurstLimiter, LocalConcurrencyLimiter},
    middleware::{AdmissionController, AdmissionControllerBuilder, Backend},
    networked::{NetworkedBurstLimiter, NetworkedConcurrencyLimiter},
};

#[cfg(feature = "redis-storage")]
pub use infrastructure::redis_store::{RedisStore, RedisStoreConfig};
