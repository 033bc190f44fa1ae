//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::application::error::{PaymentError, StoreError};
use crate::domain::order::TopUpOrder;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Port for obtaining current time.
///
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Monotonic instant, used for in-process windows.
    fn now(&self) -> Instant;

    /// Wall-clock unix time in whole seconds, used for state shared
    /// between processes.
    fn unix_seconds(&self) -> u64;
}

/// Port for the networked key-value/list store backing the networked
/// limiters.
///
/// Each call is one round trip. Nothing here is atomic across calls.
#[async_trait]
pub trait SharedStore: Send + Sync + Debug {
    /// Atomically increment an integer key, returning the new value.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Atomically decrement an integer key, returning the new value.
    async fn decr(&self, key: &str) -> Result<i64, StoreError>;

    /// Set the time-to-live of a key.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Length of the list at `key` (0 if absent).
    async fn list_len(&self, key: &str) -> Result<usize, StoreError>;

    /// Push a value onto the head of the list at `key`.
    async fn list_push_front(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Read the tail (oldest) element of the list at `key`.
    async fn list_back(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Trim the list at `key` to its first `len` elements.
    async fn list_trim(&self, key: &str, len: usize) -> Result<(), StoreError>;
}

/// Port for burst (request rate) admission.
#[async_trait]
pub trait BurstLimiter: Send + Sync + Debug {
    /// Record a request for `key` and decide whether to admit it.
    ///
    /// Returns `true` to admit. Never waits on other callers.
    async fn check(&self, key: &str, limit: u32, window_secs: u64) -> bool;
}

/// Port for in-flight (concurrency) admission.
#[async_trait]
pub trait ConcurrencyLimiter: Send + Sync + Debug {
    /// Try to take one in-flight slot for `key`.
    ///
    /// Returns `true` if a slot was taken. Never waits on other callers.
    async fn acquire(&self, key: &str, limit: u32) -> bool;

    /// Give back a slot taken by [`acquire`](Self::acquire).
    ///
    /// Pairing is the caller's responsibility; an unmatched release is not
    /// detected.
    async fn release(&self, key: &str);

    /// Give back a slot from a context that cannot await, such as a drop.
    fn release_detached(self: Arc<Self>, key: String);
}

/// Port for checking the authenticity of a payment callback.
///
/// The signature scheme is provider specific and lives outside this crate.
pub trait NotificationVerifier: Send + Sync {
    /// Return `true` to accept the callback parameters as authentic.
    fn verify(&self, params: &BTreeMap<String, String>) -> bool;
}

/// Port for the top-up order store.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Fetch an order by trade number.
    async fn find_by_trade_no(&self, trade_no: &str) -> Result<Option<TopUpOrder>, PaymentError>;

    /// Persist an updated order.
    async fn update(&self, order: &TopUpOrder) -> Result<(), PaymentError>;
}

/// Port for crediting quota to a user.
#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Add `amount` to the user's quota.
    async fn credit(&self, user_id: u64, amount: i64) -> Result<(), PaymentError>;
}

/// Port for returning a completed payment to the payer.
///
/// Wraps the provider's remote refund API.
#[async_trait]
pub trait RefundGateway: Send + Sync {
    /// Refund `order.amount` for `order.trade_no` at the provider.
    async fn refund(&self, order: &TopUpOrder) -> Result<(), PaymentError>;
}
