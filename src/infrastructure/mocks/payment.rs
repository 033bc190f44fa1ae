//! In-memory payment ports.

use crate::application::error::PaymentError;
use crate::application::ports::{NotificationVerifier, OrderRepository, QuotaLedger, RefundGateway};
use crate::domain::order::TopUpOrder;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Verifier with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct StaticVerifier {
    accept: bool,
}

impl StaticVerifier {
    /// Accept every notification.
    pub fn accept() -> Self {
        Self { accept: true }
    }

    /// Reject every notification.
    pub fn reject() -> Self {
        Self { accept: false }
    }
}

impl NotificationVerifier for StaticVerifier {
    fn verify(&self, _params: &BTreeMap<String, String>) -> bool {
        self.accept
    }
}

/// In-memory order store. Clones share state.
///
/// With interleaving enabled, every call yields to the scheduler before
/// touching state, so racing completions interleave as they would against
/// a database.
#[derive(Debug, Clone, Default)]
pub struct MemoryOrderRepository {
    orders: Arc<Mutex<HashMap<String, TopUpOrder>>>,
    updates: Arc<AtomicUsize>,
    interleave: bool,
}

impl MemoryOrderRepository {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Yield to the scheduler at the start of every call.
    pub fn with_interleaving(mut self) -> Self {
        self.interleave = true;
        self
    }

    /// Insert or replace an order.
    pub fn insert(&self, order: TopUpOrder) {
        self.orders
            .lock()
            .expect("MemoryOrderRepository mutex poisoned - a test thread panicked while holding the lock")
            .insert(order.trade_no.clone(), order);
    }

    /// Current state of an order.
    pub fn get(&self, trade_no: &str) -> Option<TopUpOrder> {
        self.orders
            .lock()
            .expect("MemoryOrderRepository mutex poisoned - a test thread panicked while holding the lock")
            .get(trade_no)
            .cloned()
    }

    /// Number of successful `update` calls.
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    async fn settle(&self) {
        if self.interleave {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl OrderRepository for MemoryOrderRepository {
    async fn find_by_trade_no(&self, trade_no: &str) -> Result<Option<TopUpOrder>, PaymentError> {
        self.settle().await;
        Ok(self.get(trade_no))
    }

    async fn update(&self, order: &TopUpOrder) -> Result<(), PaymentError> {
        self.settle().await;
        let mut orders = self
            .orders
            .lock()
            .expect("MemoryOrderRepository mutex poisoned - a test thread panicked while holding the lock");
        match orders.get_mut(&order.trade_no) {
            Some(stored) => {
                *stored = order.clone();
                self.updates.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(PaymentError::Repository(format!(
                "no row for {}",
                order.trade_no
            ))),
        }
    }
}

/// In-memory quota ledger. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    balances: Arc<Mutex<HashMap<u64, i64>>>,
    credits: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent credits fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Total credited to a user.
    pub fn balance(&self, user_id: u64) -> i64 {
        self.balances
            .lock()
            .expect("MemoryLedger mutex poisoned - a test thread panicked while holding the lock")
            .get(&user_id)
            .copied()
            .unwrap_or(0)
    }

    /// Number of successful credits.
    pub fn credits(&self) -> usize {
        self.credits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuotaLedger for MemoryLedger {
    async fn credit(&self, user_id: u64, amount: i64) -> Result<(), PaymentError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PaymentError::Ledger("ledger unavailable (simulated)".to_string()));
        }
        *self
            .balances
            .lock()
            .expect("MemoryLedger mutex poisoned - a test thread panicked while holding the lock")
            .entry(user_id)
            .or_insert(0) += amount;
        self.credits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory refund gateway recording refunded trade numbers. Clones share
/// state.
#[derive(Debug, Clone, Default)]
pub struct MemoryRefundGateway {
    refunds: Arc<Mutex<Vec<String>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryRefundGateway {
    /// Create a gateway that accepts every refund.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent refunds fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Trade numbers refunded so far, in order.
    pub fn refunds(&self) -> Vec<String> {
        self.refunds
            .lock()
            .expect("MemoryRefundGateway mutex poisoned - a test thread panicked while holding the lock")
            .clone()
    }
}

#[async_trait]
impl RefundGateway for MemoryRefundGateway {
    async fn refund(&self, order: &TopUpOrder) -> Result<(), PaymentError> {
        tokio::task::yield_now().await;
        if self.failing.load(Ordering::SeqCst) {
            return Err(PaymentError::Gateway("provider unavailable (simulated)".to_string()));
        }
        self.refunds
            .lock()
            .expect("MemoryRefundGateway mutex poisoned - a test thread panicked while holding the lock")
            .push(order.trade_no.clone());
        Ok(())
    }
}
