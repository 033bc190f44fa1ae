//! Idempotent completion of top-up orders.
//!
//! Payment providers retry their callbacks and may deliver duplicates
//! concurrently. Completion takes the order's trade number lock from a
//! [`KeyMutexRegistry`], so the read-check-update of one order never
//! interleaves with itself and the user is credited at most once.

use crate::application::error::PaymentError;
use crate::application::key_mutex::KeyMutexRegistry;
use crate::application::ports::{Clock, NotificationVerifier, OrderRepository, QuotaLedger};
use crate::domain::order::{OrderStatus, PaymentNotification, TopUpOrder};
use std::fmt;
use std::sync::Arc;

/// Body returned to the payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyAck {
    /// The notification was handled; the provider stops retrying
    Success,
    /// The notification was refused; the provider may retry
    Fail,
}

impl NotifyAck {
    /// The literal response body.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyAck::Success => "success",
            NotifyAck::Fail => "fail",
        }
    }
}

impl fmt::Display for NotifyAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a completion attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The order moved from pending to success and the user was credited
    Completed,
    /// The order had already completed; nothing changed
    AlreadyCompleted,
}

/// Completes top-up orders under a per-trade-number lock.
#[derive(Clone)]
pub struct PaymentCompleter {
    locks: Arc<KeyMutexRegistry>,
    orders: Arc<dyn OrderRepository>,
    ledger: Arc<dyn QuotaLedger>,
    verifier: Arc<dyn NotificationVerifier>,
    clock: Arc<dyn Clock>,
}

impl PaymentCompleter {
    /// Create a completer.
    ///
    /// `locks` may be shared with other flows that mutate the same orders.
    pub fn new(
        locks: Arc<KeyMutexRegistry>,
        orders: Arc<dyn OrderRepository>,
        ledger: Arc<dyn QuotaLedger>,
        verifier: Arc<dyn NotificationVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            locks,
            orders,
            ledger,
            verifier,
            clock,
        }
    }

    /// Handle an asynchronous payment callback.
    ///
    /// Acknowledges `success` once the order is completed, including when a
    /// duplicate finds it already completed. Any refusal or failure
    /// acknowledges `fail`.
    pub async fn handle_notification(&self, notification: &PaymentNotification) -> NotifyAck {
        if notification.is_empty() {
            tracing::warn!("payment notification without parameters");
            return NotifyAck::Fail;
        }
        if !self.verifier.verify(notification.params()) {
            tracing::warn!("payment notification failed verification");
            return NotifyAck::Fail;
        }
        if !notification.is_trade_success() {
            tracing::warn!(
                trade_status = notification.get("trade_status").unwrap_or_default(),
                "payment notification for unpaid trade"
            );
            return NotifyAck::Fail;
        }
        let Some(trade_no) = notification.trade_no() else {
            tracing::warn!("payment notification without trade number");
            return NotifyAck::Fail;
        };

        match self.complete(trade_no).await {
            Ok(_) => NotifyAck::Success,
            Err(e) => {
                tracing::warn!(error = %e, trade_no = %trade_no, "payment completion failed");
                NotifyAck::Fail
            }
        }
    }

    /// Complete a pending order, at most once.
    ///
    /// Orders that are not pending are left untouched.
    ///
    /// # Errors
    /// `OrderNotFound` for an unknown trade number; `Repository` or `Ledger`
    /// when a port fails.
    pub async fn complete(&self, trade_no: &str) -> Result<CompletionOutcome, PaymentError> {
        let _guard = self.locks.lock(trade_no).await;
        self.complete_locked(trade_no).await
    }

    /// Complete an order by hand, e.g. when the provider callback was lost.
    ///
    /// A repeated call on a completed order succeeds without effect.
    ///
    /// # Errors
    /// As [`complete`](Self::complete), plus `InvalidStatus` for an order
    /// that was refunded.
    pub async fn admin_complete(&self, trade_no: &str) -> Result<CompletionOutcome, PaymentError> {
        let _guard = self.locks.lock(trade_no).await;

        let order = self.find(trade_no).await?;
        if order.status == OrderStatus::Refunded {
            return Err(PaymentError::InvalidStatus {
                trade_no: trade_no.to_string(),
                status: order.status,
                expected: OrderStatus::Pending,
            });
        }
        self.complete_locked(trade_no).await
    }

    async fn find(&self, trade_no: &str) -> Result<TopUpOrder, PaymentError> {
        self.orders
            .find_by_trade_no(trade_no)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(trade_no.to_string()))
    }

    // Caller holds the trade number lock.
    async fn complete_locked(&self, trade_no: &str) -> Result<CompletionOutcome, PaymentError> {
        let mut order = self.find(trade_no).await?;
        if !order.mark_completed(self.clock.unix_seconds()) {
            tracing::debug!(trade_no = %trade_no, status = %order.status, "order already settled");
            return Ok(CompletionOutcome::AlreadyCompleted);
        }

        self.orders.update(&order).await?;
        self.ledger.credit(order.user_id, order.amount).await?;

        tracing::info!(
            trade_no = %trade_no,
            user_id = order.user_id,
            amount = order.amount,
            "top-up order completed"
        );
        Ok(CompletionOutcome::Completed)
    }
}

impl fmt::Debug for PaymentCompleter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentCompleter")
            .field("locks", &self.locks.len())
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
