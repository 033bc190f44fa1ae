//! Top-up orders and the payment notifications that complete them.

use std::collections::BTreeMap;
use std::fmt;

/// Trade status a payment provider reports for a settled payment.
pub const TRADE_SUCCESS: &str = "TRADE_SUCCESS";

/// Lifecycle state of a top-up order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    /// Created, waiting for the provider to confirm payment
    Pending,
    /// Payment confirmed and quota credited
    Success,
    /// Payment returned to the payer
    Refunded,
}

impl OrderStatus {
    /// Wire name used by the order store.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Success => "success",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A top-up order as held by the order store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopUpOrder {
    /// Unique trade number, the idempotency key for completion
    pub trade_no: String,
    /// Owner of the order
    pub user_id: u64,
    /// Amount to credit once paid, in ledger units
    pub amount: i64,
    /// Current lifecycle state
    pub status: OrderStatus,
    /// Unix seconds at which the order completed
    pub complete_time: Option<u64>,
}

impl TopUpOrder {
    /// Create a pending order.
    pub fn pending(trade_no: impl Into<String>, user_id: u64, amount: i64) -> Self {
        Self {
            trade_no: trade_no.into(),
            user_id,
            amount,
            status: OrderStatus::Pending,
            complete_time: None,
        }
    }

    /// Whether the order still awaits payment.
    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    /// Transition a pending order to success.
    ///
    /// Returns `false` and leaves the order untouched if it is not pending.
    pub fn mark_completed(&mut self, unix_seconds: u64) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = OrderStatus::Success;
        self.complete_time = Some(unix_seconds);
        true
    }

    /// Transition a completed order to refunded.
    ///
    /// Returns `false` and leaves the order untouched unless it is `Success`.
    pub fn mark_refunded(&mut self) -> bool {
        if self.status != OrderStatus::Success {
            return false;
        }
        self.status = OrderStatus::Refunded;
        true
    }
}

/// Asynchronous payment callback as delivered by the provider.
///
/// Providers deliver the same notification more than once and may deliver
/// duplicates concurrently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentNotification {
    params: BTreeMap<String, String>,
}

impl PaymentNotification {
    /// Wrap the raw callback parameters.
    pub fn new(params: BTreeMap<String, String>) -> Self {
        Self { params }
    }

    /// Raw parameters, as handed to the signature verifier.
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Whether the callback carried no parameters at all.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Look up a parameter.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Whether the provider reports the trade as paid.
    pub fn is_trade_success(&self) -> bool {
        self.get("trade_status") == Some(TRADE_SUCCESS)
    }

    /// Our trade number: `out_trade_no`, falling back to `trade_no`.
    pub fn trade_no(&self) -> Option<&str> {
        ["out_trade_no", "trade_no"]
            .iter()
            .filter_map(|name| self.get(name))
            .map(str::trim)
            .find(|value| !value.is_empty())
    }
}

impl<K, V> FromIterator<(K, V)> for PaymentNotification
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
