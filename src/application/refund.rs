//! Refund of completed top-up orders.
//!
//! Refunds take the same trade number lock as completion, so a refund never
//! interleaves with a late provider callback or a manual completion of the
//! same order.

use crate::application::error::PaymentError;
use crate::application::key_mutex::KeyMutexRegistry;
use crate::application::ports::{OrderRepository, RefundGateway};
use crate::domain::order::OrderStatus;
use std::fmt;
use std::sync::Arc;

/// What a refund attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundOutcome {
    /// The provider refunded the payment and the order is now refunded
    Refunded,
    /// The order was already refunded; nothing changed
    AlreadyRefunded,
}

/// Refunds completed orders under a per-trade-number lock.
#[derive(Clone)]
pub struct OrderRefunder {
    locks: Arc<KeyMutexRegistry>,
    orders: Arc<dyn OrderRepository>,
    gateway: Arc<dyn RefundGateway>,
}

impl OrderRefunder {
    /// Create a refunder.
    ///
    /// Pass the registry used by [`PaymentCompleter`](crate::PaymentCompleter)
    /// so both flows serialize on the same keys.
    pub fn new(
        locks: Arc<KeyMutexRegistry>,
        orders: Arc<dyn OrderRepository>,
        gateway: Arc<dyn RefundGateway>,
    ) -> Self {
        Self {
            locks,
            orders,
            gateway,
        }
    }

    /// Refund a completed order, at most once.
    ///
    /// The provider is asked first; the order is marked refunded only after
    /// the provider accepts.
    ///
    /// # Errors
    /// `OrderNotFound` for an unknown trade number, `InvalidStatus` for an
    /// order that is still pending, `Gateway` when the provider refuses and
    /// `Repository` when the order store fails.
    pub async fn refund(&self, trade_no: &str) -> Result<RefundOutcome, PaymentError> {
        let trade_no = trade_no.trim();
        let _guard = self.locks.lock(trade_no).await;

        let mut order = self
            .orders
            .find_by_trade_no(trade_no)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(trade_no.to_string()))?;

        match order.status {
            OrderStatus::Refunded => return Ok(RefundOutcome::AlreadyRefunded),
            OrderStatus::Pending => {
                return Err(PaymentError::InvalidStatus {
                    trade_no: trade_no.to_string(),
                    status: order.status,
                    expected: OrderStatus::Success,
                })
            }
            OrderStatus::Success => {}
        }

        self.gateway.refund(&order).await?;
        order.mark_refunded();
        self.orders.update(&order).await?;

        tracing::info!(
            trade_no = %trade_no,
            user_id = order.user_id,
            amount = order.amount,
            "top-up order refunded"
        );
        Ok(RefundOutcome::Refunded)
    }
}

impl fmt::Debug for OrderRefunder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderRefunder")
            .field("locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::payment::{CompletionOutcome, PaymentCompleter};
    use crate::domain::order::TopUpOrder;
    use crate::infrastructure::mocks::{
        MemoryLedger, MemoryOrderRepository, MemoryRefundGateway, MockClock, StaticVerifier,
    };
    use std::time::Instant;

    struct Fixture {
        refunder: OrderRefunder,
        completer: PaymentCompleter,
        orders: MemoryOrderRepository,
        gateway: MemoryRefundGateway,
    }

    fn fixture() -> Fixture {
        let locks = Arc::new(KeyMutexRegistry::new());
        let orders = MemoryOrderRepository::new().with_interleaving();
        let gateway = MemoryRefundGateway::new();
        let refunder = OrderRefunder::new(
            Arc::clone(&locks),
            Arc::new(orders.clone()),
            Arc::new(gateway.clone()),
        );
        let completer = PaymentCompleter::new(
            locks,
            Arc::new(orders.clone()),
            Arc::new(MemoryLedger::new()),
            Arc::new(StaticVerifier::accept()),
            Arc::new(MockClock::new(Instant::now())),
        );
        Fixture {
            refunder,
            completer,
            orders,
            gateway,
        }
    }

    fn completed(trade_no: &str) -> TopUpOrder {
        let mut order = TopUpOrder::pending(trade_no, 7, 500);
        order.mark_completed(1);
        order
    }

    #[tokio::test]
    async fn test_refund_completed_order_once() {
        let f = fixture();
        f.orders.insert(completed("T1"));

        assert_eq!(f.refunder.refund("T1").await, Ok(RefundOutcome::Refunded));
        assert_eq!(
            f.refunder.refund(" T1 ").await,
            Ok(RefundOutcome::AlreadyRefunded)
        );

        assert_eq!(f.orders.get("T1").unwrap().status, OrderStatus::Refunded);
        assert_eq!(f.gateway.refunds(), vec!["T1".to_string()]);
    }

    #[tokio::test]
    async fn test_racing_refunds_call_gateway_once() {
        let f = fixture();
        f.orders.insert(completed("T2"));

        let (a, b, c) = tokio::join!(
            f.refunder.refund("T2"),
            f.refunder.refund("T2"),
            f.refunder.refund("T2"),
        );

        let mut outcomes = vec![a.unwrap(), b.unwrap(), c.unwrap()];
        outcomes.sort_by_key(|o| *o == RefundOutcome::Refunded);
        assert_eq!(
            outcomes,
            vec![
                RefundOutcome::AlreadyRefunded,
                RefundOutcome::AlreadyRefunded,
                RefundOutcome::Refunded
            ]
        );
        assert_eq!(f.gateway.refunds().len(), 1);
        assert_eq!(f.orders.updates(), 1);
    }

    #[tokio::test]
    async fn test_pending_and_unknown_orders_not_refunded() {
        let f = fixture();
        f.orders.insert(TopUpOrder::pending("P1", 7, 500));

        assert_eq!(
            f.refunder.refund("P1").await,
            Err(PaymentError::InvalidStatus {
                trade_no: "P1".to_string(),
                status: OrderStatus::Pending,
                expected: OrderStatus::Success,
            })
        );
        assert_eq!(
            f.refunder.refund("missing").await,
            Err(PaymentError::OrderNotFound("missing".to_string()))
        );
        assert!(f.gateway.refunds().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_failure_leaves_order_completed() {
        let f = fixture();
        f.orders.insert(completed("T3"));
        f.gateway.set_failing(true);

        assert!(matches!(
            f.refunder.refund("T3").await,
            Err(PaymentError::Gateway(_))
        ));
        assert_eq!(f.orders.get("T3").unwrap().status, OrderStatus::Success);

        f.gateway.set_failing(false);
        assert_eq!(f.refunder.refund("T3").await, Ok(RefundOutcome::Refunded));
    }

    #[tokio::test]
    async fn test_refund_and_admin_complete_serialize() {
        let f = fixture();
        f.orders.insert(completed("T4"));

        let (refund, manual) = tokio::join!(
            f.refunder.refund("T4"),
            f.completer.admin_complete("T4"),
        );

        assert_eq!(refund, Ok(RefundOutcome::Refunded));
        // Either the completion saw the settled order before the refund, or
        // it saw the refunded order and was refused.
        match manual {
            Ok(outcome) => assert_eq!(outcome, CompletionOutcome::AlreadyCompleted),
            Err(e) => assert!(matches!(
                e,
                PaymentError::InvalidStatus {
                    status: OrderStatus::Refunded,
                    ..
                }
            )),
        }
        assert_eq!(f.orders.get("T4").unwrap().status, OrderStatus::Refunded);
    }
}
