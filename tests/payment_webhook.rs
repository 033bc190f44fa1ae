//! Integration tests for idempotent payment completion.

use gateway_admission::infrastructure::mocks::{
    MemoryLedger, MemoryOrderRepository, MockCaptureLayer, MockClock, StaticVerifier,
};
use gateway_admission::{
    CompletionOutcome, KeyMutexRegistry, NotifyAck, OrderStatus, PaymentCompleter,
    PaymentNotification, TopUpOrder,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

struct Harness {
    completer: PaymentCompleter,
    locks: Arc<KeyMutexRegistry>,
    orders: MemoryOrderRepository,
    ledger: MemoryLedger,
}

fn harness() -> Harness {
    let locks = Arc::new(KeyMutexRegistry::new());
    // Interleaving makes every repository call a suspension point, so
    // unserialized completions would both observe the pending state.
    let orders = MemoryOrderRepository::new().with_interleaving();
    let ledger = MemoryLedger::new();
    let completer = PaymentCompleter::new(
        Arc::clone(&locks),
        Arc::new(orders.clone()),
        Arc::new(ledger.clone()),
        Arc::new(StaticVerifier::accept()),
        Arc::new(MockClock::new(Instant::now())),
    );
    Harness {
        completer,
        locks,
        orders,
        ledger,
    }
}

fn paid(trade_no: &str) -> PaymentNotification {
    [("out_trade_no", trade_no), ("trade_status", "TRADE_SUCCESS")]
        .into_iter()
        .collect()
}

#[tokio::test]
async fn test_racing_duplicates_credit_once() {
    let h = harness();
    h.orders.insert(TopUpOrder::pending("T1", 42, 1_000));

    let notification = paid("T1");
    let (a, b, c) = tokio::join!(
        h.completer.handle_notification(&notification),
        h.completer.handle_notification(&notification),
        h.completer.handle_notification(&notification),
    );

    assert_eq!((a, b, c), (NotifyAck::Success, NotifyAck::Success, NotifyAck::Success));
    assert_eq!(h.orders.get("T1").unwrap().status, OrderStatus::Success);
    assert_eq!(h.orders.updates(), 1);
    assert_eq!(h.ledger.credits(), 1);
    assert_eq!(h.ledger.balance(42), 1_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_duplicates_across_threads() {
    let h = harness();
    h.orders.insert(TopUpOrder::pending("T2", 42, 250));
    let completer = Arc::new(h.completer);

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let completer = Arc::clone(&completer);
            tokio::spawn(async move { completer.handle_notification(&paid("T2")).await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), NotifyAck::Success);
    }

    assert_eq!(h.ledger.credits(), 1);
    assert_eq!(h.ledger.balance(42), 250);
}

#[tokio::test]
async fn test_webhook_and_admin_completion_race() {
    let h = harness();
    h.orders.insert(TopUpOrder::pending("T3", 7, 30));

    let notification = paid("T3");
    let (ack, manual) = tokio::join!(
        h.completer.handle_notification(&notification),
        h.completer.admin_complete("T3"),
    );

    assert_eq!(ack, NotifyAck::Success);
    assert!(manual.is_ok());
    assert_eq!(h.ledger.credits(), 1);
}

#[tokio::test]
async fn test_different_orders_complete_independently() {
    let h = harness();
    h.orders.insert(TopUpOrder::pending("A", 1, 10));
    h.orders.insert(TopUpOrder::pending("B", 2, 20));

    // An outside holder of A's lock does not block B.
    let held = h.locks.lock("A").await;
    assert_eq!(
        h.completer.complete("B").await,
        Ok(CompletionOutcome::Completed)
    );
    drop(held);

    assert_eq!(
        h.completer.complete("A").await,
        Ok(CompletionOutcome::Completed)
    );
    assert_eq!(h.ledger.balance(1), 10);
    assert_eq!(h.ledger.balance(2), 20);
}

#[tokio::test]
async fn test_completion_is_logged() {
    let capture = MockCaptureLayer::new();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let _default = tracing::subscriber::set_default(subscriber);

    let h = harness();
    h.orders.insert(TopUpOrder::pending("T4", 3, 5));

    assert_eq!(
        h.completer.handle_notification(&paid("T4")).await,
        NotifyAck::Success
    );
    assert_eq!(
        h.completer.handle_notification(&paid("missing")).await,
        NotifyAck::Fail
    );

    let info = capture.at_level(Level::INFO);
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].field("trade_no"), Some("T4"));

    let warnings = capture.at_level(Level::WARN);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].field("trade_no"), Some("missing"));
}
