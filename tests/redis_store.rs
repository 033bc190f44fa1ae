//! Integration tests for the Redis store.
//!
//! These tests require a Redis instance running at `redis://127.0.0.1/`.
//! Tests are ignored by default - run with `cargo test --features redis-storage --test redis_store -- --ignored`

#![cfg(feature = "redis-storage")]

use gateway_admission::infrastructure::mocks::MockClock;
use gateway_admission::{
    AdmissionConfig, AdmissionController, AdmissionError, CallerIdentity, RedisStore,
    RedisStoreConfig, SharedStore,
};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Check if Redis is available before running tests
async fn redis_available() -> bool {
    RedisStore::connect("redis://127.0.0.1/").await.is_ok()
}

/// Create a test store with a unique prefix
async fn create_test_store(test_name: &str) -> RedisStore {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .as_nanos();
    let config = RedisStoreConfig {
        key_prefix: format!("test:{}:{}:", test_name, nonce),
    };

    RedisStore::connect_with_config("redis://127.0.0.1/", config)
        .await
        .expect("Failed to connect to Redis")
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_redis_counter_commands() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available at redis://127.0.0.1/");
        return;
    }

    let store = create_test_store("counter").await;
    assert_eq!(store.incr("c").await.unwrap(), 1);
    assert_eq!(store.incr("c").await.unwrap(), 2);
    assert_eq!(store.decr("c").await.unwrap(), 1);
    store.expire("c", Duration::from_secs(30)).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_redis_list_commands() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }

    let store = create_test_store("list").await;
    assert_eq!(store.list_len("l").await.unwrap(), 0);
    assert_eq!(store.list_back("l").await.unwrap(), None);

    for value in ["100", "101", "102"] {
        store.list_push_front("l", value.to_string()).await.unwrap();
    }
    assert_eq!(store.list_len("l").await.unwrap(), 3);
    assert_eq!(store.list_back("l").await.unwrap().as_deref(), Some("100"));

    store.list_trim("l", 2).await.unwrap();
    assert_eq!(store.list_len("l").await.unwrap(), 2);
    assert_eq!(store.list_back("l").await.unwrap().as_deref(), Some("101"));
    store.expire("l", Duration::from_secs(30)).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_redis_backed_admission() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }

    let store = Arc::new(create_test_store("admission").await);
    let clock = MockClock::new(Instant::now());
    let controller = AdmissionController::builder()
        .with_config(
            AdmissionConfig::enabled()
                .with_burst(3, 10)
                .with_concurrency_limit(1),
        )
        .with_clock(Arc::new(clock.clone()))
        .with_shared_store(store)
        .build()
        .unwrap();
    let caller = CallerIdentity::user(77);

    let held = controller.admit(&caller).await.unwrap();
    assert_eq!(
        controller.admit(&caller).await.unwrap_err(),
        AdmissionError::ConcurrencyExceeded { limit: 1 }
    );
    held.release().await;

    assert!(controller.run(&caller, || async {}).await.is_ok());
    clock.advance(Duration::from_secs(1));
    assert!(controller.run(&caller, || async {}).await.unwrap_err().is_burst());

    clock.advance(Duration::from_secs(10));
    assert!(controller.run(&caller, || async {}).await.is_ok());
}
