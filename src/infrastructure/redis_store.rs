//! Redis-backed shared store.
//!
//! Lets several gateway instances share admission state. Each
//! [`SharedStore`] call maps onto a single Redis command:
//!
//! | port call         | command  |
//! |-------------------|----------|
//! | `incr`            | `INCR`   |
//! | `decr`            | `DECR`   |
//! | `expire`          | `EXPIRE` |
//! | `list_len`        | `LLEN`   |
//! | `list_push_front` | `LPUSH`  |
//! | `list_back`       | `LINDEX key -1` |
//! | `list_trim`       | `LTRIM key 0 len-1` |
//!
//! Connections go through `redis::aio::ConnectionManager`, which reconnects
//! on its own. Errors are returned to the limiters, which fail open.
//!
//! ## Example
//!
//! ```rust,ignore
//! use gateway_admission::{AdmissionConfig, AdmissionController, RedisStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = RedisStore::connect("redis://127.0.0.1/")
//!         .await
//!         .expect("Failed to connect to Redis");
//!
//!     let controller = AdmissionController::builder()
//!         .with_config(AdmissionConfig::enabled())
//!         .with_shared_store(Arc::new(store))
//!         .build()
//!         .unwrap();
//! }
//! ```

use crate::application::error::StoreError;
use crate::application::ports::SharedStore;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use std::fmt;
use std::time::Duration;

/// Configuration for the Redis store.
#[derive(Debug, Clone, Default)]
pub struct RedisStoreConfig {
    /// Prefix prepended to every key (default: none)
    pub key_prefix: String,
}

/// [`SharedStore`] backed by Redis.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    config: RedisStoreConfig,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis with default configuration.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., "redis://127.0.0.1/")
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        Self::connect_with_config(url, RedisStoreConfig::default()).await
    }

    /// Connect to Redis with custom configuration.
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect_with_config(
        url: &str,
        config: RedisStoreConfig,
    ) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self { connection, config })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    fn conn(&self) -> ConnectionManager {
        // ConnectionManager is a cheap handle onto one multiplexed connection.
        self.connection.clone()
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        Ok(self.conn().incr(self.key(key), 1i64).await?)
    }

    async fn decr(&self, key: &str) -> Result<i64, StoreError> {
        Ok(self.conn().decr(self.key(key), 1i64).await?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let _: bool = self.conn().expire(self.key(key), secs).await?;
        Ok(())
    }

    async fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        Ok(self.conn().llen(self.key(key)).await?)
    }

    async fn list_push_front(&self, key: &str, value: String) -> Result<(), StoreError> {
        let _: i64 = self.conn().lpush(self.key(key), value).await?;
        Ok(())
    }

    async fn list_back(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.conn().lindex(self.key(key), -1).await?)
    }

    async fn list_trim(&self, key: &str, len: usize) -> Result<(), StoreError> {
        let stop = isize::try_from(len).unwrap_or(isize::MAX) - 1;
        let _: () = self.conn().ltrim(self.key(key), 0, stop).await?;
        Ok(())
    }
}
