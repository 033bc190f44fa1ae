//! Error types.
//!
//! Only [`AdmissionError`] is ever surfaced to API callers. [`StoreError`]
//! stays inside the networked limiters, which absorb it and admit.

use thiserror::Error;

/// HTTP status returned for both rejection kinds.
pub const TOO_MANY_REQUESTS: u16 = 429;

/// A request was refused by admission control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// Too many requests inside the burst window
    #[error(
        "request rate too high: at most {limit} requests are allowed every {window_secs} seconds, please slow down"
    )]
    BurstExceeded {
        /// Configured burst limit
        limit: u32,
        /// Configured window length in seconds
        window_secs: u64,
    },
    /// Too many requests in flight at once
    #[error(
        "too many concurrent requests: at most {limit} may be in flight at once, please send fewer requests in parallel"
    )]
    ConcurrencyExceeded {
        /// Configured concurrency limit
        limit: u32,
    },
}

impl AdmissionError {
    /// HTTP status code to answer the rejected request with.
    pub fn status_code(&self) -> u16 {
        TOO_MANY_REQUESTS
    }

    /// Whether this rejection came from the burst limiter.
    pub fn is_burst(&self) -> bool {
        matches!(self, AdmissionError::BurstExceeded { .. })
    }
}

/// Failure talking to the networked store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A stored value could not be interpreted
    #[error("malformed value {value:?} under key {key}")]
    Parse {
        /// Key holding the value
        key: String,
        /// Raw value as read
        value: String,
    },
    /// Error reported by the Redis client
    #[cfg(feature = "redis-storage")]
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

/// Invalid admission configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Local burst windows would be swept while still inside their window
    #[error("local_entry_expiration of {expiration_secs}s is shorter than the {window_secs}s burst window")]
    ExpirationShorterThanWindow {
        /// Configured entry expiration in seconds
        expiration_secs: u64,
        /// Configured burst window in seconds
        window_secs: u64,
    },
    /// An environment variable held a value that does not parse
    #[error("invalid value {value:?} for {name}")]
    InvalidVar {
        /// Variable name
        name: &'static str,
        /// Raw value
        value: String,
    },
}

/// Failure while completing a payment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    /// No order exists for the trade number
    #[error("order {0} not found")]
    OrderNotFound(String),
    /// The order is in a state the operation does not accept
    #[error("order {trade_no} is {status}, expected {expected}")]
    InvalidStatus {
        /// Trade number of the order
        trade_no: String,
        /// Status the order was found in
        status: crate::domain::order::OrderStatus,
        /// Status the operation requires
        expected: crate::domain::order::OrderStatus,
    },
    /// The order store failed
    #[error("order store error: {0}")]
    Repository(String),
    /// Crediting the user failed
    #[error("quota ledger error: {0}")]
    Ledger(String),
    /// The payment provider refused or failed a refund
    #[error("refund gateway error: {0}")]
    Gateway(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_are_distinguishable() {
        let burst = AdmissionError::BurstExceeded {
            limit: 20,
            window_secs: 10,
        };
        let concurrency = AdmissionError::ConcurrencyExceeded { limit: 3 };

        assert_eq!(burst.status_code(), 429);
        assert_eq!(concurrency.status_code(), 429);
        assert!(burst.is_burst());
        assert!(!concurrency.is_burst());

        let burst_msg = burst.to_string();
        let concurrency_msg = concurrency.to_string();
        assert_ne!(burst_msg, concurrency_msg);
        assert!(burst_msg.contains("20 requests"));
        assert!(burst_msg.contains("10 seconds"));
        assert!(concurrency_msg.contains("at most 3"));
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Parse {
            key: "rc:burst:t:1".to_string(),
            value: "garbage".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "malformed value \"garbage\" under key rc:burst:t:1"
        );
    }
}
