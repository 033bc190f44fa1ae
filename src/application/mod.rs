//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages the runtime behavior:
//! - Admission decisions (burst, then concurrency)
//! - Per-key mutual exclusion
//! - Idempotent payment completion and refund
//! - Configuration, errors and metrics
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod admission;
pub mod config;
pub mod error;
pub mod key_mutex;
pub mod metrics;
pub mod payment;
pub mod ports;
pub mod refund;
