//! Mock implementations for testing.
//!
//! This module provides test doubles for infrastructure adapters,
//! enabling controlled testing of application logic.

pub mod clock;
pub mod layer;
pub mod payment;
pub mod store;

pub use clock::{MockClock, MOCK_EPOCH_UNIX_SECONDS};
pub use layer::{CapturedEvent, MockCaptureLayer};
pub use payment::{MemoryLedger, MemoryOrderRepository, MemoryRefundGateway, StaticVerifier};
pub use store::MemoryStore;
