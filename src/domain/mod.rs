//! Domain layer - pure types and rules with no runtime dependencies.
//!
//! - Caller identity and scope keys
//! - The in-process sliding window used for burst limiting
//! - Top-up orders and payment notifications

pub mod order;
pub mod scope;
pub mod window;
