//! # Resilience
//!
//! Bounded retry with exponential backoff for gateway calls that happen after a
//! state transition has committed.

pub mod retry;

pub use retry::{retry_with_backoff, BackoffPolicy};
