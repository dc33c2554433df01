//! # Persistence
//!
//! [`BookingStore`] is the only path to booking, offer, cancellation-record, and receipt
//! storage. Two implementations:
//!
//! - [`InMemoryBookingStore`] - single-process, lock-based; used by tests and the
//!   `memory` backend
//! - [`PgBookingStore`] - PostgreSQL via `sqlx`, with schema migrations under `migrations/`

pub mod memory;
pub mod postgres;
pub mod store;

pub use memory::InMemoryBookingStore;
pub use postgres::PgBookingStore;
pub use store::{BookingStore, ClaimRequest, StoreError, StoreResult};
