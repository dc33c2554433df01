#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! # Booking Core
//!
//! Booking lifecycle, provider matching, and assignment for an on-demand home-services
//! marketplace.
//!
//! ## Overview
//!
//! A customer request becomes a [`models::Booking`] that moves through one explicit
//! state machine from `created` to a terminal state. Providers are ranked by distance,
//! rating, and recency, then offered the booking in waves of time-boxed job requests.
//! The first provider to accept wins through a single conditional write; every other
//! caller gets `already_assigned`.
//!
//! ## Module Organization
//!
//! - [`state_machine`] - booking states, the shared transition table, guards, and post-commit actions
//! - [`matching`] - candidate ranking and the wave dispatcher
//! - [`orchestration`] - booking service, assignment, cancellation and refunds, receipts, sweeps
//! - [`database`] - the [`database::BookingStore`] trait with in-memory and PostgreSQL stores
//! - [`services`] - payment gateway and provider directory boundaries
//! - [`scheduling`] - requested-time validation
//! - [`events`] - fire-and-forget notification events and templates
//! - [`config`] - TOML plus environment configuration
//! - [`web`] - `axum` HTTP surface
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use booking_core::config::BookingConfig;
//! use booking_core::models::{Actor, Location, NewBooking, Urgency};
//! use booking_core::orchestration::BookingCore;
//! use rust_decimal::Decimal;
//!
//! # async fn example() -> Result<(), booking_core::BookingError> {
//! let core = BookingCore::in_memory(BookingConfig::default())?;
//! let booking = core
//!     .bookings
//!     .create_booking(
//!         NewBooking {
//!             customer_id: "customer-1".to_string(),
//!             service_id: "cleaning".to_string(),
//!             scheduled_at: None,
//!             total_amount: Decimal::new(8500, 2),
//!             location: Location::new(40.7128, -74.0060),
//!             urgency: Urgency::Standard,
//!         },
//!         &Actor::customer("customer-1"),
//!     )
//!     .await?;
//! println!("booking {} is {}", booking.id, booking.status);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod events;
pub mod logging;
pub mod matching;
pub mod models;
pub mod orchestration;
pub mod resilience;
pub mod scheduling;
pub mod services;
pub mod state_machine;
pub mod web;

pub use config::{BookingConfig, ConfigManager};
pub use error::{BookingError, BookingResult, ConflictReason};
pub use models::{Actor, ActorRole, Booking, JobRequest, NewBooking};
pub use orchestration::BookingCore;
pub use state_machine::{BookingState, BookingStateMachine};
