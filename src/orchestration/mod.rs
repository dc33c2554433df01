//! # Orchestration
//!
//! Components that drive bookings through the state machine: creation and matching,
//! provider assignment, cancellation and refunds, receipts, and the periodic sweeps.
//! [`BookingCore`] wires them together.

pub mod assignment_coordinator;
pub mod booking_service;
pub mod cancellation_policy;
pub mod core;
pub mod expiry_sweeper;
pub mod payment_reconciler;
pub mod receipt_generator;
pub mod refunds;

pub use assignment_coordinator::AssignmentCoordinator;
pub use booking_service::BookingService;
pub use cancellation_policy::{Assessment, CancellationPolicy, CancellationPolicyEngine};
pub use core::BookingCore;
pub use expiry_sweeper::{ExpirySweeper, SweepReport};
pub use payment_reconciler::{PaymentReconciler, ReconcileReport};
pub use receipt_generator::ReceiptGenerator;
pub use refunds::{RefundAttempt, RefundProcessor};
