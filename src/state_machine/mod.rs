//! # Booking State Machine
//!
//! One tagged status enum with one transition table, guards for role and deadline rules,
//! and post-commit actions for events, receipts, and refunds.

pub mod actions;
pub mod booking_state_machine;
pub mod errors;
pub mod events;
pub mod guards;
pub mod states;

pub use actions::{
    CommittedTransition, GenerateReceiptAction, IssueRefundAction, PublishTransitionEventAction,
    StateAction,
};
pub use booking_state_machine::{BookingStateMachine, TransitionContext};
pub use errors::{ActionError, GuardError};
pub use events::BookingEvent;
pub use guards::TransitionGuard;
pub use states::BookingState;
