use super::states::BookingState;
use crate::error::{BookingError, ConflictReason};
use crate::models::ActorRole;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Why a guard refused a transition
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GuardError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: BookingState, to: BookingState },

    #[error("{role} {actor_id} may not move booking to {to}: {reason}")]
    Unauthorized {
        actor_id: String,
        role: ActorRole,
        to: BookingState,
        reason: String,
    },

    #[error("{deadline} passed at {expired_at}")]
    DeadlinePassed {
        deadline: &'static str,
        expired_at: DateTime<Utc>,
    },

    #[error("Booking {booking_id} is halted pending manual correction")]
    Halted { booking_id: Uuid },
}

/// Failure of a post-commit action. The transition itself is already durable.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Event publishing failed: {event_name}")]
    EventPublishFailed { event_name: String },

    #[error("Receipt generation failed for {booking_id}: {reason}")]
    ReceiptFailed { booking_id: Uuid, reason: String },

    #[error("Refund issue failed for {booking_id}: {reason}")]
    RefundFailed { booking_id: Uuid, reason: String },
}

pub type GuardResult<T> = Result<T, GuardError>;
pub type ActionResult<T> = Result<T, ActionError>;

impl From<GuardError> for BookingError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::InvalidTransition { from, to } => BookingError::Transition { from, to },
            GuardError::Unauthorized {
                actor_id,
                role,
                reason,
                ..
            } => BookingError::Authorization {
                actor_id,
                actor_role: role,
                reason,
            },
            GuardError::DeadlinePassed {
                deadline,
                expired_at,
            } => BookingError::Expiry {
                deadline,
                expired_at,
            },
            GuardError::Halted { booking_id } => BookingError::conflict(
                ConflictReason::InvariantHalt,
                format!("booking {booking_id} is halted pending manual correction"),
            ),
        }
    }
}

/// Helper to build an authorization failure
pub fn unauthorized(
    actor_id: impl Into<String>,
    role: ActorRole,
    to: BookingState,
    reason: impl Into<String>,
) -> GuardError {
    GuardError::Unauthorized {
        actor_id: actor_id.into(),
        role,
        to,
        reason: reason.into(),
    }
}
