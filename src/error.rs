//! Error types for the booking core.
//!
//! [`BookingError`] is the taxonomy every public operation returns. Each variant maps to a
//! stable reason string (see [`BookingError::reason_code`]) that is surfaced to callers
//! unchanged, so clients can branch on it without parsing messages.

use crate::config::ConfigurationError;
use crate::constants::services;
use crate::database::StoreError;
use crate::models::ActorRole;
use crate::services::{DirectoryError, PaymentError};
use crate::state_machine::BookingState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a conditional write or idempotent operation lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// Another provider already claimed the booking
    AlreadyAssigned,
    /// The booking moved past the status the caller read
    StaleStatus,
    /// Work is under way or the booking is already terminal
    NotCancellable,
    /// Automated transitions are halted pending manual correction
    InvariantHalt,
    /// A receipt was requested for a booking that never completed
    NotCompleted,
}

impl ConflictReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyAssigned => "already_assigned",
            Self::StaleStatus => "stale_status",
            Self::NotCancellable => "booking_not_cancellable",
            Self::InvariantHalt => "invariant_halt",
            Self::NotCompleted => "booking_not_completed",
        }
    }
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid transition from {from} to {to}")]
    Transition { from: BookingState, to: BookingState },

    #[error("{actor_role} {actor_id} is not authorized: {reason}")]
    Authorization {
        actor_id: String,
        actor_role: ActorRole,
        reason: String,
    },

    #[error("Deadline {deadline} passed at {expired_at}")]
    Expiry {
        deadline: &'static str,
        expired_at: DateTime<Utc>,
    },

    #[error("Conflict ({reason}): {detail}")]
    Conflict {
        reason: ConflictReason,
        detail: String,
    },

    #[error("External service {service} failed: {detail}")]
    ExternalService {
        service: &'static str,
        detail: String,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BookingError {
    /// Stable, machine-readable reason string
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Transition { .. } => "invalid_transition",
            Self::Authorization { .. } => "not_authorized",
            Self::Expiry { .. } => "deadline_expired",
            Self::Conflict { reason, .. } => reason.as_str(),
            Self::ExternalService { .. } => "external_service_error",
            Self::NotFound { .. } => "not_found",
            Self::Persistence(_) => "persistence_error",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn conflict(reason: ConflictReason, detail: impl Into<String>) -> Self {
        Self::Conflict {
            reason,
            detail: detail.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether this is the routine "someone else won the race" outcome
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn conflict_reason(&self) -> Option<ConflictReason> {
        match self {
            Self::Conflict { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

impl From<PaymentError> for BookingError {
    fn from(err: PaymentError) -> Self {
        Self::ExternalService {
            service: services::PAYMENT_GATEWAY,
            detail: err.to_string(),
        }
    }
}

impl From<DirectoryError> for BookingError {
    fn from(err: DirectoryError) -> Self {
        Self::ExternalService {
            service: services::PROVIDER_DIRECTORY,
            detail: err.to_string(),
        }
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
