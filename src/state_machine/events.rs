use super::states::BookingState;
use crate::models::ActorRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const STATUS_CHANGED: &str = "booking.status_changed";
pub const OFFER_SENT: &str = "job_request.offer_sent";
pub const INVARIANT_VIOLATION: &str = "booking.invariant_violation";

/// Lifecycle events emitted to the notification layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BookingEvent {
    StatusChanged {
        booking_id: Uuid,
        old_status: BookingState,
        new_status: BookingState,
        provider_id: Option<String>,
        actor_role: ActorRole,
        /// Rendered notification text for `new_status`, if a template exists
        message: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    OfferSent {
        booking_id: Uuid,
        job_request_id: Uuid,
        provider_id: String,
        wave: i32,
        expires_at: DateTime<Utc>,
    },
    InvariantViolation {
        booking_id: Uuid,
        detail: String,
        occurred_at: DateTime<Utc>,
    },
}

impl BookingEvent {
    /// Get the published event name
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::StatusChanged { .. } => STATUS_CHANGED,
            Self::OfferSent { .. } => OFFER_SENT,
            Self::InvariantViolation { .. } => INVARIANT_VIOLATION,
        }
    }

    pub fn booking_id(&self) -> Uuid {
        match self {
            Self::StatusChanged { booking_id, .. }
            | Self::OfferSent { booking_id, .. }
            | Self::InvariantViolation { booking_id, .. } => *booking_id,
        }
    }

    /// Check if this event moved the booking into a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::StatusChanged { new_status, .. } if new_status.is_terminal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = BookingEvent::StatusChanged {
            booking_id: Uuid::nil(),
            old_status: BookingState::Matched,
            new_status: BookingState::Accepted,
            provider_id: Some("p-1".to_string()),
            actor_role: ActorRole::Provider,
            message: None,
            occurred_at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status_changed");
        assert_eq!(json["data"]["new_status"], "accepted");
        assert_eq!(event.event_name(), STATUS_CHANGED);
        assert!(!event.is_terminal());
    }
}
