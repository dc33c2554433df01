//! # Booking
//!
//! One customer request for one service. Bookings are only ever mutated through
//! state-machine-validated conditional writes and are never hard-deleted; terminal
//! bookings are the final record.

use crate::state_machine::BookingState;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// WGS84 coordinates of the service address
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    #[default]
    Standard,
    Urgent,
    Emergency,
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Urgent => write!(f, "urgent"),
            Self::Emergency => write!(f, "emergency"),
        }
    }
}

impl std::str::FromStr for Urgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "urgent" => Ok(Self::Urgent),
            "emergency" => Ok(Self::Emergency),
            _ => Err(format!("Invalid urgency: {s}")),
        }
    }
}

/// Where the money owed back to the customer stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundState {
    /// Nothing to refund (no capture, or zero refund)
    #[default]
    NotRequired,
    /// Amount decided and committed, gateway call not yet made
    Pending,
    /// Gateway returned a refund reference
    Issued,
    /// Gateway call failed; the reconciler will retry
    PendingReconciliation,
    /// Retries exhausted; needs an admin
    ManualReview,
}

impl RefundState {
    /// Whether the reconciler still owes the customer a gateway call
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Pending | Self::PendingReconciliation)
    }
}

impl fmt::Display for RefundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRequired => write!(f, "not_required"),
            Self::Pending => write!(f, "pending"),
            Self::Issued => write!(f, "issued"),
            Self::PendingReconciliation => write!(f, "pending_reconciliation"),
            Self::ManualReview => write!(f, "manual_review"),
        }
    }
}

impl std::str::FromStr for RefundState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_required" => Ok(Self::NotRequired),
            "pending" => Ok(Self::Pending),
            "issued" => Ok(Self::Issued),
            "pending_reconciliation" => Ok(Self::PendingReconciliation),
            "manual_review" => Ok(Self::ManualReview),
            _ => Err(format!("Invalid refund state: {s}")),
        }
    }
}

/// Customer input for a new booking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBooking {
    pub customer_id: String,
    pub service_id: String,
    /// `None` books the service as soon as possible
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    pub total_amount: Decimal,
    pub location: Location,
    #[serde(default)]
    pub urgency: Urgency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub customer_id: String,
    pub service_id: String,
    pub provider_id: Option<String>,
    pub status: BookingState,
    /// Bumped by every committed write; the optimistic-concurrency token
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub matching_expires_at: DateTime<Utc>,
    pub accept_deadline_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub work_completed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub total_amount: Decimal,
    pub payment_reference_id: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancellation_notes: Option<String>,
    pub cancellation_fee: Option<Decimal>,
    pub refund_amount: Option<Decimal>,
    pub refund_reason: Option<String>,
    pub refund_reference_id: Option<String>,
    pub refund_state: RefundState,
    pub refund_attempts: i32,
    pub next_refund_attempt_at: Option<DateTime<Utc>>,
    pub idempotency_keys_used: BTreeSet<String>,
    pub location: Location,
    pub urgency: Urgency,
    pub rating: Option<u8>,
    /// Set when an invariant violation was detected; blocks automated transitions
    pub halted: bool,
}

impl Booking {
    /// Build a freshly created booking whose matching window starts now
    pub fn new(request: NewBooking, now: DateTime<Utc>, matching_window: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id: request.customer_id,
            service_id: request.service_id,
            provider_id: None,
            status: BookingState::Created,
            version: 0,
            created_at: now,
            updated_at: now,
            scheduled_at: request.scheduled_at,
            matching_expires_at: now + matching_window,
            accept_deadline_at: None,
            accepted_at: None,
            work_completed_at: None,
            completed_at: None,
            cancelled_at: None,
            total_amount: request.total_amount,
            payment_reference_id: None,
            cancellation_reason: None,
            cancellation_notes: None,
            cancellation_fee: None,
            refund_amount: None,
            refund_reason: None,
            refund_reference_id: None,
            refund_state: RefundState::NotRequired,
            refund_attempts: 0,
            next_refund_attempt_at: None,
            idempotency_keys_used: BTreeSet::new(),
            location: request.location,
            urgency: request.urgency,
            rating: None,
            halted: false,
        }
    }

    /// Instant bookings have no scheduled time
    pub fn is_instant(&self) -> bool {
        self.scheduled_at.is_none()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// When the service is expected to happen: the scheduled time, or now for instant bookings
    pub fn service_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.scheduled_at.unwrap_or(now)
    }

    /// Check the record-level invariants that every committed write must preserve
    pub fn check_invariants(&self) -> Result<(), String> {
        let assigned = self.status.requires_provider();
        match (&self.provider_id, assigned) {
            (Some(provider), false) => {
                return Err(format!(
                    "booking {} has provider {provider} in unassigned status {}",
                    self.id, self.status
                ))
            }
            (None, true) => {
                return Err(format!(
                    "booking {} has no provider in assigned status {}",
                    self.id, self.status
                ))
            }
            _ => {}
        }

        if let Some(refund) = self.refund_amount {
            if refund > self.total_amount {
                return Err(format!(
                    "booking {} refund {refund} exceeds total {}",
                    self.id, self.total_amount
                ));
            }
            if refund.is_sign_negative() {
                return Err(format!("booking {} has negative refund {refund}", self.id));
            }
        }

        if let Some(fee) = self.cancellation_fee {
            if fee > self.total_amount || fee.is_sign_negative() {
                return Err(format!(
                    "booking {} cancellation fee {fee} outside [0, {}]",
                    self.id, self.total_amount
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn new_booking() -> Booking {
        Booking::new(
            NewBooking {
                customer_id: "customer-1".to_string(),
                service_id: "plumbing".to_string(),
                scheduled_at: None,
                total_amount: dec!(100.00),
                location: Location::new(52.52, 13.405),
                urgency: Urgency::Standard,
            },
            Utc::now(),
            Duration::minutes(15),
        )
    }

    #[test]
    fn test_new_booking_defaults() {
        let booking = new_booking();
        assert_eq!(booking.status, BookingState::Created);
        assert_eq!(booking.version, 0);
        assert!(booking.is_instant());
        assert!(booking.provider_id.is_none());
        assert_eq!(
            booking.matching_expires_at - booking.created_at,
            Duration::minutes(15)
        );
        assert!(booking.check_invariants().is_ok());
    }

    #[test]
    fn test_provider_invariant() {
        let mut booking = new_booking();
        booking.status = BookingState::Accepted;
        assert!(booking.check_invariants().is_err());

        booking.provider_id = Some("provider-1".to_string());
        assert!(booking.check_invariants().is_ok());

        booking.status = BookingState::Cancelled;
        assert!(booking.check_invariants().is_err());
    }

    #[test]
    fn test_refund_cannot_exceed_total() {
        let mut booking = new_booking();
        booking.refund_amount = Some(dec!(100.01));
        assert!(booking.check_invariants().is_err());

        booking.refund_amount = Some(dec!(100.00));
        assert!(booking.check_invariants().is_ok());
    }

    #[test]
    fn test_location_validation() {
        assert!(Location::new(0.0, 0.0).is_valid());
        assert!(!Location::new(91.0, 0.0).is_valid());
        assert!(!Location::new(0.0, f64::NAN).is_valid());
    }
}
