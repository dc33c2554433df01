use crate::state_machine::BookingState;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller-supplied details of a cancellation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationTerms {
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub idempotency_key: String,
}

impl CancellationTerms {
    pub fn new(reason: impl Into<String>, idempotency_key: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            notes: None,
            idempotency_key: idempotency_key.into(),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Persisted result of a money decision, replayed for a repeated idempotency key. Amounts
/// and status never change after recording; only `refund_id` is filled in later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationOutcome {
    pub booking_id: Uuid,
    pub idempotency_key: String,
    pub refund_amount: Decimal,
    pub cancellation_fee: Decimal,
    pub new_status: BookingState,
    /// Gateway refund reference. `None` while the refund is pending reconciliation or none
    /// is owed; set once the refund settles, so a replay after settlement carries it.
    pub refund_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// What a cancel call returns: the recorded outcome and whether it was a replay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancellationResult {
    pub outcome: CancellationOutcome,
    pub replayed: bool,
}
