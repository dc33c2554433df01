//! # Cancellation Policy
//!
//! [`CancellationPolicy`] is the pure fee schedule. [`CancellationPolicyEngine`] is the
//! entry point callers use: it commits the decision through the state machine so that
//! the fee, the refund marker, and the idempotency record land in one write, and it also
//! carries the admin post-hoc refund of a completed booking.
//!
//! | status                                  | fee                                        |
//! |-----------------------------------------|--------------------------------------------|
//! | created, requested, matching, matched   | 0                                          |
//! | accepted                                | late fee if instant or inside the lead time |
//! | enroute, arrived, started               | late fee                                   |
//! | in_progress and later                   | not cancellable                            |

use crate::config::CancellationConfig;
use crate::error::{BookingError, BookingResult, ConflictReason};
use crate::models::{
    Actor, ActorRole, Booking, CancellationOutcome, CancellationResult, CancellationTerms,
    RefundState,
};
use crate::state_machine::{BookingState, BookingStateMachine};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Fee and refund decided for one cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    pub cancellation_fee: Decimal,
    pub refund_amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancellationPolicy {
    late_fee_percent: Decimal,
    free_cancellation_lead: Duration,
}

impl CancellationPolicy {
    pub fn new(late_fee_percent: u32, free_cancellation_lead: Duration) -> Self {
        Self {
            late_fee_percent: Decimal::from(late_fee_percent.min(100)),
            free_cancellation_lead,
        }
    }

    pub fn from_config(config: &CancellationConfig) -> Self {
        Self::new(
            config.late_fee_percent,
            Duration::minutes(config.free_cancellation_lead_minutes),
        )
    }

    /// Whether cancelling now falls inside the late window
    pub fn is_late(&self, booking: &Booking, now: DateTime<Utc>) -> bool {
        match booking.status {
            BookingState::Accepted => match booking.scheduled_at {
                None => true,
                Some(scheduled_at) => scheduled_at - now < self.free_cancellation_lead,
            },
            BookingState::Enroute | BookingState::Arrived | BookingState::Started => true,
            _ => false,
        }
    }

    /// Fee percentage that applies if the booking is cancelled at `now`
    pub fn fee_percent(&self, booking: &Booking, now: DateTime<Utc>) -> Decimal {
        if self.is_late(booking, now) {
            self.late_fee_percent
        } else {
            Decimal::ZERO
        }
    }

    pub fn assess(&self, booking: &Booking, now: DateTime<Utc>) -> Assessment {
        let cancellation_fee = (booking.total_amount * self.fee_percent(booking, now)
            / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Assessment {
            cancellation_fee,
            refund_amount: booking.total_amount - cancellation_fee,
        }
    }
}

impl Default for CancellationPolicy {
    fn default() -> Self {
        Self::from_config(&CancellationConfig::default())
    }
}

pub struct CancellationPolicyEngine {
    state_machine: Arc<BookingStateMachine>,
}

impl CancellationPolicyEngine {
    pub fn new(state_machine: Arc<BookingStateMachine>) -> Self {
        Self { state_machine }
    }

    pub async fn cancel(
        &self,
        booking_id: Uuid,
        actor: &Actor,
        terms: CancellationTerms,
    ) -> BookingResult<CancellationResult> {
        self.cancel_at(booking_id, actor, terms, Utc::now()).await
    }

    pub async fn cancel_at(
        &self,
        booking_id: Uuid,
        actor: &Actor,
        terms: CancellationTerms,
        now: DateTime<Utc>,
    ) -> BookingResult<CancellationResult> {
        self.state_machine
            .cancel_at(booking_id, actor, terms, now)
            .await
    }

    /// Fee and refund a cancellation would produce right now, without committing anything
    pub async fn quote_at(
        &self,
        booking_id: Uuid,
        now: DateTime<Utc>,
    ) -> BookingResult<Assessment> {
        let booking = self.state_machine.get(booking_id).await?;
        if !booking.status.is_cancellable() {
            return Err(BookingError::conflict(
                ConflictReason::NotCancellable,
                format!("booking {booking_id} is {} and cannot be cancelled", booking.status),
            ));
        }
        Ok(self.state_machine.policy().assess(&booking, now))
    }

    /// Admin refund of a completed booking. Settlement moves the booking to `refunded`.
    #[instrument(skip(self, admin, reason), fields(admin = %admin.id))]
    pub async fn refund_completed_at(
        &self,
        booking_id: Uuid,
        admin: &Actor,
        amount: Decimal,
        reason: &str,
        idempotency_key: &str,
        now: DateTime<Utc>,
    ) -> BookingResult<CancellationResult> {
        if admin.role != ActorRole::Admin {
            return Err(BookingError::Authorization {
                actor_id: admin.id.clone(),
                actor_role: admin.role,
                reason: "only admins may refund a completed booking".to_string(),
            });
        }
        if idempotency_key.trim().is_empty() {
            return Err(BookingError::validation("idempotency key must not be empty"));
        }

        let store = self.state_machine.store();
        if let Some(outcome) = store.find_outcome(booking_id, idempotency_key).await? {
            return Ok(CancellationResult {
                outcome,
                replayed: true,
            });
        }

        let current = self.state_machine.get(booking_id).await?;
        if current.status != BookingState::Completed {
            return Err(BookingError::Transition {
                from: current.status,
                to: BookingState::Refunded,
            });
        }
        if current.refund_state != RefundState::NotRequired {
            return Err(BookingError::conflict(
                ConflictReason::StaleStatus,
                format!(
                    "booking {booking_id} already has a refund in state {}",
                    current.refund_state
                ),
            ));
        }
        if current.payment_reference_id.is_none() {
            return Err(BookingError::validation(format!(
                "booking {booking_id} has no captured payment to refund"
            )));
        }
        if amount <= Decimal::ZERO || amount > current.total_amount {
            return Err(BookingError::validation(format!(
                "refund amount {amount} must be in (0, {}]",
                current.total_amount
            )));
        }

        let amount = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let mut next = current.clone();
        next.updated_at = now;
        next.refund_amount = Some(amount);
        next.refund_reason = Some(reason.to_string());
        next.refund_state = RefundState::Pending;
        next.next_refund_attempt_at = Some(now);
        next.idempotency_keys_used.insert(idempotency_key.to_string());
        next.check_invariants().map_err(BookingError::Internal)?;

        let outcome = CancellationOutcome {
            booking_id,
            idempotency_key: idempotency_key.to_string(),
            refund_amount: amount,
            cancellation_fee: Decimal::ZERO,
            new_status: BookingState::Refunded,
            refund_id: None,
            recorded_at: now,
        };

        info!(booking_id = %booking_id, amount = %amount, "Recording post-completion refund");
        self.state_machine
            .commit_outcome(current, next, outcome, admin, now)
            .await
    }
}
