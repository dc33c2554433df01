//! # Refund Processor
//!
//! Makes the gateway refund call for a booking whose refund has already been committed as
//! owed. The call happens strictly after that commit; its result is recorded with a second
//! conditional write:
//!
//! - success: `refund_state = issued`, reference stored, `cancelled|completed → refunded`
//! - failure: `pending_reconciliation` with the next attempt scheduled by [`BackoffPolicy`]
//! - failure with attempts exhausted: `manual_review` plus a critical alert

use crate::database::BookingStore;
use crate::error::{BookingError, BookingResult, ConflictReason};
use crate::events::EventPublisher;
use crate::models::{ActorRole, Booking, RefundState};
use crate::resilience::BackoffPolicy;
use crate::services::PaymentGateway;
use crate::state_machine::{BookingEvent, BookingState};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What one refund attempt achieved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundAttempt {
    Settled { refund_id: String },
    Retrying {
        attempts: i32,
        next_attempt_at: DateTime<Utc>,
    },
    Escalated { attempts: i32 },
    /// Nothing outstanding, or the next attempt is not due yet
    NotDue,
}

pub struct RefundProcessor {
    store: Arc<dyn BookingStore>,
    gateway: Arc<dyn PaymentGateway>,
    backoff: BackoffPolicy,
    publisher: EventPublisher,
}

impl RefundProcessor {
    pub fn new(
        store: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        backoff: BackoffPolicy,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            store,
            gateway,
            backoff,
            publisher,
        }
    }

    pub async fn issue_at(
        &self,
        booking_id: Uuid,
        now: DateTime<Utc>,
    ) -> BookingResult<RefundAttempt> {
        let booking = self
            .store
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;

        if !booking.refund_state.is_outstanding()
            || booking.next_refund_attempt_at.is_some_and(|at| at > now)
        {
            return Ok(RefundAttempt::NotDue);
        }
        let (Some(payment_ref), Some(amount)) =
            (booking.payment_reference_id.clone(), booking.refund_amount)
        else {
            return Err(BookingError::Internal(format!(
                "booking {booking_id} owes a refund without a payment reference or amount"
            )));
        };
        let reason = booking
            .refund_reason
            .clone()
            .unwrap_or_else(|| "refund".to_string());

        match self.gateway.refund(&payment_ref, amount, &reason).await {
            Ok(refund_id) => self.settle(booking, refund_id, now).await,
            Err(e) => {
                warn!(booking_id = %booking_id, error = %e, "Refund call failed");
                self.record_failure(booking, now).await
            }
        }
    }

    async fn settle(
        &self,
        booking: Booking,
        refund_id: String,
        now: DateTime<Utc>,
    ) -> BookingResult<RefundAttempt> {
        let mut next = booking.clone();
        if booking.status.can_transition_to(BookingState::Refunded) {
            next.status = BookingState::Refunded;
            next.provider_id = None;
        }
        next.refund_reference_id = Some(refund_id.clone());
        next.refund_state = RefundState::Issued;
        next.next_refund_attempt_at = None;
        next.updated_at = now;
        next.check_invariants().map_err(BookingError::Internal)?;

        let Some(committed) = self.store.compare_and_set(&booking, &next).await? else {
            return self.settled_elsewhere(booking.id).await;
        };
        self.store
            .attach_refund_reference(committed.id, &refund_id)
            .await?;

        info!(
            booking_id = %committed.id,
            refund_id = %refund_id,
            status = %committed.status,
            "Refund settled"
        );
        if committed.status != booking.status {
            let event = BookingEvent::StatusChanged {
                booking_id: committed.id,
                old_status: booking.status,
                new_status: committed.status,
                provider_id: booking.provider_id.clone(),
                actor_role: ActorRole::System,
                message: None,
                occurred_at: now,
            };
            if let Err(e) = self.publisher.publish(&event) {
                warn!(booking_id = %committed.id, error = %e, "Failed to publish refund event");
            }
        }
        Ok(RefundAttempt::Settled { refund_id })
    }

    async fn record_failure(
        &self,
        booking: Booking,
        now: DateTime<Utc>,
    ) -> BookingResult<RefundAttempt> {
        let attempts = booking.refund_attempts + 1;
        let mut next = booking.clone();
        next.refund_attempts = attempts;
        next.updated_at = now;

        let attempt_count = u32::try_from(attempts).unwrap_or(u32::MAX);
        let exhausted = self.backoff.is_exhausted(attempt_count);
        if exhausted {
            next.refund_state = RefundState::ManualReview;
            next.next_refund_attempt_at = None;
        } else {
            let delay = self.backoff.delay_for(attempt_count);
            let delay = Duration::from_std(delay).unwrap_or_else(|_| Duration::hours(1));
            next.refund_state = RefundState::PendingReconciliation;
            next.next_refund_attempt_at = Some(now + delay);
        }

        let Some(committed) = self.store.compare_and_set(&booking, &next).await? else {
            return self.settled_elsewhere(booking.id).await;
        };

        if exhausted {
            error!(
                alert = "critical",
                booking_id = %committed.id,
                attempts,
                amount = ?committed.refund_amount,
                "Refund retries exhausted; booking flagged for manual review"
            );
            Ok(RefundAttempt::Escalated { attempts })
        } else {
            let next_attempt_at = committed.next_refund_attempt_at.unwrap_or(now);
            debug!(
                booking_id = %committed.id,
                attempts,
                next_attempt_at = %next_attempt_at,
                "Refund scheduled for retry"
            );
            Ok(RefundAttempt::Retrying {
                attempts,
                next_attempt_at,
            })
        }
    }

    /// Our write lost; report what the winning writer left behind
    async fn settled_elsewhere(&self, booking_id: Uuid) -> BookingResult<RefundAttempt> {
        let current = self
            .store
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;
        match (current.refund_state, current.refund_reference_id) {
            (RefundState::Issued, Some(refund_id)) => Ok(RefundAttempt::Settled { refund_id }),
            _ => Err(BookingError::conflict(
                ConflictReason::StaleStatus,
                format!("booking {booking_id} changed during the refund attempt"),
            )),
        }
    }
}
