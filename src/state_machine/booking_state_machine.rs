//! # Booking State Machine
//!
//! The authoritative transition engine. Every status change for a booking goes through
//! here: guards first, then one conditional write against the `(status, version)` that was
//! read, then post-commit actions. A write that finds the row already moved fails with
//! `Conflict(stale_status)` instead of overwriting.
//!
//! Three entry points commit writes:
//!
//! - [`BookingStateMachine::apply_at`] - plain forward moves and `payment_failed`
//! - [`BookingStateMachine::cancel_at`] - cancellation with its money decision and
//!   idempotency record, committed together
//! - [`BookingStateMachine::claim_at`] - the single-winner `matched → accepted` claim

use super::actions::{CommittedTransition, StateAction};
use super::guards::TransitionGuard;
use super::states::BookingState;
use crate::constants::{cancellation_reasons, system_idempotency_key};
use crate::database::{BookingStore, ClaimRequest};
use crate::error::{BookingError, BookingResult, ConflictReason};
use crate::logging::log_booking_operation;
use crate::models::{
    Actor, ActorRole, Booking, CancellationOutcome, CancellationResult, CancellationTerms,
    RefundState,
};
use crate::orchestration::CancellationPolicy;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Extra data some transitions stamp onto the booking
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionContext {
    /// Gateway capture reference, recorded on `created → requested`
    pub payment_reference_id: Option<String>,
    /// Customer rating, recorded on `work_completed → completed`
    pub rating: Option<u8>,
}

impl TransitionContext {
    pub fn with_payment_reference(reference: impl Into<String>) -> Self {
        Self {
            payment_reference_id: Some(reference.into()),
            ..Self::default()
        }
    }

    pub fn with_rating(rating: Option<u8>) -> Self {
        Self {
            rating,
            ..Self::default()
        }
    }
}

pub struct BookingStateMachine {
    store: Arc<dyn BookingStore>,
    policy: CancellationPolicy,
    accept_window: Duration,
    actions: Vec<Arc<dyn StateAction>>,
}

impl BookingStateMachine {
    pub fn new(
        store: Arc<dyn BookingStore>,
        policy: CancellationPolicy,
        accept_window: Duration,
    ) -> Self {
        Self {
            store,
            policy,
            accept_window,
            actions: Vec::new(),
        }
    }

    /// Register a post-commit action; actions run in registration order
    pub fn with_action(mut self, action: Arc<dyn StateAction>) -> Self {
        self.actions.push(action);
        self
    }

    pub fn store(&self) -> &Arc<dyn BookingStore> {
        &self.store
    }

    pub fn policy(&self) -> &CancellationPolicy {
        &self.policy
    }

    pub async fn get(&self, booking_id: Uuid) -> BookingResult<Booking> {
        self.store
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))
    }

    pub async fn transition(
        &self,
        booking_id: Uuid,
        to: BookingState,
        actor: &Actor,
    ) -> BookingResult<Booking> {
        self.transition_at(booking_id, to, actor, Utc::now()).await
    }

    /// Generic status request. Cancellation and acceptance are routed to their dedicated
    /// operations so that money and the claim are always handled the same way.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id, actor_role = %actor.role))]
    pub async fn transition_at(
        &self,
        booking_id: Uuid,
        to: BookingState,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> BookingResult<Booking> {
        match to {
            BookingState::Cancelled => {
                let current = self.get(booking_id).await?;
                if current.is_terminal() {
                    return Err(BookingError::Transition {
                        from: current.status,
                        to,
                    });
                }
                let terms = CancellationTerms::new(
                    cancellation_reasons::STATUS_REQUEST,
                    system_idempotency_key(booking_id, cancellation_reasons::STATUS_REQUEST),
                );
                self.cancel_at(booking_id, actor, terms, now).await?;
                self.get(booking_id).await
            }
            BookingState::Accepted => {
                let booking = self.get(booking_id).await?;
                if booking.provider_id.is_some() {
                    return Err(already_assigned(booking_id));
                }
                TransitionGuard::check(&booking, to, actor, now)?;

                let offer = self
                    .store
                    .job_requests_for_booking(booking_id)
                    .await?
                    .into_iter()
                    .find(|offer| offer.provider_id == actor.id && offer.is_live(now))
                    .ok_or_else(|| {
                        BookingError::validation(format!(
                            "{actor} holds no live offer for booking {booking_id}"
                        ))
                    })?;
                self.claim_at(booking_id, offer.id, actor, now).await
            }
            _ => {
                self.apply_at(booking_id, to, actor, TransitionContext::default(), now)
                    .await
            }
        }
    }

    /// Guarded forward move (or `payment_failed`) committed with one conditional write
    pub async fn apply_at(
        &self,
        booking_id: Uuid,
        to: BookingState,
        actor: &Actor,
        context: TransitionContext,
        now: DateTime<Utc>,
    ) -> BookingResult<Booking> {
        if matches!(to, BookingState::Cancelled | BookingState::Accepted) {
            return Err(BookingError::validation(format!(
                "{to} is entered through its dedicated operation"
            )));
        }

        let current = self.get(booking_id).await?;
        TransitionGuard::check(&current, to, actor, now)?;
        let next = self.prepare(&current, to, context, now)?;

        let Some(committed) = self.store.compare_and_set(&current, &next).await? else {
            return Err(self.stale(booking_id, current.status).await);
        };

        info!(
            booking_id = %booking_id,
            from = %current.status,
            to = %committed.status,
            actor_role = %actor.role,
            version = committed.version,
            "Booking transitioned"
        );
        self.after_commit(current, committed.clone(), actor, now).await;
        Ok(committed)
    }

    /// Cancel the booking, deciding fee and refund once. Repeating a key returns the
    /// recorded outcome without recomputing anything.
    #[instrument(skip(self, actor, terms), fields(actor_role = %actor.role, reason = %terms.reason))]
    pub async fn cancel_at(
        &self,
        booking_id: Uuid,
        actor: &Actor,
        terms: CancellationTerms,
        now: DateTime<Utc>,
    ) -> BookingResult<CancellationResult> {
        if terms.idempotency_key.trim().is_empty() {
            return Err(BookingError::validation("idempotency key must not be empty"));
        }
        if terms.reason.trim().is_empty() {
            return Err(BookingError::validation("cancellation reason must not be empty"));
        }

        let current = self.get(booking_id).await?;
        if let Some(outcome) = self
            .store
            .find_outcome(booking_id, &terms.idempotency_key)
            .await?
        {
            authorize_replay(&current, actor)?;
            debug!(booking_id = %booking_id, "Replaying recorded cancellation outcome");
            return Ok(CancellationResult {
                outcome,
                replayed: true,
            });
        }

        if !current.status.is_cancellable() {
            return Err(BookingError::conflict(
                ConflictReason::NotCancellable,
                format!("booking {booking_id} is {} and cannot be cancelled", current.status),
            ));
        }
        TransitionGuard::check(&current, BookingState::Cancelled, actor, now)?;

        // Nothing was captured, so nothing is owed back and no fee is charged
        let (cancellation_fee, refund_amount) = if current.payment_reference_id.is_some() {
            let assessment = self.policy.assess(&current, now);
            (assessment.cancellation_fee, assessment.refund_amount)
        } else {
            (Decimal::ZERO, Decimal::ZERO)
        };
        let owes_refund = refund_amount > Decimal::ZERO;

        let mut next = current.clone();
        next.status = BookingState::Cancelled;
        next.provider_id = None;
        next.updated_at = now;
        next.cancelled_at = Some(now);
        next.cancellation_reason = Some(terms.reason.clone());
        next.cancellation_notes = terms.notes.clone();
        next.cancellation_fee = Some(cancellation_fee);
        next.refund_amount = Some(refund_amount);
        next.refund_reason = Some(terms.reason.clone());
        next.idempotency_keys_used.insert(terms.idempotency_key.clone());
        if owes_refund {
            next.refund_state = RefundState::Pending;
            next.next_refund_attempt_at = Some(now);
        } else {
            next.refund_state = RefundState::NotRequired;
        }
        next.check_invariants().map_err(BookingError::Internal)?;

        let outcome = CancellationOutcome {
            booking_id,
            idempotency_key: terms.idempotency_key.clone(),
            refund_amount,
            cancellation_fee,
            new_status: BookingState::Cancelled,
            refund_id: None,
            recorded_at: now,
        };

        let result = self
            .commit_outcome(current, next, outcome, actor, now)
            .await?;
        log_booking_operation(
            "cancel",
            booking_id,
            result.outcome.new_status,
            Some(&format!(
                "reason={} fee={} refund={} replayed={}",
                terms.reason,
                result.outcome.cancellation_fee,
                result.outcome.refund_amount,
                result.replayed
            )),
        );
        Ok(result)
    }

    /// Commit a money decision together with its idempotency record, then run actions.
    /// The returned outcome is re-read so that a refund issued by the actions is included.
    pub(crate) async fn commit_outcome(
        &self,
        current: Booking,
        next: Booking,
        outcome: CancellationOutcome,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> BookingResult<CancellationResult> {
        let booking_id = current.id;
        let key = outcome.idempotency_key.clone();

        match self
            .store
            .commit_with_outcome(&current, &next, &outcome)
            .await?
        {
            Some(committed) => {
                info!(
                    booking_id = %booking_id,
                    from = %current.status,
                    to = %committed.status,
                    actor_role = %actor.role,
                    refund_state = %committed.refund_state,
                    "Booking money decision committed"
                );
                self.after_commit(current, committed, actor, now).await;
                let outcome = self
                    .store
                    .find_outcome(booking_id, &key)
                    .await?
                    .unwrap_or(outcome);
                Ok(CancellationResult {
                    outcome,
                    replayed: false,
                })
            }
            None => {
                // A concurrent call with the same key may have won the write
                if let Some(outcome) = self.store.find_outcome(booking_id, &key).await? {
                    return Ok(CancellationResult {
                        outcome,
                        replayed: true,
                    });
                }
                Err(self.stale(booking_id, current.status).await)
            }
        }
    }

    /// The single-winner claim of a matched booking by the holder of one of its offers
    #[instrument(skip(self, actor), fields(provider_id = %actor.id))]
    pub async fn claim_at(
        &self,
        booking_id: Uuid,
        job_request_id: Uuid,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> BookingResult<Booking> {
        let booking = self.get(booking_id).await?;
        let offer = self
            .store
            .get_job_request(job_request_id)
            .await?
            .ok_or_else(|| BookingError::not_found("job_request", job_request_id))?;

        if offer.booking_id != booking_id {
            return Err(BookingError::validation(format!(
                "job request {job_request_id} does not belong to booking {booking_id}"
            )));
        }
        if actor.role != ActorRole::Provider || offer.provider_id != actor.id {
            return Err(BookingError::Authorization {
                actor_id: actor.id.clone(),
                actor_role: actor.role,
                reason: format!("job request {job_request_id} was not offered to this actor"),
            });
        }

        if booking.provider_id.is_some() {
            debug!(booking_id = %booking_id, "Claim lost: booking already assigned");
            return Err(already_assigned(booking_id));
        }
        if booking.is_terminal() {
            return Err(BookingError::conflict(
                ConflictReason::StaleStatus,
                format!("booking {booking_id} is already {}", booking.status),
            ));
        }
        TransitionGuard::check(&booking, BookingState::Accepted, actor, now)?;
        if offer.status.is_open() && now >= offer.expires_at {
            return Err(BookingError::Expiry {
                deadline: "job_request.expires_at",
                expired_at: offer.expires_at,
            });
        }
        if !offer.status.is_open() {
            return Err(BookingError::conflict(
                ConflictReason::StaleStatus,
                format!("job request {job_request_id} is already {}", offer.status),
            ));
        }

        let claim = ClaimRequest {
            booking_id,
            job_request_id,
            provider_id: actor.id.clone(),
            now,
        };
        let Some(committed) = self.store.claim_booking(&claim).await? else {
            return Err(self.diagnose_lost_claim(booking_id, job_request_id, now).await);
        };

        info!(
            booking_id = %booking_id,
            job_request_id = %job_request_id,
            provider_id = %actor.id,
            version = committed.version,
            "Booking claimed"
        );
        self.after_commit(booking, committed.clone(), actor, now).await;
        Ok(committed)
    }

    /// Stop automated transitions on a booking until an admin clears it
    pub async fn halt(&self, booking_id: Uuid, detail: &str) -> BookingResult<Booking> {
        let halted = self
            .store
            .set_halted(booking_id, true)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;
        warn!(booking_id = %booking_id, detail = %detail, "Booking halted");
        Ok(halted)
    }

    pub async fn clear_halt(&self, booking_id: Uuid, actor: &Actor) -> BookingResult<Booking> {
        if actor.role != ActorRole::Admin {
            return Err(BookingError::Authorization {
                actor_id: actor.id.clone(),
                actor_role: actor.role,
                reason: "only admins may clear a halt".to_string(),
            });
        }
        let cleared = self
            .store
            .set_halted(booking_id, false)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;
        info!(booking_id = %booking_id, admin = %actor.id, "Booking halt cleared");
        Ok(cleared)
    }

    /// Build the record `to` should commit, stamping the fields that state owns
    fn prepare(
        &self,
        current: &Booking,
        to: BookingState,
        context: TransitionContext,
        now: DateTime<Utc>,
    ) -> BookingResult<Booking> {
        let mut next = current.clone();
        next.status = to;
        next.updated_at = now;

        match to {
            BookingState::Requested => {
                if context.payment_reference_id.is_some() {
                    next.payment_reference_id = context.payment_reference_id;
                }
            }
            BookingState::Matched => next.accept_deadline_at = Some(now + self.accept_window),
            BookingState::WorkCompleted => next.work_completed_at = Some(now),
            BookingState::Completed => {
                next.completed_at = Some(now);
                if context.rating.is_some() {
                    next.rating = context.rating;
                }
            }
            _ => {}
        }

        if !to.requires_provider() {
            next.provider_id = None;
        }
        next.check_invariants().map_err(BookingError::Internal)?;
        Ok(next)
    }

    /// Explain a lost conditional write from what is stored now
    async fn stale(&self, booking_id: Uuid, expected: BookingState) -> BookingError {
        match self.store.get_booking(booking_id).await {
            Ok(Some(current)) => BookingError::conflict(
                ConflictReason::StaleStatus,
                format!(
                    "booking {booking_id} moved from {expected} to {} (version {})",
                    current.status, current.version
                ),
            ),
            Ok(None) => BookingError::not_found("booking", booking_id),
            Err(e) => e.into(),
        }
    }

    async fn diagnose_lost_claim(
        &self,
        booking_id: Uuid,
        job_request_id: Uuid,
        now: DateTime<Utc>,
    ) -> BookingError {
        let booking = match self.store.get_booking(booking_id).await {
            Ok(Some(booking)) => booking,
            Ok(None) => return BookingError::not_found("booking", booking_id),
            Err(e) => return e.into(),
        };

        if booking.provider_id.is_some() {
            debug!(booking_id = %booking_id, "Claim lost: another provider won");
            return already_assigned(booking_id);
        }
        if booking.halted {
            return BookingError::conflict(
                ConflictReason::InvariantHalt,
                format!("booking {booking_id} is halted pending manual correction"),
            );
        }
        if let Some(deadline) = booking.accept_deadline_at.filter(|d| now >= *d) {
            return BookingError::Expiry {
                deadline: "accept_deadline_at",
                expired_at: deadline,
            };
        }
        if let Ok(Some(offer)) = self.store.get_job_request(job_request_id).await {
            if offer.status.is_open() && now >= offer.expires_at {
                return BookingError::Expiry {
                    deadline: "job_request.expires_at",
                    expired_at: offer.expires_at,
                };
            }
        }
        BookingError::conflict(
            ConflictReason::StaleStatus,
            format!("booking {booking_id} is {} and no longer claimable", booking.status),
        )
    }

    async fn after_commit(
        &self,
        before: Booking,
        after: Booking,
        actor: &Actor,
        now: DateTime<Utc>,
    ) {
        if self.actions.is_empty() {
            return;
        }
        let transition = CommittedTransition {
            before,
            after,
            actor: actor.clone(),
            now,
        };
        for action in &self.actions {
            if let Err(e) = action.execute(&transition).await {
                warn!(
                    booking_id = %transition.after.id,
                    action = action.description(),
                    error = %e,
                    "Post-transition action failed"
                );
            }
        }
    }
}

/// Only the parties who could have made the original request see its recorded outcome
fn authorize_replay(booking: &Booking, actor: &Actor) -> BookingResult<()> {
    let allowed = match actor.role {
        ActorRole::Admin | ActorRole::System => true,
        ActorRole::Customer => actor.id == booking.customer_id,
        ActorRole::Provider => false,
    };
    if allowed {
        return Ok(());
    }
    Err(BookingError::Authorization {
        actor_id: actor.id.clone(),
        actor_role: actor.role,
        reason: "not a party to this cancellation".to_string(),
    })
}

fn already_assigned(booking_id: Uuid) -> BookingError {
    BookingError::conflict(
        ConflictReason::AlreadyAssigned,
        format!("booking {booking_id} is already assigned"),
    )
}
