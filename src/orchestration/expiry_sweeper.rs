//! # Expiry Sweeper
//!
//! Periodic pass over everything with a deadline. Each step is a conditional write guarded
//! by current status, so running the sweep late, twice, or from several instances at once
//! only turns the redundant writes into counted conflicts.
//!
//! 1. `sent` offers past `expires_at` become `expired`
//! 2. unassigned bookings past `matching_expires_at` or `accept_deadline_at` are cancelled
//!    with `no_provider_available`
//! 3. matched bookings with no open offer left get their next wave, including those whose
//!    offers expired outside this pass
//! 4. `work_completed` bookings past the confirmation grace period are completed

use crate::constants::{cancellation_reasons, system_actors, system_idempotency_key};
use crate::database::BookingStore;
use crate::error::{BookingError, BookingResult};
use crate::logging::log_error;
use crate::matching::{DispatchOutcome, JobRequestDispatcher};
use crate::models::{Actor, Booking, CancellationTerms};
use crate::state_machine::{BookingState, BookingStateMachine, TransitionContext};
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Counts from one sweep pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub offers_expired: usize,
    pub bookings_cancelled: usize,
    pub waves_dispatched: usize,
    pub bookings_completed: usize,
    /// Writes another actor got to first
    pub conflicts: usize,
    pub errors: usize,
}

impl SweepReport {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

enum StepResult {
    Applied,
    Conflict,
    Failed,
}

pub struct ExpirySweeper {
    store: Arc<dyn BookingStore>,
    state_machine: Arc<BookingStateMachine>,
    dispatcher: Arc<JobRequestDispatcher>,
    completion_grace: Duration,
}

impl ExpirySweeper {
    pub fn new(
        store: Arc<dyn BookingStore>,
        state_machine: Arc<BookingStateMachine>,
        dispatcher: Arc<JobRequestDispatcher>,
        completion_grace: Duration,
    ) -> Self {
        Self {
            store,
            state_machine,
            dispatcher,
            completion_grace,
        }
    }

    #[instrument(skip(self))]
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> BookingResult<SweepReport> {
        let mut report = SweepReport::default();

        let expired = self.store.expire_job_requests(now).await?;
        report.offers_expired = expired.len();

        let overdue = self.store.find_overdue_matching(now).await?;
        let cancelled_ids: BTreeSet<Uuid> = overdue.iter().map(|b| b.id).collect();
        let results = join_all(overdue.iter().map(|b| self.cancel_overdue(b, now))).await;
        for result in results {
            match result {
                StepResult::Applied => report.bookings_cancelled += 1,
                StepResult::Conflict => report.conflicts += 1,
                StepResult::Failed => report.errors += 1,
            }
        }

        let resolved = self.store.find_awaiting_next_wave(now).await?;
        let waiting: BTreeSet<Uuid> = expired
            .iter()
            .map(|offer| offer.booking_id)
            .chain(resolved.iter().map(|b| b.id))
            .filter(|id| !cancelled_ids.contains(id))
            .collect();
        for booking_id in waiting {
            match self.dispatcher.dispatch_next_wave(booking_id, now).await {
                Ok(DispatchOutcome::Offered(_)) => report.waves_dispatched += 1,
                Ok(DispatchOutcome::Exhausted(result)) if !result.replayed => {
                    report.bookings_cancelled += 1
                }
                Ok(_) => {}
                Err(e) if e.is_conflict() => report.conflicts += 1,
                Err(e) => {
                    log_error("expiry_sweeper", "dispatch_next_wave", &e, Some(booking_id));
                    report.errors += 1;
                }
            }
        }

        let cutoff = now - self.completion_grace;
        let awaiting = self.store.find_awaiting_completion(cutoff).await?;
        for booking in &awaiting {
            match self.auto_complete(booking, now).await {
                StepResult::Applied => report.bookings_completed += 1,
                StepResult::Conflict => report.conflicts += 1,
                StepResult::Failed => report.errors += 1,
            }
        }

        if report.is_idle() {
            debug!("Sweep found nothing to do");
        } else {
            info!(
                offers_expired = report.offers_expired,
                bookings_cancelled = report.bookings_cancelled,
                waves_dispatched = report.waves_dispatched,
                bookings_completed = report.bookings_completed,
                conflicts = report.conflicts,
                errors = report.errors,
                "Expiry sweep finished"
            );
        }
        Ok(report)
    }

    async fn cancel_overdue(&self, booking: &Booking, now: DateTime<Utc>) -> StepResult {
        let terms = CancellationTerms::new(
            cancellation_reasons::NO_PROVIDER_AVAILABLE,
            system_idempotency_key(booking.id, cancellation_reasons::NO_PROVIDER_AVAILABLE),
        );
        let actor = Actor::system(system_actors::EXPIRY_SWEEPER);
        let result = self
            .state_machine
            .cancel_at(booking.id, &actor, terms, now)
            .await;
        match result {
            Ok(result) if result.replayed => StepResult::Conflict,
            Ok(_) => StepResult::Applied,
            Err(e) => classify("cancel_overdue", booking.id, &e),
        }
    }

    async fn auto_complete(&self, booking: &Booking, now: DateTime<Utc>) -> StepResult {
        let actor = Actor::system(system_actors::EXPIRY_SWEEPER);
        let result = self
            .state_machine
            .apply_at(
                booking.id,
                BookingState::Completed,
                &actor,
                TransitionContext::default(),
                now,
            )
            .await;
        match result {
            Ok(_) => StepResult::Applied,
            Err(e) => classify("auto_complete", booking.id, &e),
        }
    }
}

/// Conflicts and already-moved bookings are the expected outcome of redundant sweeps
fn classify(operation: &str, booking_id: Uuid, error: &BookingError) -> StepResult {
    match error {
        BookingError::Conflict { .. } | BookingError::Transition { .. } => {
            debug!(booking_id = %booking_id, operation, error = %error, "Sweep step no-op");
            StepResult::Conflict
        }
        _ => {
            log_error("expiry_sweeper", operation, error, Some(booking_id));
            StepResult::Failed
        }
    }
}
