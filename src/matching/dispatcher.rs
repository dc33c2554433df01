//! # Job Request Dispatcher
//!
//! Fans a matched booking out to candidates in waves of `fanout` offers. A wave is only
//! written while the booking is `matched`, unassigned, and has no offer still `sent`, so
//! duplicate dispatchers (a decline racing the sweep, two sweep instances) write at most
//! one wave. When every ranked candidate has been offered, the booking is cancelled with
//! `no_provider_accepted`.

use crate::constants::{cancellation_reasons, system_actors, system_idempotency_key};
use crate::database::BookingStore;
use crate::error::{BookingError, BookingResult, ConflictReason};
use crate::events::EventPublisher;
use crate::models::{
    Actor, ActorRole, CancellationResult, CancellationTerms, JobRequest, ProviderCandidate,
};
use crate::scheduling::SchedulingValidator;
use crate::services::ProviderDirectory;
use crate::state_machine::{BookingEvent, BookingState, BookingStateMachine};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// What a dispatch attempt did
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// A new wave of offers was written
    Offered(Vec<JobRequest>),
    /// Offers from the current wave are still open
    Outstanding,
    /// Every candidate was offered; the booking was cancelled
    Exhausted(CancellationResult),
    /// The booking is no longer waiting for offers
    Inactive,
}

pub struct JobRequestDispatcher {
    store: Arc<dyn BookingStore>,
    directory: Arc<dyn ProviderDirectory>,
    state_machine: Arc<BookingStateMachine>,
    publisher: EventPublisher,
    offer_window: Duration,
    fanout: usize,
}

impl JobRequestDispatcher {
    pub fn new(
        store: Arc<dyn BookingStore>,
        directory: Arc<dyn ProviderDirectory>,
        state_machine: Arc<BookingStateMachine>,
        publisher: EventPublisher,
        offer_window: Duration,
        fanout: usize,
    ) -> Self {
        Self {
            store,
            directory,
            state_machine,
            publisher,
            offer_window,
            fanout: fanout.max(1),
        }
    }

    /// Remember the ranked list for later waves and send the first wave. Every wave of a
    /// booking uses the dispatcher's own fanout and offer window.
    #[instrument(skip(self, ranked), fields(candidates = ranked.len()))]
    pub async fn dispatch_at(
        &self,
        booking_id: Uuid,
        ranked: &[ProviderCandidate],
        now: DateTime<Utc>,
    ) -> BookingResult<Vec<JobRequest>> {
        self.store.save_candidate_queue(booking_id, ranked).await?;
        match self.send_wave(booking_id, now).await? {
            DispatchOutcome::Offered(offers) => Ok(offers),
            _ => Ok(Vec::new()),
        }
    }

    /// Send the next wave if the previous one has fully resolved
    pub async fn dispatch_next_wave(
        &self,
        booking_id: Uuid,
        now: DateTime<Utc>,
    ) -> BookingResult<DispatchOutcome> {
        self.send_wave(booking_id, now).await
    }

    /// A provider turns down its offer; the next wave goes out once none remain open
    #[instrument(skip(self, actor), fields(provider_id = %actor.id))]
    pub async fn decline_at(
        &self,
        job_request_id: Uuid,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> BookingResult<DispatchOutcome> {
        let offer = self
            .store
            .get_job_request(job_request_id)
            .await?
            .ok_or_else(|| BookingError::not_found("job_request", job_request_id))?;
        if actor.role != ActorRole::Provider || offer.provider_id != actor.id {
            return Err(BookingError::Authorization {
                actor_id: actor.id.clone(),
                actor_role: actor.role,
                reason: format!("job request {job_request_id} was not offered to this actor"),
            });
        }

        if self
            .store
            .decline_job_request(job_request_id, &actor.id, now)
            .await?
            .is_none()
        {
            return Err(BookingError::conflict(
                ConflictReason::StaleStatus,
                format!("job request {job_request_id} is already {}", offer.status),
            ));
        }
        debug!(job_request_id = %job_request_id, "Offer declined");

        let still_open = self
            .store
            .job_requests_for_booking(offer.booking_id)
            .await?
            .iter()
            .any(|o| o.status.is_open());
        if still_open {
            return Ok(DispatchOutcome::Outstanding);
        }
        self.dispatch_next_wave(offer.booking_id, now).await
    }

    async fn send_wave(
        &self,
        booking_id: Uuid,
        now: DateTime<Utc>,
    ) -> BookingResult<DispatchOutcome> {
        let fanout = self.fanout;
        let booking = self.state_machine.get(booking_id).await?;
        if booking.status != BookingState::Matched
            || booking.provider_id.is_some()
            || booking.halted
        {
            return Ok(DispatchOutcome::Inactive);
        }
        if now >= booking.matching_expires_at {
            // The sweep cancels it as no_provider_available
            debug!(booking_id = %booking_id, "Matching window closed; no further waves");
            return Ok(DispatchOutcome::Inactive);
        }

        let previous = self.store.job_requests_for_booking(booking_id).await?;
        if previous.iter().any(|o| o.status.is_open()) {
            return Ok(DispatchOutcome::Outstanding);
        }
        let already_offered: HashSet<&str> =
            previous.iter().map(|o| o.provider_id.as_str()).collect();
        let wave = previous.iter().map(|o| o.wave).max().unwrap_or(0) + 1;
        let service_time = booking.service_time(now);

        let queue = self.store.candidate_queue(booking_id).await?;
        let mut offers = Vec::with_capacity(fanout);
        for candidate in queue
            .iter()
            .filter(|c| !already_offered.contains(c.id.as_str()))
        {
            if offers.len() == fanout {
                break;
            }
            let blackouts = self.directory.blackout_windows(&candidate.id).await?;
            if !SchedulingValidator::provider_available_at(&blackouts, service_time) {
                debug!(provider_id = %candidate.id, "Skipping provider in blackout window");
                continue;
            }
            offers.push(JobRequest::offer(&booking, candidate, wave, now, self.offer_window));
        }

        if offers.is_empty() {
            return self.exhaust(booking_id, now).await;
        }

        if !self.store.insert_offers(booking_id, &offers).await? {
            debug!(
                booking_id = %booking_id,
                wave,
                "Wave not written; booking moved or another wave is out"
            );
            return Ok(DispatchOutcome::Inactive);
        }

        for offer in &offers {
            let event = BookingEvent::OfferSent {
                booking_id,
                job_request_id: offer.id,
                provider_id: offer.provider_id.clone(),
                wave: offer.wave,
                expires_at: offer.expires_at,
            };
            if let Err(e) = self.publisher.publish(&event) {
                warn!(job_request_id = %offer.id, error = %e, "Failed to publish offer event");
            }
        }
        info!(
            booking_id = %booking_id,
            wave,
            offers = offers.len(),
            "Dispatched offer wave"
        );
        Ok(DispatchOutcome::Offered(offers))
    }

    async fn exhaust(
        &self,
        booking_id: Uuid,
        now: DateTime<Utc>,
    ) -> BookingResult<DispatchOutcome> {
        let terms = CancellationTerms::new(
            cancellation_reasons::NO_PROVIDER_ACCEPTED,
            system_idempotency_key(booking_id, cancellation_reasons::NO_PROVIDER_ACCEPTED),
        );
        let actor = Actor::system(system_actors::DISPATCHER);
        match self.state_machine.cancel_at(booking_id, &actor, terms, now).await {
            Ok(result) => {
                info!(booking_id = %booking_id, "Candidates exhausted; booking cancelled");
                Ok(DispatchOutcome::Exhausted(result))
            }
            Err(e) if e.is_conflict() => {
                debug!(booking_id = %booking_id, error = %e, "Exhaustion cancel lost a race");
                Ok(DispatchOutcome::Inactive)
            }
            Err(e) => Err(e),
        }
    }
}
