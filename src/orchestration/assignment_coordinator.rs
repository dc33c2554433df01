//! # Assignment Coordinator
//!
//! Resolves the race between providers answering offers for the same booking. The claim
//! itself is one conditional write in the store (`matched`, unassigned, offer still live);
//! the first commit wins and every other caller gets `Conflict(already_assigned)`, which is
//! routine and logged at debug.
//!
//! After a win the coordinator re-checks that the booking has exactly one accepted offer.
//! Anything else is an invariant violation: the booking is halted, a critical alert is
//! logged, and an `invariant_violation` event is published. Nothing is auto-resolved.

use crate::database::BookingStore;
use crate::error::BookingResult;
use crate::events::EventPublisher;
use crate::models::{Actor, Booking};
use crate::state_machine::{BookingEvent, BookingState, BookingStateMachine};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, instrument, warn};
use uuid::Uuid;

pub struct AssignmentCoordinator {
    state_machine: Arc<BookingStateMachine>,
    store: Arc<dyn BookingStore>,
    publisher: EventPublisher,
}

impl AssignmentCoordinator {
    pub fn new(
        state_machine: Arc<BookingStateMachine>,
        store: Arc<dyn BookingStore>,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            state_machine,
            store,
            publisher,
        }
    }

    pub async fn claim(
        &self,
        booking_id: Uuid,
        job_request_id: Uuid,
        provider: &Actor,
    ) -> BookingResult<Booking> {
        self.claim_at(booking_id, job_request_id, provider, Utc::now())
            .await
    }

    #[instrument(skip(self, provider), fields(provider_id = %provider.id))]
    pub async fn claim_at(
        &self,
        booking_id: Uuid,
        job_request_id: Uuid,
        provider: &Actor,
        now: DateTime<Utc>,
    ) -> BookingResult<Booking> {
        let booking = self
            .state_machine
            .claim_at(booking_id, job_request_id, provider, now)
            .await?;
        self.verify_single_acceptance(booking_id, now).await?;
        Ok(booking)
    }

    /// Accept whichever live offer the provider holds for the booking
    pub async fn accept_live_offer_at(
        &self,
        booking_id: Uuid,
        provider: &Actor,
        now: DateTime<Utc>,
    ) -> BookingResult<Booking> {
        let booking = self
            .state_machine
            .transition_at(booking_id, BookingState::Accepted, provider, now)
            .await?;
        self.verify_single_acceptance(booking_id, now).await?;
        Ok(booking)
    }

    /// Count accepted offers for the booking; more than one halts it
    pub async fn verify_single_acceptance(
        &self,
        booking_id: Uuid,
        now: DateTime<Utc>,
    ) -> BookingResult<i64> {
        let accepted = self.store.count_accepted(booking_id).await?;
        if accepted <= 1 {
            return Ok(accepted);
        }

        let detail = format!("{accepted} job requests accepted for one booking");
        error!(
            alert = "critical",
            booking_id = %booking_id,
            accepted,
            "Invariant violation: multiple accepted job requests"
        );
        self.state_machine.halt(booking_id, &detail).await?;

        let event = BookingEvent::InvariantViolation {
            booking_id,
            detail,
            occurred_at: now,
        };
        if let Err(e) = self.publisher.publish(&event) {
            warn!(booking_id = %booking_id, error = %e, "Failed to publish invariant violation");
        }
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryBookingStore;
    use crate::error::ConflictReason;
    use crate::models::{
        JobRequest, JobRequestStatus, Location, NewBooking, ProviderCandidate, Urgency,
    };
    use crate::orchestration::CancellationPolicy;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;

    fn setup() -> (Arc<InMemoryBookingStore>, AssignmentCoordinator, EventPublisher) {
        let store = Arc::new(InMemoryBookingStore::new());
        let machine = Arc::new(BookingStateMachine::new(
            store.clone(),
            CancellationPolicy::default(),
            Duration::minutes(10),
        ));
        let publisher = EventPublisher::new(16);
        let coordinator = AssignmentCoordinator::new(machine, store.clone(), publisher.clone());
        (store, coordinator, publisher)
    }

    fn matched_with_offers(
        store: &InMemoryBookingStore,
        providers: &[&str],
        now: DateTime<Utc>,
    ) -> (Booking, Vec<JobRequest>) {
        let mut booking = Booking::new(
            NewBooking {
                customer_id: "c-1".to_string(),
                service_id: "cleaning".to_string(),
                scheduled_at: None,
                total_amount: dec!(75),
                location: Location::new(0.0, 0.0),
                urgency: Urgency::Standard,
            },
            now,
            Duration::minutes(15),
        );
        booking.status = BookingState::Matched;
        booking.accept_deadline_at = Some(now + Duration::minutes(10));
        store.force_put(booking.clone());

        let offers = providers
            .iter()
            .map(|p| {
                let candidate = ProviderCandidate {
                    id: p.to_string(),
                    distance_km: 1.0,
                    rating: 4.5,
                    last_accept_time: None,
                    available: true,
                    services: BTreeSet::from(["cleaning".to_string()]),
                };
                let offer = JobRequest::offer(&booking, &candidate, 1, now, Duration::seconds(60));
                store.force_put_job_request(offer.clone());
                offer
            })
            .collect();
        (booking, offers)
    }

    #[tokio::test]
    async fn test_claim_supersedes_siblings() {
        let (store, coordinator, _) = setup();
        let now = Utc::now();
        let (booking, offers) = matched_with_offers(&store, &["p-1", "p-2", "p-3"], now);

        let won = coordinator
            .claim_at(booking.id, offers[1].id, &Actor::provider("p-2"), now)
            .await
            .unwrap();
        assert_eq!(won.status, BookingState::Accepted);

        let stored = store.job_requests_for_booking(booking.id).await.unwrap();
        let accepted: Vec<_> = stored
            .iter()
            .filter(|o| o.status == JobRequestStatus::Accepted)
            .collect();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].provider_id, "p-2");
        assert_eq!(
            stored
                .iter()
                .filter(|o| o.status == JobRequestStatus::Superseded)
                .count(),
            2
        );

        let err = coordinator
            .claim_at(booking.id, offers[0].id, &Actor::provider("p-1"), now)
            .await
            .unwrap_err();
        assert_eq!(err.conflict_reason(), Some(ConflictReason::AlreadyAssigned));
    }

    #[tokio::test]
    async fn test_double_acceptance_halts_booking() {
        let (store, coordinator, publisher) = setup();
        let mut rx = publisher.subscribe();
        let now = Utc::now();
        let (booking, offers) = matched_with_offers(&store, &["p-1", "p-2"], now);

        // Corrupt the record the way a broken writer would
        for mut offer in offers {
            offer.status = JobRequestStatus::Accepted;
            store.force_put_job_request(offer);
        }

        let count = coordinator
            .verify_single_acceptance(booking.id, now)
            .await
            .unwrap();
        assert_eq!(count, 2);

        let stored = store.get_booking(booking.id).await.unwrap().unwrap();
        assert!(stored.halted);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "booking.invariant_violation");
    }
}
