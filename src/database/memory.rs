//! In-process [`BookingStore`] used by tests and the `memory` backend.
//!
//! All state sits behind one `parking_lot::RwLock`. Each conditional write checks and
//! mutates inside a single write-lock critical section and never awaits while holding it,
//! which gives the same first-committer-wins semantics as the PostgreSQL store.

use super::store::{BookingStore, ClaimRequest, StoreError, StoreResult};
use crate::models::{
    Booking, CancellationOutcome, JobRequest, JobRequestStatus, ProviderCandidate, Receipt,
    RefundState,
};
use crate::state_machine::BookingState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Default)]
struct MemoryState {
    bookings: HashMap<Uuid, Booking>,
    job_requests: HashMap<Uuid, JobRequest>,
    outcomes: HashMap<(Uuid, String), CancellationOutcome>,
    candidate_queues: HashMap<Uuid, Vec<ProviderCandidate>>,
    receipts: HashMap<Uuid, Receipt>,
}

impl MemoryState {
    fn supersede_open_offers(&mut self, booking_id: Uuid, except: Option<Uuid>, now: DateTime<Utc>) {
        for offer in self.job_requests.values_mut() {
            if offer.booking_id == booking_id
                && offer.status == JobRequestStatus::Sent
                && Some(offer.id) != except
            {
                offer.status = JobRequestStatus::Superseded;
                offer.responded_at = Some(now);
            }
        }
    }

    fn has_open_offer(&self, booking_id: Uuid) -> bool {
        self.job_requests
            .values()
            .any(|o| o.booking_id == booking_id && o.status == JobRequestStatus::Sent)
    }

    /// Swap in `next` iff the stored row still matches `expected`
    fn swap(&mut self, expected: &Booking, next: &Booking) -> Option<Booking> {
        let stored = self.bookings.get_mut(&expected.id)?;
        if stored.status != expected.status || stored.version != expected.version {
            return None;
        }
        let mut committed = next.clone();
        committed.version = expected.version + 1;
        *stored = committed.clone();
        Some(committed)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBookingStore {
    state: RwLock<MemoryState>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a booking without any condition. Test fixtures only.
    pub fn force_put(&self, booking: Booking) {
        self.state.write().bookings.insert(booking.id, booking);
    }

    /// Overwrite an offer without any condition. Test fixtures only.
    pub fn force_put_job_request(&self, offer: JobRequest) {
        self.state.write().job_requests.insert(offer.id, offer);
    }

    pub fn booking_count(&self) -> usize {
        self.state.read().bookings.len()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()> {
        let mut state = self.state.write();
        if state.bookings.contains_key(&booking.id) {
            return Err(StoreError::Duplicate {
                entity: "booking",
                id: booking.id.to_string(),
            });
        }
        state.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get_booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.state.read().bookings.get(&booking_id).cloned())
    }

    async fn compare_and_set(
        &self,
        expected: &Booking,
        next: &Booking,
    ) -> StoreResult<Option<Booking>> {
        Ok(self.state.write().swap(expected, next))
    }

    async fn claim_booking(&self, claim: &ClaimRequest) -> StoreResult<Option<Booking>> {
        let mut state = self.state.write();

        let offer_ok = state.job_requests.get(&claim.job_request_id).is_some_and(|offer| {
            offer.booking_id == claim.booking_id
                && offer.provider_id == claim.provider_id
                && offer.is_live(claim.now)
        });
        if !offer_ok {
            return Ok(None);
        }

        let Some(booking) = state.bookings.get_mut(&claim.booking_id) else {
            return Ok(None);
        };
        let deadline_ok = booking
            .accept_deadline_at
            .map_or(true, |deadline| claim.now < deadline);
        if booking.status != BookingState::Matched
            || booking.provider_id.is_some()
            || booking.halted
            || !deadline_ok
        {
            return Ok(None);
        }

        booking.status = BookingState::Accepted;
        booking.provider_id = Some(claim.provider_id.clone());
        booking.accepted_at = Some(claim.now);
        booking.updated_at = claim.now;
        booking.version += 1;
        let committed = booking.clone();

        if let Some(offer) = state.job_requests.get_mut(&claim.job_request_id) {
            offer.status = JobRequestStatus::Accepted;
            offer.responded_at = Some(claim.now);
        }
        state.supersede_open_offers(claim.booking_id, Some(claim.job_request_id), claim.now);

        Ok(Some(committed))
    }

    async fn commit_with_outcome(
        &self,
        expected: &Booking,
        next: &Booking,
        outcome: &CancellationOutcome,
    ) -> StoreResult<Option<Booking>> {
        let mut state = self.state.write();
        let key = (outcome.booking_id, outcome.idempotency_key.clone());
        if state.outcomes.contains_key(&key) {
            return Ok(None);
        }
        let Some(committed) = state.swap(expected, next) else {
            return Ok(None);
        };
        state.outcomes.insert(key, outcome.clone());
        state.supersede_open_offers(expected.id, None, next.updated_at);
        Ok(Some(committed))
    }

    async fn find_outcome(
        &self,
        booking_id: Uuid,
        idempotency_key: &str,
    ) -> StoreResult<Option<CancellationOutcome>> {
        Ok(self
            .state
            .read()
            .outcomes
            .get(&(booking_id, idempotency_key.to_string()))
            .cloned())
    }

    async fn attach_refund_reference(
        &self,
        booking_id: Uuid,
        refund_id: &str,
    ) -> StoreResult<()> {
        let mut state = self.state.write();
        for ((id, _), outcome) in state.outcomes.iter_mut() {
            if *id == booking_id && outcome.refund_id.is_none() {
                outcome.refund_id = Some(refund_id.to_string());
            }
        }
        Ok(())
    }

    async fn set_halted(&self, booking_id: Uuid, halted: bool) -> StoreResult<Option<Booking>> {
        let mut state = self.state.write();
        Ok(state.bookings.get_mut(&booking_id).map(|booking| {
            booking.halted = halted;
            booking.version += 1;
            booking.updated_at = Utc::now();
            booking.clone()
        }))
    }

    async fn save_candidate_queue(
        &self,
        booking_id: Uuid,
        candidates: &[ProviderCandidate],
    ) -> StoreResult<()> {
        self.state
            .write()
            .candidate_queues
            .insert(booking_id, candidates.to_vec());
        Ok(())
    }

    async fn candidate_queue(&self, booking_id: Uuid) -> StoreResult<Vec<ProviderCandidate>> {
        Ok(self
            .state
            .read()
            .candidate_queues
            .get(&booking_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_offers(&self, booking_id: Uuid, offers: &[JobRequest]) -> StoreResult<bool> {
        let mut state = self.state.write();
        let eligible = state.bookings.get(&booking_id).is_some_and(|b| {
            b.status == BookingState::Matched && b.provider_id.is_none() && !b.halted
        });
        if !eligible || state.has_open_offer(booking_id) {
            return Ok(false);
        }
        for offer in offers {
            state.job_requests.insert(offer.id, offer.clone());
        }
        Ok(true)
    }

    async fn get_job_request(&self, job_request_id: Uuid) -> StoreResult<Option<JobRequest>> {
        Ok(self.state.read().job_requests.get(&job_request_id).cloned())
    }

    async fn job_requests_for_booking(&self, booking_id: Uuid) -> StoreResult<Vec<JobRequest>> {
        let mut offers: Vec<JobRequest> = self
            .state
            .read()
            .job_requests
            .values()
            .filter(|o| o.booking_id == booking_id)
            .cloned()
            .collect();
        offers.sort_by(|a, b| a.sent_at.cmp(&b.sent_at).then_with(|| a.id.cmp(&b.id)));
        Ok(offers)
    }

    async fn decline_job_request(
        &self,
        job_request_id: Uuid,
        provider_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<JobRequest>> {
        let mut state = self.state.write();
        Ok(state
            .job_requests
            .get_mut(&job_request_id)
            .filter(|o| o.status == JobRequestStatus::Sent && o.provider_id == provider_id)
            .map(|offer| {
                offer.status = JobRequestStatus::Declined;
                offer.responded_at = Some(now);
                offer.clone()
            }))
    }

    async fn expire_job_requests(&self, now: DateTime<Utc>) -> StoreResult<Vec<JobRequest>> {
        let mut state = self.state.write();
        let mut expired = Vec::new();
        for offer in state.job_requests.values_mut() {
            if offer.status == JobRequestStatus::Sent && offer.expires_at <= now {
                offer.status = JobRequestStatus::Expired;
                offer.responded_at = Some(now);
                expired.push(offer.clone());
            }
        }
        Ok(expired)
    }

    async fn count_accepted(&self, booking_id: Uuid) -> StoreResult<i64> {
        let count = self
            .state
            .read()
            .job_requests
            .values()
            .filter(|o| o.booking_id == booking_id && o.status == JobRequestStatus::Accepted)
            .count();
        Ok(count as i64)
    }

    async fn find_overdue_matching(&self, now: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        Ok(self
            .state
            .read()
            .bookings
            .values()
            .filter(|b| {
                b.status.is_pre_assignment()
                    && b.provider_id.is_none()
                    && (b.matching_expires_at <= now
                        || b.accept_deadline_at.is_some_and(|d| d <= now))
            })
            .cloned()
            .collect())
    }

    async fn find_awaiting_next_wave(&self, now: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let state = self.state.read();
        Ok(state
            .bookings
            .values()
            .filter(|b| {
                b.status == BookingState::Matched
                    && b.provider_id.is_none()
                    && !b.halted
                    && b.matching_expires_at > now
                    && state.job_requests.values().any(|o| o.booking_id == b.id)
                    && !state.has_open_offer(b.id)
            })
            .cloned()
            .collect())
    }

    async fn find_awaiting_completion(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        Ok(self
            .state
            .read()
            .bookings
            .values()
            .filter(|b| {
                b.status == BookingState::WorkCompleted
                    && b.work_completed_at.is_some_and(|at| at <= cutoff)
            })
            .cloned()
            .collect())
    }

    async fn find_refunds_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        Ok(self
            .state
            .read()
            .bookings
            .values()
            .filter(|b| {
                matches!(
                    b.refund_state,
                    RefundState::Pending | RefundState::PendingReconciliation
                ) && b.next_refund_attempt_at.map_or(true, |at| at <= now)
            })
            .cloned()
            .collect())
    }

    async fn insert_receipt_if_absent(&self, receipt: &Receipt) -> StoreResult<Receipt> {
        let mut state = self.state.write();
        Ok(state
            .receipts
            .entry(receipt.booking_id)
            .or_insert_with(|| receipt.clone())
            .clone())
    }

    async fn get_receipt(&self, booking_id: Uuid) -> StoreResult<Option<Receipt>> {
        Ok(self.state.read().receipts.get(&booking_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, NewBooking, ProviderCandidate, Urgency};
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;

    fn matched_booking(now: DateTime<Utc>) -> Booking {
        let mut booking = Booking::new(
            NewBooking {
                customer_id: "c-1".to_string(),
                service_id: "cleaning".to_string(),
                scheduled_at: None,
                total_amount: dec!(60),
                location: Location::new(10.0, 10.0),
                urgency: Urgency::Standard,
            },
            now,
            Duration::minutes(15),
        );
        booking.status = BookingState::Matched;
        booking.accept_deadline_at = Some(now + Duration::minutes(10));
        booking
    }

    fn candidate(id: &str) -> ProviderCandidate {
        ProviderCandidate {
            id: id.to_string(),
            distance_km: 1.0,
            rating: 4.0,
            last_accept_time: None,
            available: true,
            services: BTreeSet::from(["cleaning".to_string()]),
        }
    }

    #[tokio::test]
    async fn test_compare_and_set_rejects_stale_version() {
        let store = InMemoryBookingStore::new();
        let now = Utc::now();
        let booking = matched_booking(now);
        store.insert_booking(&booking).await.unwrap();

        let mut next = booking.clone();
        next.halted = true;
        let committed = store.compare_and_set(&booking, &next).await.unwrap().unwrap();
        assert_eq!(committed.version, 1);

        // Second writer still holds version 0
        assert!(store.compare_and_set(&booking, &next).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_supersedes_siblings() {
        let store = InMemoryBookingStore::new();
        let now = Utc::now();
        let booking = matched_booking(now);
        store.insert_booking(&booking).await.unwrap();

        let a = JobRequest::offer(&booking, &candidate("p-a"), 1, now, Duration::seconds(60));
        let b = JobRequest::offer(&booking, &candidate("p-b"), 1, now, Duration::seconds(60));
        assert!(store.insert_offers(booking.id, &[a.clone(), b.clone()]).await.unwrap());

        let claimed = store
            .claim_booking(&ClaimRequest {
                booking_id: booking.id,
                job_request_id: a.id,
                provider_id: "p-a".to_string(),
                now,
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.status, BookingState::Accepted);
        assert_eq!(claimed.provider_id.as_deref(), Some("p-a"));

        let loser = store
            .claim_booking(&ClaimRequest {
                booking_id: booking.id,
                job_request_id: b.id,
                provider_id: "p-b".to_string(),
                now,
            })
            .await
            .unwrap();
        assert!(loser.is_none());

        let sibling = store.get_job_request(b.id).await.unwrap().unwrap();
        assert_eq!(sibling.status, JobRequestStatus::Superseded);
        assert_eq!(store.count_accepted(booking.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_offers_not_inserted_while_wave_outstanding() {
        let store = InMemoryBookingStore::new();
        let now = Utc::now();
        let booking = matched_booking(now);
        store.insert_booking(&booking).await.unwrap();

        let first = JobRequest::offer(&booking, &candidate("p-a"), 1, now, Duration::seconds(60));
        let second = JobRequest::offer(&booking, &candidate("p-b"), 2, now, Duration::seconds(60));
        assert!(store.insert_offers(booking.id, &[first]).await.unwrap());
        assert!(!store.insert_offers(booking.id, &[second]).await.unwrap());
    }

    #[tokio::test]
    async fn test_expire_is_idempotent() {
        let store = InMemoryBookingStore::new();
        let now = Utc::now();
        let booking = matched_booking(now);
        store.insert_booking(&booking).await.unwrap();
        let offer = JobRequest::offer(&booking, &candidate("p-a"), 1, now, Duration::seconds(60));
        store.insert_offers(booking.id, &[offer]).await.unwrap();

        let later = now + Duration::seconds(61);
        assert_eq!(store.expire_job_requests(later).await.unwrap().len(), 1);
        assert!(store.expire_job_requests(later).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_receipt_insert_keeps_first() {
        let store = InMemoryBookingStore::new();
        let now = Utc::now();
        let receipt = Receipt {
            booking_id: Uuid::new_v4(),
            customer_id: "c".to_string(),
            provider_id: "p".to_string(),
            service_id: "s".to_string(),
            total_amount: dec!(10),
            payment_reference_id: None,
            created_at: now,
            accepted_at: now,
            completed_at: now,
            rating: None,
            issued_at: now,
        };
        let mut later = receipt.clone();
        later.issued_at = now + Duration::seconds(5);

        store.insert_receipt_if_absent(&receipt).await.unwrap();
        let stored = store.insert_receipt_if_absent(&later).await.unwrap();
        assert_eq!(stored.issued_at, receipt.issued_at);
    }
}
