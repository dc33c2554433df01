use crate::models::{
    Booking, CancellationOutcome, JobRequest, ProviderCandidate, Receipt,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt {entity} record {id}: {reason}")]
    Corrupt {
        entity: &'static str,
        id: String,
        reason: String,
    },

    #[error("Duplicate {entity} {id}")]
    Duplicate { entity: &'static str, id: String },
}

impl StoreError {
    pub fn corrupt(entity: &'static str, id: impl ToString, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            entity,
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Everything the atomic claim needs to decide, in one conditional write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    pub booking_id: Uuid,
    pub job_request_id: Uuid,
    pub provider_id: String,
    pub now: DateTime<Utc>,
}

/// Persistence for bookings, offers, cancellation records, and receipts.
///
/// Every method that changes a booking is a conditional write: it succeeds only if the
/// stored row still matches what the caller read, and reports `None`/`false` otherwise.
/// Implementations must never read-then-write outside one atomic step.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()>;

    async fn get_booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>>;

    /// Replace `expected` with `next` iff the stored `(status, version)` still equals
    /// `expected`'s. The stored version becomes `expected.version + 1`.
    async fn compare_and_set(&self, expected: &Booking, next: &Booking)
        -> StoreResult<Option<Booking>>;

    /// The single-winner claim: moves a `matched`, unassigned, non-halted booking to
    /// `accepted` for the offer's provider, accepts the offer, and supersedes every `sent`
    /// sibling. The offer must still be `sent` and unexpired, and the accept deadline
    /// must not have passed. `None` means the caller lost.
    async fn claim_booking(&self, claim: &ClaimRequest) -> StoreResult<Option<Booking>>;

    /// Compare-and-set the booking, record the cancellation outcome under its idempotency
    /// key, and supersede every `sent` offer, all or nothing. `None` if the booking moved
    /// or the key was recorded concurrently.
    async fn commit_with_outcome(
        &self,
        expected: &Booking,
        next: &Booking,
        outcome: &CancellationOutcome,
    ) -> StoreResult<Option<Booking>>;

    async fn find_outcome(
        &self,
        booking_id: Uuid,
        idempotency_key: &str,
    ) -> StoreResult<Option<CancellationOutcome>>;

    /// Stamp the gateway refund id on the booking's outcome records that lack one
    async fn attach_refund_reference(&self, booking_id: Uuid, refund_id: &str)
        -> StoreResult<()>;

    /// Set or clear the halt flag, bumping the version
    async fn set_halted(&self, booking_id: Uuid, halted: bool) -> StoreResult<Option<Booking>>;

    async fn save_candidate_queue(
        &self,
        booking_id: Uuid,
        candidates: &[ProviderCandidate],
    ) -> StoreResult<()>;

    async fn candidate_queue(&self, booking_id: Uuid) -> StoreResult<Vec<ProviderCandidate>>;

    /// Insert a wave of offers iff the booking is `matched`, unassigned, not halted, and
    /// has no offer still `sent`. Returns whether the wave was written.
    async fn insert_offers(&self, booking_id: Uuid, offers: &[JobRequest]) -> StoreResult<bool>;

    async fn get_job_request(&self, job_request_id: Uuid) -> StoreResult<Option<JobRequest>>;

    async fn job_requests_for_booking(&self, booking_id: Uuid) -> StoreResult<Vec<JobRequest>>;

    /// Conditional `sent → declined` for the offer's own provider
    async fn decline_job_request(
        &self,
        job_request_id: Uuid,
        provider_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<JobRequest>>;

    /// Conditional `sent → expired` for every offer whose `expires_at <= now`
    async fn expire_job_requests(&self, now: DateTime<Utc>) -> StoreResult<Vec<JobRequest>>;

    async fn count_accepted(&self, booking_id: Uuid) -> StoreResult<i64>;

    /// Unassigned pre-assignment bookings whose matching window or accept deadline passed
    async fn find_overdue_matching(&self, now: DateTime<Utc>) -> StoreResult<Vec<Booking>>;

    /// `matched`, unassigned, non-halted bookings still inside their matching window whose
    /// offers have all resolved, however they got there
    async fn find_awaiting_next_wave(&self, now: DateTime<Utc>) -> StoreResult<Vec<Booking>>;

    /// `work_completed` bookings reported done at or before `cutoff`
    async fn find_awaiting_completion(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Booking>>;

    /// Bookings with an outstanding refund whose next attempt is due
    async fn find_refunds_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<Booking>>;

    /// Store the receipt unless one exists; returns whichever receipt is stored
    async fn insert_receipt_if_absent(&self, receipt: &Receipt) -> StoreResult<Receipt>;

    async fn get_receipt(&self, booking_id: Uuid) -> StoreResult<Option<Receipt>>;
}
