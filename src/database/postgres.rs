//! PostgreSQL-backed [`BookingStore`].
//!
//! Conditional writes are plain `UPDATE ... WHERE status = $n AND version = $m` statements;
//! zero rows affected means another writer committed first. Multi-row effects (claim,
//! cancellation, offer waves) run in one short transaction that always locks the booking
//! row before any of its job requests, so concurrent claims serialize on the booking row
//! instead of deadlocking on each other's offers.

use super::store::{BookingStore, ClaimRequest, StoreError, StoreResult};
use crate::constants::status_groups;
use crate::models::{
    Booking, CancellationOutcome, JobRequest, Location, ProviderCandidate, Receipt,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgExecutor, PgPool};
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const BOOKING_COLUMNS: &str = r#"
    id, customer_id, service_id, provider_id, status, version, created_at, updated_at,
    scheduled_at, matching_expires_at, accept_deadline_at, accepted_at, work_completed_at,
    completed_at, cancelled_at, total_amount, payment_reference_id, cancellation_reason,
    cancellation_notes, cancellation_fee, refund_amount, refund_reason, refund_reference_id,
    refund_state, refund_attempts, next_refund_attempt_at, idempotency_keys_used,
    latitude, longitude, urgency, rating, halted
"#;

const JOB_REQUEST_COLUMNS: &str = r#"
    id, booking_id, provider_id, wave, sent_at, expires_at, status, responded_at,
    distance_km, quoted_price
"#;

#[derive(Debug, FromRow)]
struct BookingRow {
    id: Uuid,
    customer_id: String,
    service_id: String,
    provider_id: Option<String>,
    status: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    scheduled_at: Option<DateTime<Utc>>,
    matching_expires_at: DateTime<Utc>,
    accept_deadline_at: Option<DateTime<Utc>>,
    accepted_at: Option<DateTime<Utc>>,
    work_completed_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    total_amount: Decimal,
    payment_reference_id: Option<String>,
    cancellation_reason: Option<String>,
    cancellation_notes: Option<String>,
    cancellation_fee: Option<Decimal>,
    refund_amount: Option<Decimal>,
    refund_reason: Option<String>,
    refund_reference_id: Option<String>,
    refund_state: String,
    refund_attempts: i32,
    next_refund_attempt_at: Option<DateTime<Utc>>,
    idempotency_keys_used: Vec<String>,
    latitude: f64,
    longitude: f64,
    urgency: String,
    rating: Option<i16>,
    halted: bool,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::corrupt("booking", row.id, reason);
        let rating = row
            .rating
            .map(u8::try_from)
            .transpose()
            .map_err(|e| corrupt(format!("rating: {e}")))?;

        Ok(Booking {
            id: row.id,
            status: row.status.parse().map_err(corrupt)?,
            refund_state: row.refund_state.parse().map_err(corrupt)?,
            urgency: row.urgency.parse().map_err(corrupt)?,
            customer_id: row.customer_id,
            service_id: row.service_id,
            provider_id: row.provider_id,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
            scheduled_at: row.scheduled_at,
            matching_expires_at: row.matching_expires_at,
            accept_deadline_at: row.accept_deadline_at,
            accepted_at: row.accepted_at,
            work_completed_at: row.work_completed_at,
            completed_at: row.completed_at,
            cancelled_at: row.cancelled_at,
            total_amount: row.total_amount,
            payment_reference_id: row.payment_reference_id,
            cancellation_reason: row.cancellation_reason,
            cancellation_notes: row.cancellation_notes,
            cancellation_fee: row.cancellation_fee,
            refund_amount: row.refund_amount,
            refund_reason: row.refund_reason,
            refund_reference_id: row.refund_reference_id,
            refund_attempts: row.refund_attempts,
            next_refund_attempt_at: row.next_refund_attempt_at,
            idempotency_keys_used: row.idempotency_keys_used.into_iter().collect::<BTreeSet<_>>(),
            location: Location::new(row.latitude, row.longitude),
            rating,
            halted: row.halted,
        })
    }
}

#[derive(Debug, FromRow)]
struct JobRequestRow {
    id: Uuid,
    booking_id: Uuid,
    provider_id: String,
    wave: i32,
    sent_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    status: String,
    responded_at: Option<DateTime<Utc>>,
    distance_km: f64,
    quoted_price: Decimal,
}

impl TryFrom<JobRequestRow> for JobRequest {
    type Error = StoreError;

    fn try_from(row: JobRequestRow) -> Result<Self, Self::Error> {
        Ok(JobRequest {
            status: row
                .status
                .parse()
                .map_err(|e: String| StoreError::corrupt("job_request", row.id, e))?,
            id: row.id,
            booking_id: row.booking_id,
            provider_id: row.provider_id,
            wave: row.wave,
            sent_at: row.sent_at,
            expires_at: row.expires_at,
            responded_at: row.responded_at,
            distance_km: row.distance_km,
            quoted_price: row.quoted_price,
        })
    }
}

#[derive(Debug, FromRow)]
struct OutcomeRow {
    outcome: Json<CancellationOutcome>,
    refund_id: Option<String>,
}

fn bookings(rows: Vec<BookingRow>) -> StoreResult<Vec<Booking>> {
    rows.into_iter().map(Booking::try_from).collect()
}

fn job_requests(rows: Vec<JobRequestRow>) -> StoreResult<Vec<JobRequest>> {
    rows.into_iter().map(JobRequest::try_from).collect()
}

/// Conditional full-row update shared by plain writes and transactional ones
async fn conditional_update<'e, E: PgExecutor<'e>>(
    executor: E,
    expected: &Booking,
    next: &Booking,
) -> StoreResult<Option<Booking>> {
    let query = format!(
        r#"
        UPDATE bookings SET
            provider_id = $3, status = $4, version = version + 1, updated_at = $5,
            scheduled_at = $6, matching_expires_at = $7, accept_deadline_at = $8,
            accepted_at = $9, work_completed_at = $10, completed_at = $11, cancelled_at = $12,
            total_amount = $13, payment_reference_id = $14, cancellation_reason = $15,
            cancellation_notes = $16, cancellation_fee = $17, refund_amount = $18,
            refund_reason = $19, refund_reference_id = $20, refund_state = $21,
            refund_attempts = $22, next_refund_attempt_at = $23, idempotency_keys_used = $24,
            rating = $25, halted = $26
        WHERE id = $1 AND version = $2 AND status = $27
        RETURNING {BOOKING_COLUMNS}
        "#
    );

    let row = sqlx::query_as::<_, BookingRow>(&query)
        .bind(expected.id)
        .bind(expected.version)
        .bind(&next.provider_id)
        .bind(next.status.to_string())
        .bind(next.updated_at)
        .bind(next.scheduled_at)
        .bind(next.matching_expires_at)
        .bind(next.accept_deadline_at)
        .bind(next.accepted_at)
        .bind(next.work_completed_at)
        .bind(next.completed_at)
        .bind(next.cancelled_at)
        .bind(next.total_amount)
        .bind(&next.payment_reference_id)
        .bind(&next.cancellation_reason)
        .bind(&next.cancellation_notes)
        .bind(next.cancellation_fee)
        .bind(next.refund_amount)
        .bind(&next.refund_reason)
        .bind(&next.refund_reference_id)
        .bind(next.refund_state.to_string())
        .bind(next.refund_attempts)
        .bind(next.next_refund_attempt_at)
        .bind(next.idempotency_keys_used.iter().cloned().collect::<Vec<_>>())
        .bind(next.rating.map(i16::from))
        .bind(next.halted)
        .bind(expected.status.to_string())
        .fetch_optional(executor)
        .await?;

    row.map(Booking::try_from).transpose()
}

async fn supersede_open_offers<'e, E: PgExecutor<'e>>(
    executor: E,
    booking_id: Uuid,
    except: Option<Uuid>,
    now: DateTime<Utc>,
) -> StoreResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE job_requests SET status = 'superseded', responded_at = $3
        WHERE booking_id = $1 AND status = 'sent' AND ($2::UUID IS NULL OR id <> $2)
        "#,
    )
    .bind(booking_id)
    .bind(except)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

#[derive(Debug, Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool and apply pending migrations
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Booking schema migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    #[instrument(skip(self, booking), fields(booking_id = %booking.id))]
    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO bookings (
                id, customer_id, service_id, provider_id, status, version, created_at,
                updated_at, scheduled_at, matching_expires_at, total_amount, refund_state,
                idempotency_keys_used, latitude, longitude, urgency, halted
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(booking.id)
        .bind(&booking.customer_id)
        .bind(&booking.service_id)
        .bind(&booking.provider_id)
        .bind(booking.status.to_string())
        .bind(booking.version)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .bind(booking.scheduled_at)
        .bind(booking.matching_expires_at)
        .bind(booking.total_amount)
        .bind(booking.refund_state.to_string())
        .bind(booking.idempotency_keys_used.iter().cloned().collect::<Vec<_>>())
        .bind(booking.location.latitude)
        .bind(booking.location.longitude)
        .bind(booking.urgency.to_string())
        .bind(booking.halted)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate {
                entity: "booking",
                id: booking.id.to_string(),
            });
        }
        Ok(())
    }

    async fn get_booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        let query = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
        let row = sqlx::query_as::<_, BookingRow>(&query)
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Booking::try_from).transpose()
    }

    #[instrument(skip(self, expected, next), fields(booking_id = %expected.id, from = %expected.status, to = %next.status))]
    async fn compare_and_set(
        &self,
        expected: &Booking,
        next: &Booking,
    ) -> StoreResult<Option<Booking>> {
        let committed = conditional_update(&self.pool, expected, next).await?;
        if committed.is_none() {
            debug!("Conditional update affected zero rows");
        }
        Ok(committed)
    }

    #[instrument(skip(self), fields(booking_id = %claim.booking_id, provider_id = %claim.provider_id))]
    async fn claim_booking(&self, claim: &ClaimRequest) -> StoreResult<Option<Booking>> {
        let mut tx = self.pool.begin().await?;

        // Booking row first: concurrent claimers queue here and re-check the predicate
        let query = format!(
            r#"
            UPDATE bookings SET
                status = 'accepted', provider_id = $2, accepted_at = $3, updated_at = $3,
                version = version + 1
            WHERE id = $1 AND status = 'matched' AND provider_id IS NULL AND NOT halted
              AND (accept_deadline_at IS NULL OR accept_deadline_at > $3)
            RETURNING {BOOKING_COLUMNS}
            "#
        );
        let Some(row) = sqlx::query_as::<_, BookingRow>(&query)
            .bind(claim.booking_id)
            .bind(&claim.provider_id)
            .bind(claim.now)
            .fetch_optional(&mut *tx)
            .await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };

        let accepted = sqlx::query(
            r#"
            UPDATE job_requests SET status = 'accepted', responded_at = $4
            WHERE id = $1 AND booking_id = $2 AND provider_id = $3
              AND status = 'sent' AND expires_at > $4
            "#,
        )
        .bind(claim.job_request_id)
        .bind(claim.booking_id)
        .bind(&claim.provider_id)
        .bind(claim.now)
        .execute(&mut *tx)
        .await?;

        if accepted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let superseded =
            supersede_open_offers(&mut *tx, claim.booking_id, Some(claim.job_request_id), claim.now)
                .await?;
        tx.commit().await?;

        debug!(superseded, "Claim committed");
        Booking::try_from(row).map(Some)
    }

    #[instrument(skip(self, expected, next, outcome), fields(booking_id = %expected.id, key = %outcome.idempotency_key))]
    async fn commit_with_outcome(
        &self,
        expected: &Booking,
        next: &Booking,
        outcome: &CancellationOutcome,
    ) -> StoreResult<Option<Booking>> {
        let mut tx = self.pool.begin().await?;

        let Some(committed) = conditional_update(&mut *tx, expected, next).await? else {
            tx.rollback().await?;
            return Ok(None);
        };

        let recorded = sqlx::query(
            r#"
            INSERT INTO cancellation_records (booking_id, idempotency_key, outcome, refund_id, recorded_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (booking_id, idempotency_key) DO NOTHING
            "#,
        )
        .bind(outcome.booking_id)
        .bind(&outcome.idempotency_key)
        .bind(Json(outcome))
        .bind(&outcome.refund_id)
        .bind(outcome.recorded_at)
        .execute(&mut *tx)
        .await?;

        if recorded.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        supersede_open_offers(&mut *tx, expected.id, None, next.updated_at).await?;
        tx.commit().await?;
        Ok(Some(committed))
    }

    async fn find_outcome(
        &self,
        booking_id: Uuid,
        idempotency_key: &str,
    ) -> StoreResult<Option<CancellationOutcome>> {
        let row = sqlx::query_as::<_, OutcomeRow>(
            r#"
            SELECT outcome, refund_id FROM cancellation_records
            WHERE booking_id = $1 AND idempotency_key = $2
            "#,
        )
        .bind(booking_id)
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let mut outcome = row.outcome.0;
            outcome.refund_id = row.refund_id;
            outcome
        }))
    }

    async fn attach_refund_reference(
        &self,
        booking_id: Uuid,
        refund_id: &str,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE cancellation_records SET refund_id = $2
            WHERE booking_id = $1 AND refund_id IS NULL
            "#,
        )
        .bind(booking_id)
        .bind(refund_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_halted(&self, booking_id: Uuid, halted: bool) -> StoreResult<Option<Booking>> {
        let query = format!(
            r#"
            UPDATE bookings SET halted = $2, version = version + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING {BOOKING_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, BookingRow>(&query)
            .bind(booking_id)
            .bind(halted)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Booking::try_from).transpose()
    }

    async fn save_candidate_queue(
        &self,
        booking_id: Uuid,
        candidates: &[ProviderCandidate],
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO candidate_queues (booking_id, candidates, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (booking_id) DO UPDATE SET candidates = EXCLUDED.candidates,
                                                   updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(booking_id)
        .bind(Json(candidates))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn candidate_queue(&self, booking_id: Uuid) -> StoreResult<Vec<ProviderCandidate>> {
        let row: Option<(Json<Vec<ProviderCandidate>>,)> =
            sqlx::query_as("SELECT candidates FROM candidate_queues WHERE booking_id = $1")
                .bind(booking_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(candidates,)| candidates.0).unwrap_or_default())
    }

    #[instrument(skip(self, offers), fields(booking_id = %booking_id, offers = offers.len()))]
    async fn insert_offers(&self, booking_id: Uuid, offers: &[JobRequest]) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let eligible: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM bookings
            WHERE id = $1 AND status = 'matched' AND provider_id IS NULL AND NOT halted
            FOR UPDATE
            "#,
        )
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (open,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM job_requests WHERE booking_id = $1 AND status = 'sent'",
        )
        .bind(booking_id)
        .fetch_one(&mut *tx)
        .await?;

        if eligible.is_none() || open > 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for offer in offers {
            sqlx::query(
                r#"
                INSERT INTO job_requests (
                    id, booking_id, provider_id, wave, sent_at, expires_at, status,
                    responded_at, distance_km, quoted_price
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(offer.id)
            .bind(offer.booking_id)
            .bind(&offer.provider_id)
            .bind(offer.wave)
            .bind(offer.sent_at)
            .bind(offer.expires_at)
            .bind(offer.status.to_string())
            .bind(offer.responded_at)
            .bind(offer.distance_km)
            .bind(offer.quoted_price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn get_job_request(&self, job_request_id: Uuid) -> StoreResult<Option<JobRequest>> {
        let query = format!("SELECT {JOB_REQUEST_COLUMNS} FROM job_requests WHERE id = $1");
        let row = sqlx::query_as::<_, JobRequestRow>(&query)
            .bind(job_request_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(JobRequest::try_from).transpose()
    }

    async fn job_requests_for_booking(&self, booking_id: Uuid) -> StoreResult<Vec<JobRequest>> {
        let query = format!(
            "SELECT {JOB_REQUEST_COLUMNS} FROM job_requests WHERE booking_id = $1 ORDER BY sent_at, id"
        );
        let rows = sqlx::query_as::<_, JobRequestRow>(&query)
            .bind(booking_id)
            .fetch_all(&self.pool)
            .await?;
        job_requests(rows)
    }

    async fn decline_job_request(
        &self,
        job_request_id: Uuid,
        provider_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<JobRequest>> {
        let query = format!(
            r#"
            UPDATE job_requests SET status = 'declined', responded_at = $3
            WHERE id = $1 AND provider_id = $2 AND status = 'sent'
            RETURNING {JOB_REQUEST_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, JobRequestRow>(&query)
            .bind(job_request_id)
            .bind(provider_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        row.map(JobRequest::try_from).transpose()
    }

    async fn expire_job_requests(&self, now: DateTime<Utc>) -> StoreResult<Vec<JobRequest>> {
        let query = format!(
            r#"
            UPDATE job_requests SET status = 'expired', responded_at = $1
            WHERE status = 'sent' AND expires_at <= $1
            RETURNING {JOB_REQUEST_COLUMNS}
            "#
        );
        let rows = sqlx::query_as::<_, JobRequestRow>(&query)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        job_requests(rows)
    }

    async fn count_accepted(&self, booking_id: Uuid) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM job_requests WHERE booking_id = $1 AND status = 'accepted'",
        )
        .bind(booking_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn find_overdue_matching(&self, now: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let query = format!(
            r#"
            SELECT {BOOKING_COLUMNS} FROM bookings
            WHERE status = ANY($2) AND provider_id IS NULL
              AND (matching_expires_at <= $1 OR accept_deadline_at <= $1)
            "#
        );
        let rows = sqlx::query_as::<_, BookingRow>(&query)
            .bind(now)
            .bind(status_groups::PRE_ASSIGNMENT)
            .fetch_all(&self.pool)
            .await?;
        bookings(rows)
    }

    async fn find_awaiting_next_wave(&self, now: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let query = format!(
            r#"
            SELECT {BOOKING_COLUMNS} FROM bookings b
            WHERE b.status = 'matched' AND b.provider_id IS NULL AND NOT b.halted
              AND b.matching_expires_at > $1
              AND EXISTS (SELECT 1 FROM job_requests j WHERE j.booking_id = b.id)
              AND NOT EXISTS (
                  SELECT 1 FROM job_requests j WHERE j.booking_id = b.id AND j.status = 'sent'
              )
            "#
        );
        let rows = sqlx::query_as::<_, BookingRow>(&query)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        bookings(rows)
    }

    async fn find_awaiting_completion(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let query = format!(
            r#"
            SELECT {BOOKING_COLUMNS} FROM bookings
            WHERE status = 'work_completed' AND work_completed_at <= $1
            "#
        );
        let rows = sqlx::query_as::<_, BookingRow>(&query)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
        bookings(rows)
    }

    async fn find_refunds_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let query = format!(
            r#"
            SELECT {BOOKING_COLUMNS} FROM bookings
            WHERE refund_state IN ('pending', 'pending_reconciliation')
              AND (next_refund_attempt_at IS NULL OR next_refund_attempt_at <= $1)
            "#
        );
        let rows = sqlx::query_as::<_, BookingRow>(&query)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        bookings(rows)
    }

    async fn insert_receipt_if_absent(&self, receipt: &Receipt) -> StoreResult<Receipt> {
        sqlx::query(
            r#"
            INSERT INTO receipts (booking_id, receipt, issued_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (booking_id) DO NOTHING
            "#,
        )
        .bind(receipt.booking_id)
        .bind(Json(receipt))
        .bind(receipt.issued_at)
        .execute(&self.pool)
        .await?;

        self.get_receipt(receipt.booking_id)
            .await?
            .ok_or_else(|| StoreError::corrupt("receipt", receipt.booking_id, "vanished after insert"))
    }

    async fn get_receipt(&self, booking_id: Uuid) -> StoreResult<Option<Receipt>> {
        let row: Option<(Json<Receipt>,)> =
            sqlx::query_as("SELECT receipt FROM receipts WHERE booking_id = $1")
                .bind(booking_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(receipt,)| receipt.0))
    }
}
