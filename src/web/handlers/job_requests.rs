//! # Job Request Handlers
//!
//! Provider answers to offers.

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::error::BookingError;
use crate::matching::DispatchOutcome;
use crate::models::Booking;
use crate::web::errors::ApiResult;
use crate::web::extractors::RequestActor;
use crate::web::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclineResponse {
    pub job_request_id: Uuid,
    /// `offered`, `outstanding`, `exhausted`, or `inactive`
    pub next_step: &'static str,
    pub offers_sent: usize,
}

/// Claim the booking behind an offer: POST /job-requests/:id/accept
pub async fn accept_job_request(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(job_request_id): Path<Uuid>,
) -> ApiResult<Json<Booking>> {
    let offer = state
        .core
        .store
        .get_job_request(job_request_id)
        .await
        .map_err(BookingError::from)?
        .ok_or_else(|| BookingError::not_found("job_request", job_request_id))?;
    let booking = state
        .core
        .coordinator
        .claim_at(offer.booking_id, job_request_id, &actor, Utc::now())
        .await?;
    Ok(Json(booking))
}

/// Turn down an offer: POST /job-requests/:id/decline
pub async fn decline_job_request(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(job_request_id): Path<Uuid>,
) -> ApiResult<Json<DeclineResponse>> {
    let outcome = state
        .core
        .dispatcher
        .decline_at(job_request_id, &actor, Utc::now())
        .await?;
    let (next_step, offers_sent) = match &outcome {
        DispatchOutcome::Offered(offers) => ("offered", offers.len()),
        DispatchOutcome::Outstanding => ("outstanding", 0),
        DispatchOutcome::Exhausted(_) => ("exhausted", 0),
        DispatchOutcome::Inactive => ("inactive", 0),
    };
    Ok(Json(DeclineResponse {
        job_request_id,
        next_step,
        offers_sent,
    }))
}
