//! # Order Handlers
//!
//! Booking creation, status changes, cancellation, receipts, and provider search.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::models::{
    Booking, CancellationResult, CancellationTerms, Location, NewBooking, ProviderCandidate,
    Receipt, Urgency,
};
use crate::state_machine::BookingState;
use crate::web::errors::{ApiError, ApiResult};
use crate::web::extractors::RequestActor;
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer_id: String,
    pub service_id: String,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    pub total_amount: Decimal,
    pub location: Location,
    #[serde(default)]
    pub urgency: Urgency,
}

impl From<CreateOrderRequest> for NewBooking {
    fn from(request: CreateOrderRequest) -> Self {
        Self {
            customer_id: request.customer_id,
            service_id: request.service_id,
            scheduled_at: request.scheduled_at,
            total_amount: request.total_amount,
            location: request.location,
            urgency: request.urgency,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeRequest {
    pub new_status: BookingState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindProvidersRequest {
    pub service_id: String,
    pub location: Location,
    #[serde(default)]
    pub max_distance_km: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub idempotency_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub refund_amount: Decimal,
    /// Null until the gateway refund settles. A first refund attempt that fails leaves it
    /// null; repeating the request with the same key after reconciliation returns the id.
    pub refund_id: Option<String>,
    pub cancellation_fee: Decimal,
    pub new_status: BookingState,
    pub replayed: bool,
}

impl From<CancellationResult> for CancelResponse {
    fn from(result: CancellationResult) -> Self {
        Self {
            refund_amount: result.outcome.refund_amount,
            refund_id: result.outcome.refund_id,
            cancellation_fee: result.outcome.cancellation_fee,
            new_status: result.outcome.new_status,
            replayed: result.replayed,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmRequest {
    #[serde(default)]
    pub rating: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRefundRequest {
    pub amount: Decimal,
    pub reason: String,
    pub idempotency_key: String,
}

/// Create a booking: POST /orders
pub async fn create_order(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Json(request): Json<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<Booking>)> {
    info!(
        customer_id = %request.customer_id,
        service_id = %request.service_id,
        "Creating booking via web API"
    );
    let booking = state
        .core
        .bookings
        .create_booking(request.into(), &actor)
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// Fetch a booking: GET /orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    RequestActor(_actor): RequestActor,
    Path(booking_id): Path<Uuid>,
) -> ApiResult<Json<Booking>> {
    Ok(Json(state.core.state_machine.get(booking_id).await?))
}

/// Request a status change: PATCH /orders/:id/status
///
/// `accepted` goes through the assignment coordinator so the single-acceptance check runs.
pub async fn update_status(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(booking_id): Path<Uuid>,
    Json(request): Json<StatusChangeRequest>,
) -> ApiResult<Json<Booking>> {
    let now = Utc::now();
    let booking = match request.new_status {
        BookingState::Accepted => {
            state
                .core
                .coordinator
                .accept_live_offer_at(booking_id, &actor, now)
                .await?
        }
        to => {
            state
                .core
                .state_machine
                .transition_at(booking_id, to, &actor, now)
                .await?
        }
    };
    Ok(Json(booking))
}

/// Ranked candidates for a service and location: POST /orders/find-providers
pub async fn find_providers(
    State(state): State<AppState>,
    Json(request): Json<FindProvidersRequest>,
) -> ApiResult<Json<Vec<ProviderCandidate>>> {
    if request.service_id.trim().is_empty() {
        return Err(ApiError::bad_request("serviceId must not be empty"));
    }
    let candidates = state
        .core
        .bookings
        .find_providers(&request.service_id, request.location, request.max_distance_km)
        .await?;
    Ok(Json(candidates))
}

/// Cancel a booking: POST /orders/:id/cancel
pub async fn cancel_order(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(booking_id): Path<Uuid>,
    Json(request): Json<CancelRequest>,
) -> ApiResult<Json<CancelResponse>> {
    let mut terms = CancellationTerms::new(request.reason, request.idempotency_key);
    if let Some(notes) = request.notes {
        terms = terms.with_notes(notes);
    }
    let result = state
        .core
        .cancellations
        .cancel(booking_id, &actor, terms)
        .await?;
    Ok(Json(result.into()))
}

/// Fetch or create the receipt: POST /orders/:id/receipt
pub async fn generate_receipt(
    State(state): State<AppState>,
    RequestActor(_actor): RequestActor,
    Path(booking_id): Path<Uuid>,
) -> ApiResult<Json<Receipt>> {
    Ok(Json(state.core.receipts.generate(booking_id).await?))
}

/// Customer confirms the provider's completion: POST /orders/:id/confirm
pub async fn confirm_completion(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(booking_id): Path<Uuid>,
    request: Option<Json<ConfirmRequest>>,
) -> ApiResult<Json<Booking>> {
    let rating = request.and_then(|Json(body)| body.rating);
    let booking = state
        .core
        .bookings
        .confirm_completion_at(booking_id, &actor, rating, Utc::now())
        .await?;
    Ok(Json(booking))
}

/// Admin refund of a completed booking: POST /orders/:id/refund
pub async fn refund_order(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(booking_id): Path<Uuid>,
    Json(request): Json<AdminRefundRequest>,
) -> ApiResult<Json<CancelResponse>> {
    let result = state
        .core
        .cancellations
        .refund_completed_at(
            booking_id,
            &actor,
            request.amount,
            &request.reason,
            &request.idempotency_key,
            Utc::now(),
        )
        .await?;
    Ok(Json(result.into()))
}

/// Admin lifts an invariant halt: POST /orders/:id/clear-halt
pub async fn clear_halt(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(booking_id): Path<Uuid>,
) -> ApiResult<Json<Booking>> {
    Ok(Json(
        state
            .core
            .state_machine
            .clear_halt(booking_id, &actor)
            .await?,
    ))
}
