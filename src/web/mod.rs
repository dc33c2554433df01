//! # Web API
//!
//! `axum` router over [`AppState`]. Every booking route reads the caller from the
//! `x-actor-id` / `x-actor-role` headers.

pub mod errors;
pub mod extractors;
pub mod handlers;
pub mod state;

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use errors::{ApiError, ApiResult};
pub use extractors::{RequestActor, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};
pub use state::AppState;

use handlers::{health, job_requests, orders};

/// Build the application router with the tracing layer applied
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/orders", post(orders::create_order))
        .route("/orders/find-providers", post(orders::find_providers))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/status", patch(orders::update_status))
        .route("/orders/:id/cancel", post(orders::cancel_order))
        .route("/orders/:id/receipt", post(orders::generate_receipt))
        .route("/orders/:id/confirm", post(orders::confirm_completion))
        .route("/orders/:id/refund", post(orders::refund_order))
        .route("/orders/:id/clear-halt", post(orders::clear_halt))
        .route(
            "/job-requests/:id/accept",
            post(job_requests::accept_job_request),
        )
        .route(
            "/job-requests/:id/decline",
            post(job_requests::decline_job_request),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
