//! # Health Check Handler

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::web::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: String,
    background_loops: bool,
}

/// Liveness: GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339(),
        background_loops: state.core.is_running(),
    })
}
