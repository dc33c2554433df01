//! # Web API Error Types
//!
//! Maps [`BookingError`] onto HTTP statuses. The body always carries the stable
//! reason string so clients never have to parse messages.

use crate::error::{BookingError, ConflictReason};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    #[error("Missing or invalid actor headers: {reason}")]
    Unauthenticated { reason: String },
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated {
            reason: reason.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Self::Booking(e) => match e {
                BookingError::Validation(_) | BookingError::Transition { .. } => {
                    StatusCode::BAD_REQUEST
                }
                BookingError::Conflict {
                    reason: ConflictReason::NotCancellable,
                    ..
                } => StatusCode::BAD_REQUEST,
                BookingError::Authorization { .. } => StatusCode::FORBIDDEN,
                BookingError::NotFound { .. } => StatusCode::NOT_FOUND,
                BookingError::Expiry { .. } | BookingError::Conflict { .. } => StatusCode::CONFLICT,
                BookingError::ExternalService { .. } => StatusCode::BAD_GATEWAY,
                BookingError::Persistence(_)
                | BookingError::Configuration(_)
                | BookingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Booking(e) => e.reason_code(),
            Self::BadRequest { .. } => "bad_request",
            Self::Unauthenticated { .. } => "missing_actor",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let reason = self.reason_code();

        // Server faults keep their detail in the log only
        let message = if status.is_server_error() {
            error!(error = %self, reason, "Request failed");
            "Internal server error".to_string()
        } else {
            debug!(error = %self, reason, "Request rejected");
            self.to_string()
        };

        (status, Json(json!({ "error": reason, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActorRole;
    use crate::state_machine::BookingState;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (BookingError::validation("bad"), StatusCode::BAD_REQUEST),
            (
                BookingError::Transition {
                    from: BookingState::Completed,
                    to: BookingState::Matching,
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                BookingError::conflict(ConflictReason::NotCancellable, "in progress"),
                StatusCode::BAD_REQUEST,
            ),
            (
                BookingError::Authorization {
                    actor_id: "c-2".to_string(),
                    actor_role: ActorRole::Customer,
                    reason: "not yours".to_string(),
                },
                StatusCode::FORBIDDEN,
            ),
            (
                BookingError::not_found("booking", "x"),
                StatusCode::NOT_FOUND,
            ),
            (
                BookingError::conflict(ConflictReason::AlreadyAssigned, "taken"),
                StatusCode::CONFLICT,
            ),
            (
                BookingError::ExternalService {
                    service: "payment_gateway",
                    detail: "down".to_string(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                BookingError::Internal("boom".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).status_code(), expected);
        }
    }
}
