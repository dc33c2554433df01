//! # Structured Logging Module
//!
//! Environment-aware structured logging for the booking core. `RUST_LOG` wins when set;
//! otherwise the level follows the detected environment.

use crate::config::LogFormat;
use crate::state_machine::BookingState;
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process
pub fn init_structured_logging(format: LogFormat) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let result = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_current_span(true),
                )
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(true).with_level(true))
                .try_init(),
        };

        // Another subscriber (e.g. a test harness) may already be installed
        if result.is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            format = ?format,
            "Structured logging initialized"
        );
    });
}

fn get_environment() -> String {
    std::env::var("BOOKING_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// One line per booking-level operation, keyed for log search on `BOOKING_OPERATION`
pub fn log_booking_operation(
    operation: &str,
    booking_id: Uuid,
    status: BookingState,
    details: Option<&str>,
) {
    tracing::info!(
        operation,
        booking_id = %booking_id,
        status = %status,
        details,
        "BOOKING_OPERATION"
    );
}

/// Failure inside a background component, with the booking it concerned if any
pub fn log_error(
    component: &str,
    operation: &str,
    error: &dyn std::fmt::Display,
    booking_id: Option<Uuid>,
) {
    let booking_id = booking_id.map(|id| id.to_string());
    tracing::error!(
        component,
        operation,
        error = %error,
        booking_id = booking_id.as_deref(),
        logged_at = %Utc::now().to_rfc3339(),
        "COMPONENT_ERROR"
    );
}
