//! # Booking Server
//!
//! Loads configuration (`config/booking.toml`, `config/booking.<env>.toml`, then
//! `BOOKING_*` overrides), starts the sweep and reconciliation loops, and serves the API.

use anyhow::Context;
use booking_core::config::ConfigManager;
use booking_core::logging::init_structured_logging;
use booking_core::orchestration::BookingCore;
use booking_core::web::{create_app, AppState};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_manager = ConfigManager::load().context("failed to load configuration")?;
    init_structured_logging(config_manager.config().log_format);

    let core = Arc::new(
        BookingCore::from_config(config_manager.clone())
            .await
            .context("failed to initialize booking core")?,
    );
    core.start_background_loops();

    let bind_address = core.config.web.bind_address.clone();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!(
        bind_address = %bind_address,
        environment = config_manager.environment(),
        "🚀 Booking server listening"
    );

    let app = create_app(AppState::new(core.clone()));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    core.shutdown();
    info!("Booking server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
