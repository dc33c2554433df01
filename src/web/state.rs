//! # Web API Application State

use crate::orchestration::BookingCore;
use std::sync::Arc;

/// Shared by every handler; cloning only bumps the reference count
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<BookingCore>,
}

impl AppState {
    pub fn new(core: Arc<BookingCore>) -> Self {
        Self { core }
    }
}
