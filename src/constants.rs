//! Shared constants: cancellation reason strings, system actor names, and status groups.

/// Stable cancellation reason strings recorded on bookings
pub mod cancellation_reasons {
    /// The matching window or accept deadline passed with nobody assigned
    pub const NO_PROVIDER_AVAILABLE: &str = "no_provider_available";
    /// Every ranked candidate was offered the booking and none accepted
    pub const NO_PROVIDER_ACCEPTED: &str = "no_provider_accepted";
    /// Cancellation requested through the generic status endpoint
    pub const STATUS_REQUEST: &str = "status_request";
}

/// Identities used when the system itself drives a transition
pub mod system_actors {
    pub const BOOKING_SERVICE: &str = "booking-service";
    pub const DISPATCHER: &str = "job-request-dispatcher";
    pub const EXPIRY_SWEEPER: &str = "expiry-sweeper";
    pub const COMPLETION_CONFIRMATION: &str = "completion-confirmation";
}

/// Names of the external collaborators, used in error reporting
pub mod services {
    pub const PAYMENT_GATEWAY: &str = "payment_gateway";
    pub const PROVIDER_DIRECTORY: &str = "provider_directory";
}

/// Grouped status strings for queries
pub mod status_groups {
    /// Statuses in which a booking is still looking for a provider
    pub const PRE_ASSIGNMENT: &[&str] = &["requested", "matching", "matched"];

    /// Statuses in which `provider_id` must be set
    pub const ASSIGNED: &[&str] = &[
        "accepted",
        "enroute",
        "arrived",
        "started",
        "in_progress",
        "work_completed",
        "completed",
    ];
}

/// Prefix for idempotency keys the system generates for its own cancellations
pub const SYSTEM_IDEMPOTENCY_PREFIX: &str = "system";

/// Build the idempotency key the system uses when it cancels a booking on its own
pub fn system_idempotency_key(booking_id: uuid::Uuid, reason: &str) -> String {
    format!("{SYSTEM_IDEMPOTENCY_PREFIX}:{reason}:{booking_id}")
}
