//! # Booking Core Configuration
//!
//! Every section has defaults, so an empty configuration is a valid configuration. Values
//! come from an optional TOML file and `BOOKING__*` environment overrides (see
//! [`ConfigManager`]), are validated once at startup, and are then shared read-only.
//!
//! ```rust,no_run
//! use booking_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let fanout = manager.config().matching.fanout;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration for the booking core
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingConfig {
    pub database: DatabaseConfig,
    pub matching: MatchingConfig,
    pub cancellation: CancellationConfig,
    pub payment: PaymentConfig,
    pub sweep: SweepConfig,
    pub scheduling: SchedulingConfig,
    pub notifications: NotificationConfig,
    pub web: WebConfig,
    /// `json` or `pretty`
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: None,
            max_connections: 10,
        }
    }
}

/// Ranking radius, offer fan-out, and stage timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub max_distance_km: f64,
    /// Offers sent simultaneously per wave
    pub fanout: usize,
    /// Lifetime of a single job request
    pub offer_window_seconds: u64,
    /// Time from booking creation until matching gives up
    pub matching_window_seconds: u64,
    /// Time from entering `matched` until a provider must have accepted
    pub accept_window_seconds: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_distance_km: 25.0,
            fanout: 3,
            offer_window_seconds: 60,
            matching_window_seconds: 900,
            accept_window_seconds: 600,
        }
    }
}

impl MatchingConfig {
    pub fn offer_window(&self) -> chrono::Duration {
        seconds(self.offer_window_seconds)
    }

    pub fn matching_window(&self) -> chrono::Duration {
        seconds(self.matching_window_seconds)
    }

    pub fn accept_window(&self) -> chrono::Duration {
        seconds(self.accept_window_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CancellationConfig {
    /// Fee charged on late cancellation, as a percentage of the booking total
    pub late_fee_percent: u32,
    /// Accepted bookings cancelled with at least this much lead time are free
    pub free_cancellation_lead_minutes: i64,
}

impl Default for CancellationConfig {
    fn default() -> Self {
        Self {
            late_fee_percent: 20,
            free_cancellation_lead_minutes: 120,
        }
    }
}

/// Bounded retry for gateway calls made outside the state machine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_ms: 500,
            backoff_max_ms: 60_000,
        }
    }
}

impl PaymentConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub interval_seconds: u64,
    /// How long a `work_completed` booking waits for customer confirmation
    pub completion_grace_seconds: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 15,
            completion_grace_seconds: 86_400,
        }
    }
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn completion_grace(&self) -> chrono::Duration {
        seconds(self.completion_grace_seconds)
    }
}

/// When a service may be booked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceAvailabilityRule {
    pub allow_instant: bool,
    /// Minimum lead time for scheduled bookings
    pub min_lead_minutes: i64,
    pub max_advance_days: i64,
    /// Opening hour (UTC, inclusive)
    pub open_hour: u32,
    /// Closing hour (UTC, exclusive)
    pub close_hour: u32,
    pub closed_days: Vec<Weekday>,
}

impl Default for ServiceAvailabilityRule {
    fn default() -> Self {
        Self {
            allow_instant: true,
            min_lead_minutes: 30,
            max_advance_days: 60,
            open_hour: 0,
            close_hour: 24,
            closed_days: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    pub default_rule: ServiceAvailabilityRule,
    /// Per-service overrides keyed by service id
    pub services: HashMap<String, ServiceAvailabilityRule>,
}

impl SchedulingConfig {
    pub fn rule_for(&self, service_id: &str) -> &ServiceAvailabilityRule {
        self.services.get(service_id).unwrap_or(&self.default_rule)
    }
}

/// Notification message templates
///
/// `templates` is keyed by status; `service_templates` overrides them per service.
/// Templates may use the `{booking_id}`, `{provider_id}` and `{service_id}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub channel_capacity: usize,
    pub templates: HashMap<String, String>,
    pub service_templates: HashMap<String, HashMap<String, String>>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        let templates = [
            ("matched", "We are finding a provider for booking {booking_id}"),
            ("accepted", "Provider {provider_id} accepted your booking"),
            ("enroute", "Your provider is on the way"),
            ("arrived", "Your provider has arrived"),
            ("work_completed", "The job is done, please confirm booking {booking_id}"),
            ("completed", "Booking {booking_id} is complete"),
            ("cancelled", "Booking {booking_id} was cancelled"),
            ("refunded", "Your refund for booking {booking_id} was issued"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            channel_capacity: 1000,
            templates,
            service_templates: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub bind_address: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Longest window or delay accepted anywhere in the config: one year
const MAX_PERIOD_SECONDS: u64 = 365 * 24 * 60 * 60;
const MAX_PERIOD_MINUTES: i64 = 365 * 24 * 60;
const MAX_ADVANCE_DAYS: i64 = 3650;
const MAX_BACKOFF_MS: u64 = 24 * 60 * 60 * 1_000;

fn seconds(value: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX / 1_000))
}

impl BookingConfig {
    /// Reject values that would make the engine misbehave
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.database.backend == StoreBackend::Postgres && self.database.url.is_none() {
            return Err(ConfigurationError::missing_required_field(
                "database.url",
                "postgres backend",
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                0,
                "pool size must be greater than 0",
            ));
        }

        if self.matching.fanout == 0 {
            return Err(ConfigurationError::invalid_value(
                "matching.fanout",
                0,
                "at least one offer must be sent per wave",
            ));
        }

        if !(self.matching.max_distance_km.is_finite() && self.matching.max_distance_km > 0.0) {
            return Err(ConfigurationError::invalid_value(
                "matching.max_distance_km",
                self.matching.max_distance_km,
                "radius must be a positive number of kilometres",
            ));
        }

        for (field, value) in [
            ("matching.offer_window_seconds", self.matching.offer_window_seconds),
            (
                "matching.matching_window_seconds",
                self.matching.matching_window_seconds,
            ),
            (
                "matching.accept_window_seconds",
                self.matching.accept_window_seconds,
            ),
            ("sweep.interval_seconds", self.sweep.interval_seconds),
        ] {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    value,
                    "must be greater than 0",
                ));
            }
            if value > MAX_PERIOD_SECONDS {
                return Err(ConfigurationError::invalid_value(
                    field,
                    value,
                    "must not exceed one year",
                ));
            }
        }

        if self.sweep.completion_grace_seconds > MAX_PERIOD_SECONDS {
            return Err(ConfigurationError::invalid_value(
                "sweep.completion_grace_seconds",
                self.sweep.completion_grace_seconds,
                "must not exceed one year",
            ));
        }

        if self.cancellation.late_fee_percent > 100 {
            return Err(ConfigurationError::invalid_value(
                "cancellation.late_fee_percent",
                self.cancellation.late_fee_percent,
                "fee cannot exceed the booking total",
            ));
        }

        if !(0..=MAX_PERIOD_MINUTES).contains(&self.cancellation.free_cancellation_lead_minutes) {
            return Err(ConfigurationError::invalid_value(
                "cancellation.free_cancellation_lead_minutes",
                self.cancellation.free_cancellation_lead_minutes,
                "lead time must be between zero and one year",
            ));
        }

        if self.payment.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "payment.max_attempts",
                0,
                "at least one gateway attempt is required",
            ));
        }

        if self.payment.backoff_max_ms > MAX_BACKOFF_MS {
            return Err(ConfigurationError::invalid_value(
                "payment.backoff_max_ms",
                self.payment.backoff_max_ms,
                "retry delay must not exceed one day",
            ));
        }

        if self.payment.backoff_base_ms > self.payment.backoff_max_ms {
            return Err(ConfigurationError::invalid_value(
                "payment.backoff_base_ms",
                self.payment.backoff_base_ms,
                "base delay exceeds backoff_max_ms",
            ));
        }

        if self.notifications.channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "notifications.channel_capacity",
                0,
                "broadcast channel needs capacity",
            ));
        }

        let rules = std::iter::once(("default_rule".to_string(), &self.scheduling.default_rule))
            .chain(
                self.scheduling
                    .services
                    .iter()
                    .map(|(k, v)| (format!("services.{k}"), v)),
            );
        for (name, rule) in rules {
            if rule.open_hour >= rule.close_hour || rule.close_hour > 24 {
                return Err(ConfigurationError::invalid_value(
                    format!("scheduling.{name}.open_hour"),
                    format!("{}-{}", rule.open_hour, rule.close_hour),
                    "opening hours must satisfy open < close <= 24",
                ));
            }
            if !(0..=MAX_PERIOD_MINUTES).contains(&rule.min_lead_minutes) {
                return Err(ConfigurationError::invalid_value(
                    format!("scheduling.{name}.min_lead_minutes"),
                    rule.min_lead_minutes,
                    "lead time must be between zero and one year",
                ));
            }
            if !(1..=MAX_ADVANCE_DAYS).contains(&rule.max_advance_days) {
                return Err(ConfigurationError::invalid_value(
                    format!("scheduling.{name}.max_advance_days"),
                    rule.max_advance_days,
                    "advance window must be between 1 and 3650 days",
                ));
            }
        }

        Ok(())
    }
}
