use crate::config::{SchedulingConfig, ServiceAvailabilityRule};
use crate::error::{BookingError, BookingResult};
use crate::models::BlackoutWindow;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

/// Checks requested service times against per-service availability rules and
/// provider blackout windows. Read-only; holds no state beyond its rules.
#[derive(Debug, Clone, Default)]
pub struct SchedulingValidator {
    config: SchedulingConfig,
}

impl SchedulingValidator {
    pub fn new(config: SchedulingConfig) -> Self {
        Self { config }
    }

    /// Validate a booking's requested time. `None` asks for the service now.
    pub fn validate_requested_time(
        &self,
        service_id: &str,
        scheduled_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> BookingResult<()> {
        let rule = self.config.rule_for(service_id);

        let Some(at) = scheduled_at else {
            if !rule.allow_instant {
                return Err(BookingError::validation(format!(
                    "service {service_id} must be scheduled in advance"
                )));
            }
            return Self::check_open(service_id, rule, now);
        };

        let earliest = now + Duration::minutes(rule.min_lead_minutes);
        if at < earliest {
            return Err(BookingError::validation(format!(
                "scheduled time {at} is less than {} minutes from now",
                rule.min_lead_minutes
            )));
        }

        let latest = now + Duration::days(rule.max_advance_days);
        if at > latest {
            return Err(BookingError::validation(format!(
                "scheduled time {at} is more than {} days ahead",
                rule.max_advance_days
            )));
        }

        Self::check_open(service_id, rule, at)
    }

    fn check_open(
        service_id: &str,
        rule: &ServiceAvailabilityRule,
        at: DateTime<Utc>,
    ) -> BookingResult<()> {
        if rule.closed_days.contains(&at.weekday()) {
            return Err(BookingError::validation(format!(
                "service {service_id} is not offered on {}",
                at.weekday()
            )));
        }

        let hour = at.hour();
        if hour < rule.open_hour || hour >= rule.close_hour {
            return Err(BookingError::validation(format!(
                "service {service_id} is only offered between {:02}:00 and {:02}:00 UTC",
                rule.open_hour, rule.close_hour
            )));
        }

        Ok(())
    }

    /// Whether a provider is free of blackouts at `at`
    pub fn provider_available_at(windows: &[BlackoutWindow], at: DateTime<Utc>) -> bool {
        !windows.iter().any(|w| w.contains(at))
    }
}
