use crate::config::{ConfigurationError, NotificationConfig};
use crate::models::Booking;
use crate::state_machine::BookingState;
use std::collections::HashMap;

/// Notification text per status, optionally overridden per service.
///
/// Built once from configuration at startup and shared behind an `Arc`; never mutated.
#[derive(Debug, Clone, Default)]
pub struct NotificationTemplates {
    by_status: HashMap<BookingState, String>,
    by_service: HashMap<(String, BookingState), String>,
}

impl NotificationTemplates {
    pub fn from_config(config: &NotificationConfig) -> Result<Self, ConfigurationError> {
        let by_status = config
            .templates
            .iter()
            .map(|(status, template)| Ok((parse_status("templates", status)?, template.clone())))
            .collect::<Result<HashMap<_, _>, ConfigurationError>>()?;

        let mut by_service = HashMap::new();
        for (service_id, templates) in &config.service_templates {
            for (status, template) in templates {
                let field = format!("service_templates.{service_id}");
                by_service.insert(
                    (service_id.clone(), parse_status(&field, status)?),
                    template.clone(),
                );
            }
        }

        Ok(Self {
            by_status,
            by_service,
        })
    }

    /// Render the message for the booking's current status, if one is configured
    pub fn render(&self, booking: &Booking) -> Option<String> {
        let template = self
            .by_service
            .get(&(booking.service_id.clone(), booking.status))
            .or_else(|| self.by_status.get(&booking.status))?;

        Some(
            template
                .replace("{booking_id}", &booking.id.to_string())
                .replace("{service_id}", &booking.service_id)
                .replace("{provider_id}", booking.provider_id.as_deref().unwrap_or("")),
        )
    }

    pub fn len(&self) -> usize {
        self.by_status.len() + self.by_service.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse_status(field: &str, status: &str) -> Result<BookingState, ConfigurationError> {
    status.parse().map_err(|_| {
        ConfigurationError::invalid_value(
            format!("notifications.{field}"),
            status,
            "template keys must be booking statuses",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, NewBooking, Urgency};
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn booking(service: &str) -> Booking {
        let mut booking = Booking::new(
            NewBooking {
                customer_id: "c-1".to_string(),
                service_id: service.to_string(),
                scheduled_at: None,
                total_amount: dec!(50),
                location: Location::new(0.0, 0.0),
                urgency: Urgency::Standard,
            },
            Utc::now(),
            Duration::minutes(5),
        );
        booking.status = BookingState::Accepted;
        booking.provider_id = Some("p-9".to_string());
        booking
    }

    #[test]
    fn test_service_override_wins() {
        let mut config = NotificationConfig::default();
        config.service_templates.insert(
            "plumbing".to_string(),
            HashMap::from([("accepted".to_string(), "Plumber {provider_id}".to_string())]),
        );
        let templates = NotificationTemplates::from_config(&config).unwrap();

        assert_eq!(
            templates.render(&booking("plumbing")).as_deref(),
            Some("Plumber p-9")
        );
        assert_eq!(
            templates.render(&booking("cleaning")).as_deref(),
            Some("Provider p-9 accepted your booking")
        );
    }

    #[test]
    fn test_unknown_status_key_is_rejected() {
        let mut config = NotificationConfig::default();
        config
            .templates
            .insert("teleported".to_string(), "?".to_string());
        assert!(NotificationTemplates::from_config(&config).is_err());
    }

    #[test]
    fn test_missing_template_renders_nothing() {
        let templates = NotificationTemplates::default();
        assert!(templates.is_empty());
        assert!(templates.render(&booking("cleaning")).is_none());
    }
}
