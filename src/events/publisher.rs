//! Broadcast fan-out of booking lifecycle events to the notification layer.
//!
//! Delivery is best effort. A lagging or absent subscriber never blocks a transition.

use crate::state_machine::BookingEvent;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<Notification>,
}

/// What subscribers receive: the event name, its booking, and the serialized event body
#[derive(Debug, Clone)]
pub struct Notification {
    pub name: &'static str,
    pub booking_id: Uuid,
    pub payload: Value,
    pub published_at: DateTime<Utc>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Serialize and broadcast; only a serialization failure is reported
    pub fn publish(&self, event: &BookingEvent) -> Result<(), PublishError> {
        let notification = Notification {
            name: event.event_name(),
            booking_id: event.booking_id(),
            payload: serde_json::to_value(event)?,
            published_at: Utc::now(),
        };

        if let Err(broadcast::error::SendError(dropped)) = self.sender.send(notification) {
            tracing::trace!(
                event = dropped.name,
                booking_id = %dropped.booking_id,
                "No notification subscribers"
            );
        }
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to serialize booking event: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(detail: &str) -> BookingEvent {
        BookingEvent::InvariantViolation {
            booking_id: Uuid::nil(),
            detail: detail.to_string(),
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let publisher = EventPublisher::new(8);
        assert!(publisher.publish(&violation("two accepted offers")).is_ok());
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_named_event() {
        let publisher = EventPublisher::new(8);
        let mut rx = publisher.subscribe();
        publisher.publish(&violation("x")).unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.name, "booking.invariant_violation");
        assert_eq!(received.booking_id, Uuid::nil());
        assert_eq!(received.payload["data"]["detail"], "x");
    }
}
