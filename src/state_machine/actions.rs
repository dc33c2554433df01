use super::errors::{ActionError, ActionResult};
use super::events::BookingEvent;
use super::states::BookingState;
use crate::events::{EventPublisher, NotificationTemplates};
use crate::models::{Actor, Booking, RefundState};
use crate::orchestration::{ReceiptGenerator, RefundProcessor};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A booking write that has already committed
#[derive(Debug, Clone)]
pub struct CommittedTransition {
    pub before: Booking,
    pub after: Booking,
    pub actor: Actor,
    pub now: DateTime<Utc>,
}

impl CommittedTransition {
    pub fn from_status(&self) -> BookingState {
        self.before.status
    }

    pub fn to_status(&self) -> BookingState {
        self.after.status
    }

    pub fn entered(&self, state: BookingState) -> bool {
        self.before.status != state && self.after.status == state
    }
}

/// Side effect run after a transition commits. Failures never roll the transition back.
#[async_trait]
pub trait StateAction: Send + Sync {
    async fn execute(&self, transition: &CommittedTransition) -> ActionResult<()>;

    /// Get a description of this action for logging
    fn description(&self) -> &'static str;
}

/// Action to publish lifecycle events when state transitions occur
pub struct PublishTransitionEventAction {
    event_publisher: EventPublisher,
    templates: Arc<NotificationTemplates>,
}

impl PublishTransitionEventAction {
    pub fn new(event_publisher: EventPublisher, templates: Arc<NotificationTemplates>) -> Self {
        Self {
            event_publisher,
            templates,
        }
    }
}

#[async_trait]
impl StateAction for PublishTransitionEventAction {
    async fn execute(&self, transition: &CommittedTransition) -> ActionResult<()> {
        if transition.from_status() == transition.to_status() {
            return Ok(());
        }

        let event = BookingEvent::StatusChanged {
            booking_id: transition.after.id,
            old_status: transition.from_status(),
            new_status: transition.to_status(),
            provider_id: transition
                .after
                .provider_id
                .clone()
                .or_else(|| transition.before.provider_id.clone()),
            actor_role: transition.actor.role,
            message: self.templates.render(&transition.after),
            occurred_at: transition.now,
        };

        self.event_publisher
            .publish(&event)
            .map_err(|_| ActionError::EventPublishFailed {
                event_name: event.event_name().to_string(),
            })
    }

    fn description(&self) -> &'static str {
        "Publish lifecycle event for booking transition"
    }
}

/// Action to snapshot the receipt on first entry to `completed`
pub struct GenerateReceiptAction {
    receipts: Arc<ReceiptGenerator>,
}

impl GenerateReceiptAction {
    pub fn new(receipts: Arc<ReceiptGenerator>) -> Self {
        Self { receipts }
    }
}

#[async_trait]
impl StateAction for GenerateReceiptAction {
    async fn execute(&self, transition: &CommittedTransition) -> ActionResult<()> {
        if !transition.entered(BookingState::Completed) {
            return Ok(());
        }

        self.receipts
            .generate_at(transition.after.id, transition.now)
            .await
            .map(|_| ())
            .map_err(|e| ActionError::ReceiptFailed {
                booking_id: transition.after.id,
                reason: e.to_string(),
            })
    }

    fn description(&self) -> &'static str {
        "Generate completion receipt"
    }
}

/// Action to make the first refund attempt once a refund has been committed as owed
pub struct IssueRefundAction {
    refunds: Arc<RefundProcessor>,
}

impl IssueRefundAction {
    pub fn new(refunds: Arc<RefundProcessor>) -> Self {
        Self { refunds }
    }
}

#[async_trait]
impl StateAction for IssueRefundAction {
    async fn execute(&self, transition: &CommittedTransition) -> ActionResult<()> {
        let newly_owed = transition.after.refund_state == RefundState::Pending
            && transition.before.refund_state != RefundState::Pending;
        if !newly_owed {
            return Ok(());
        }

        // A failed gateway call is recorded for the reconciler, not surfaced here
        self.refunds
            .issue_at(transition.after.id, transition.now)
            .await
            .map(|_| ())
            .map_err(|e| ActionError::RefundFailed {
                booking_id: transition.after.id,
                reason: e.to_string(),
            })
    }

    fn description(&self) -> &'static str {
        "Issue refund through the payment gateway"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotificationConfig;
    use crate::models::{Location, NewBooking, Urgency};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn transition(from: BookingState, to: BookingState) -> CommittedTransition {
        let now = Utc::now();
        let mut before = Booking::new(
            NewBooking {
                customer_id: "customer-1".to_string(),
                service_id: "cleaning".to_string(),
                scheduled_at: None,
                total_amount: dec!(50),
                location: Location::new(1.0, 1.0),
                urgency: Urgency::Standard,
            },
            now,
            Duration::minutes(15),
        );
        before.status = from;
        let mut after = before.clone();
        after.status = to;
        after.version += 1;
        CommittedTransition {
            before,
            after,
            actor: Actor::system("test"),
            now,
        }
    }

    #[tokio::test]
    async fn test_publish_action_renders_template() {
        let publisher = EventPublisher::new(8);
        let mut rx = publisher.subscribe();
        let templates =
            NotificationTemplates::from_config(&NotificationConfig::default()).unwrap();
        let action = PublishTransitionEventAction::new(publisher, Arc::new(templates));

        let t = transition(BookingState::Requested, BookingState::Matching);
        action.execute(&t).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "booking.status_changed");
        assert_eq!(event.payload["data"]["old_status"], "requested");
        assert_eq!(event.payload["data"]["new_status"], "matching");
    }

    #[tokio::test]
    async fn test_publish_action_skips_non_status_writes() {
        let publisher = EventPublisher::new(8);
        let mut rx = publisher.subscribe();
        let templates =
            NotificationTemplates::from_config(&NotificationConfig::default()).unwrap();
        let action = PublishTransitionEventAction::new(publisher, Arc::new(templates));

        let t = transition(BookingState::Cancelled, BookingState::Cancelled);
        action.execute(&t).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_entered() {
        let t = transition(BookingState::WorkCompleted, BookingState::Completed);
        assert!(t.entered(BookingState::Completed));
        assert!(!t.entered(BookingState::WorkCompleted));
    }
}
