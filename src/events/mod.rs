pub mod publisher;
pub mod templates;

pub use publisher::{EventPublisher, Notification, PublishError};
pub use templates::NotificationTemplates;
