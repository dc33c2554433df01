//! External collaborators consumed by the booking core.

pub mod payment_gateway;
pub mod provider_directory;

pub use payment_gateway::{InMemoryPaymentGateway, PaymentError, PaymentGateway};
pub use provider_directory::{DirectoryError, InMemoryProviderDirectory, ProviderDirectory};
