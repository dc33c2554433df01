//! Data model for the booking core.
//!
//! - [`Booking`] - one customer request, the only record under strict conditional-write discipline
//! - [`JobRequest`] - ephemeral per-provider offer tied to a booking
//! - [`ProviderCandidate`] - read-only projection sourced from the provider directory
//! - [`Receipt`] - immutable completion snapshot
//! - [`CancellationOutcome`] - idempotency record for money decisions

pub mod actor;
pub mod booking;
pub mod cancellation;
pub mod job_request;
pub mod provider;
pub mod receipt;

pub use actor::{Actor, ActorRole};
pub use booking::{Booking, Location, NewBooking, RefundState, Urgency};
pub use cancellation::{CancellationOutcome, CancellationResult, CancellationTerms};
pub use job_request::{JobRequest, JobRequestStatus};
pub use provider::{BlackoutWindow, ProviderCandidate, ProviderProfile};
pub use receipt::Receipt;
