//! # Booking Service
//!
//! Customer-facing flows that string several components together:
//!
//! - creation: validate the time, insert `created`, capture payment outside any write,
//!   then `requested` (or `payment_failed`) and straight into matching
//! - matching: `requested → matching`, rank, then either cancel as
//!   `no_provider_available` or `matching → matched` and send the first wave
//! - completion: the customer confirms a `work_completed` booking

use crate::config::MatchingConfig;
use crate::constants::{cancellation_reasons, system_actors, system_idempotency_key};
use crate::database::BookingStore;
use crate::error::{BookingError, BookingResult};
use crate::logging::log_booking_operation;
use crate::matching::{JobRequestDispatcher, ProviderRanker};
use crate::models::{
    Actor, ActorRole, Booking, CancellationTerms, Location, NewBooking, ProviderCandidate,
};
use crate::resilience::{retry_with_backoff, BackoffPolicy};
use crate::scheduling::SchedulingValidator;
use crate::services::PaymentGateway;
use crate::state_machine::{BookingState, BookingStateMachine, TransitionContext};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

pub struct BookingService {
    store: Arc<dyn BookingStore>,
    state_machine: Arc<BookingStateMachine>,
    ranker: Arc<ProviderRanker>,
    dispatcher: Arc<JobRequestDispatcher>,
    gateway: Arc<dyn PaymentGateway>,
    validator: SchedulingValidator,
    backoff: BackoffPolicy,
    matching: MatchingConfig,
}

impl BookingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn BookingStore>,
        state_machine: Arc<BookingStateMachine>,
        ranker: Arc<ProviderRanker>,
        dispatcher: Arc<JobRequestDispatcher>,
        gateway: Arc<dyn PaymentGateway>,
        validator: SchedulingValidator,
        backoff: BackoffPolicy,
        matching: MatchingConfig,
    ) -> Self {
        Self {
            store,
            state_machine,
            ranker,
            dispatcher,
            gateway,
            validator,
            backoff,
            matching,
        }
    }

    pub async fn create_booking(
        &self,
        request: NewBooking,
        actor: &Actor,
    ) -> BookingResult<Booking> {
        self.create_booking_at(request, actor, Utc::now()).await
    }

    /// Create a booking and take it as far as the first wave of offers.
    ///
    /// A failed capture still returns the booking, now in `payment_failed`. Once the
    /// booking is paid, matching problems are logged and left to the sweep rather than
    /// failing the request.
    #[instrument(skip(self, request, actor), fields(customer_id = %request.customer_id, service_id = %request.service_id))]
    pub async fn create_booking_at(
        &self,
        request: NewBooking,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> BookingResult<Booking> {
        self.authorize_creation(&request, actor)?;
        validate_request(&request)?;
        self.validator
            .validate_requested_time(&request.service_id, request.scheduled_at, now)?;

        let booking = Booking::new(request, now, self.matching.matching_window());
        self.store.insert_booking(&booking).await?;
        log_booking_operation("create", booking.id, booking.status, None);

        let system = Actor::system(system_actors::BOOKING_SERVICE);
        let gateway = &self.gateway;
        let capture = retry_with_backoff(&self.backoff, "payment_capture", |_| {
            gateway.capture(booking.total_amount, &booking.customer_id)
        })
        .await;

        let payment_reference = match capture {
            Ok(reference) => reference,
            Err(e) => {
                warn!(booking_id = %booking.id, error = %e, "Payment capture failed");
                return self
                    .state_machine
                    .apply_at(
                        booking.id,
                        BookingState::PaymentFailed,
                        &system,
                        TransitionContext::default(),
                        now,
                    )
                    .await;
            }
        };

        self.state_machine
            .apply_at(
                booking.id,
                BookingState::Requested,
                &system,
                TransitionContext::with_payment_reference(payment_reference),
                now,
            )
            .await?;

        match self.start_matching_at(booking.id, now).await {
            Ok(booking) => Ok(booking),
            Err(e) => {
                warn!(booking_id = %booking.id, error = %e, "Matching did not start; sweep will resolve");
                self.state_machine.get(booking.id).await
            }
        }
    }

    /// `requested → matching → matched` plus the first wave, or cancellation if nobody fits
    pub async fn start_matching_at(
        &self,
        booking_id: Uuid,
        now: DateTime<Utc>,
    ) -> BookingResult<Booking> {
        let system = Actor::system(system_actors::DISPATCHER);
        let booking = self
            .state_machine
            .apply_at(
                booking_id,
                BookingState::Matching,
                &system,
                TransitionContext::default(),
                now,
            )
            .await?;

        let ranked = self
            .ranker
            .rank(
                &booking.service_id,
                booking.location,
                self.matching.max_distance_km,
            )
            .await?;

        if ranked.is_empty() {
            let terms = CancellationTerms::new(
                cancellation_reasons::NO_PROVIDER_AVAILABLE,
                system_idempotency_key(booking_id, cancellation_reasons::NO_PROVIDER_AVAILABLE),
            );
            self.state_machine
                .cancel_at(booking_id, &system, terms, now)
                .await?;
            return self.state_machine.get(booking_id).await;
        }

        self.state_machine
            .apply_at(
                booking_id,
                BookingState::Matched,
                &system,
                TransitionContext::default(),
                now,
            )
            .await?;
        self.dispatcher
            .dispatch_at(booking_id, &ranked, now)
            .await?;
        self.state_machine.get(booking_id).await
    }

    pub async fn find_providers(
        &self,
        service_id: &str,
        location: Location,
        max_distance_km: Option<f64>,
    ) -> BookingResult<Vec<ProviderCandidate>> {
        let max = max_distance_km.unwrap_or(self.matching.max_distance_km);
        self.ranker.rank(service_id, location, max).await
    }

    /// The customer confirms the provider's completion report
    pub async fn confirm_completion_at(
        &self,
        booking_id: Uuid,
        actor: &Actor,
        rating: Option<u8>,
        now: DateTime<Utc>,
    ) -> BookingResult<Booking> {
        if let Some(rating) = rating {
            if !(1..=5).contains(&rating) {
                return Err(BookingError::validation(format!(
                    "rating must be between 1 and 5, got {rating}"
                )));
            }
        }

        let booking = self.state_machine.get(booking_id).await?;
        let allowed = match actor.role {
            ActorRole::Customer => actor.id == booking.customer_id,
            ActorRole::Admin => true,
            _ => false,
        };
        if !allowed {
            return Err(BookingError::Authorization {
                actor_id: actor.id.clone(),
                actor_role: actor.role,
                reason: "only the booking's customer may confirm completion".to_string(),
            });
        }
        if booking.status != BookingState::WorkCompleted {
            return Err(BookingError::Transition {
                from: booking.status,
                to: BookingState::Completed,
            });
        }

        self.state_machine
            .apply_at(
                booking_id,
                BookingState::Completed,
                &Actor::system(system_actors::COMPLETION_CONFIRMATION),
                TransitionContext::with_rating(rating),
                now,
            )
            .await
    }

    fn authorize_creation(&self, request: &NewBooking, actor: &Actor) -> BookingResult<()> {
        match actor.role {
            ActorRole::Customer if actor.id == request.customer_id => Ok(()),
            ActorRole::Admin | ActorRole::System => Ok(()),
            _ => Err(BookingError::Authorization {
                actor_id: actor.id.clone(),
                actor_role: actor.role,
                reason: "customers may only book for themselves".to_string(),
            }),
        }
    }
}

fn validate_request(request: &NewBooking) -> BookingResult<()> {
    if request.customer_id.trim().is_empty() {
        return Err(BookingError::validation("customer_id must not be empty"));
    }
    if request.service_id.trim().is_empty() {
        return Err(BookingError::validation("service_id must not be empty"));
    }
    if request.total_amount <= Decimal::ZERO {
        return Err(BookingError::validation(format!(
            "total_amount must be positive, got {}",
            request.total_amount
        )));
    }
    if request.total_amount.scale() > 2 {
        return Err(BookingError::validation(format!(
            "total_amount {} has more than two decimal places",
            request.total_amount
        )));
    }
    if !request.location.is_valid() {
        return Err(BookingError::validation(format!(
            "invalid location ({}, {})",
            request.location.latitude, request.location.longitude
        )));
    }
    Ok(())
}
