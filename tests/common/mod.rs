//! Shared fixtures for the integration tests: a booking core over in-memory collaborators
//! plus builders for bookings parked in a given state.

#![allow(dead_code)]

use booking_core::config::BookingConfig;
use booking_core::database::{BookingStore, InMemoryBookingStore};
use booking_core::models::{
    Actor, Booking, JobRequest, Location, NewBooking, ProviderCandidate, ProviderProfile, Urgency,
};
use booking_core::orchestration::BookingCore;
use booking_core::services::{InMemoryPaymentGateway, InMemoryProviderDirectory, PaymentGateway};
use booking_core::state_machine::BookingState;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::sync::Arc;

pub const SERVICE: &str = "cleaning";
pub const CUSTOMER: &str = "customer-1";

/// Configuration tuned for tests: tiny backoff so retries do not slow the suite
pub fn test_config() -> BookingConfig {
    let mut config = BookingConfig::default();
    config.payment.max_attempts = 3;
    config.payment.backoff_base_ms = 1;
    config.payment.backoff_max_ms = 4;
    config.matching.fanout = 2;
    config.matching.offer_window_seconds = 60;
    config.matching.matching_window_seconds = 900;
    config.matching.accept_window_seconds = 600;
    config.sweep.completion_grace_seconds = 3600;
    config
}

pub struct TestHarness {
    pub core: Arc<BookingCore>,
    pub store: Arc<InMemoryBookingStore>,
    pub gateway: Arc<InMemoryPaymentGateway>,
    pub directory: Arc<InMemoryProviderDirectory>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: BookingConfig) -> Self {
        let store = Arc::new(InMemoryBookingStore::new());
        let gateway = Arc::new(InMemoryPaymentGateway::new());
        let directory = Arc::new(InMemoryProviderDirectory::new());
        let core = BookingCore::new(config, store.clone(), gateway.clone(), directory.clone())
            .expect("test config is valid");
        Self {
            core: Arc::new(core),
            store,
            gateway,
            directory,
        }
    }

    /// Register providers near the origin, `spacing_km` apart along the equator
    pub fn add_providers(&self, ids: &[&str], spacing_km: f64) {
        for (i, id) in ids.iter().enumerate() {
            // One degree of longitude at the equator is ~111.2 km
            let longitude = (i as f64 + 1.0) * spacing_km / 111.2;
            self.directory
                .upsert(provider(id, Location::new(0.0, longitude), 4.5, None));
        }
    }

    pub async fn create(&self, now: DateTime<Utc>) -> Booking {
        self.core
            .bookings
            .create_booking_at(new_booking(CUSTOMER), &Actor::customer(CUSTOMER), now)
            .await
            .expect("booking created")
    }

    pub async fn booking(&self, booking_id: uuid::Uuid) -> Booking {
        self.store
            .get_booking(booking_id)
            .await
            .unwrap()
            .expect("booking exists")
    }

    pub async fn offers(&self, booking_id: uuid::Uuid) -> Vec<JobRequest> {
        self.store.job_requests_for_booking(booking_id).await.unwrap()
    }

    /// Park a booking in `status` with a captured payment, bypassing the state machine
    pub async fn park(
        &self,
        status: BookingState,
        total: Decimal,
        scheduled_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Booking {
        let mut request = new_booking(CUSTOMER);
        request.total_amount = total;
        request.scheduled_at = scheduled_at;
        let mut booking = Booking::new(request, now, Duration::minutes(15));
        booking.status = status;
        booking.payment_reference_id = Some(
            self.gateway
                .capture(total, CUSTOMER)
                .await
                .expect("capture succeeds"),
        );
        if status.requires_provider() {
            booking.provider_id = Some("provider-1".to_string());
            booking.accepted_at = Some(now);
        }
        if status == BookingState::Matched {
            booking.accept_deadline_at = Some(now + Duration::minutes(10));
        }
        if status == BookingState::WorkCompleted {
            booking.work_completed_at = Some(now);
        }
        self.store.force_put(booking.clone());
        booking
    }

    /// A matched booking with one live offer per provider
    pub fn matched_with_offers(
        &self,
        providers: &[String],
        now: DateTime<Utc>,
    ) -> (Booking, Vec<JobRequest>) {
        let mut booking = Booking::new(new_booking(CUSTOMER), now, Duration::minutes(15));
        booking.status = BookingState::Matched;
        booking.accept_deadline_at = Some(now + Duration::minutes(10));
        self.store.force_put(booking.clone());

        let offers = providers
            .iter()
            .map(|id| {
                let offer =
                    JobRequest::offer(&booking, &candidate(id, 1.0), 1, now, Duration::seconds(60));
                self.store.force_put_job_request(offer.clone());
                offer
            })
            .collect();
        (booking, offers)
    }
}

pub fn new_booking(customer: &str) -> NewBooking {
    NewBooking {
        customer_id: customer.to_string(),
        service_id: SERVICE.to_string(),
        scheduled_at: None,
        total_amount: Decimal::ONE_HUNDRED,
        location: Location::new(0.0, 0.0),
        urgency: Urgency::Standard,
    }
}

pub fn provider(
    id: &str,
    location: Location,
    rating: f64,
    last_accept_time: Option<DateTime<Utc>>,
) -> ProviderProfile {
    ProviderProfile {
        id: id.to_string(),
        location,
        rating,
        last_accept_time,
        available: true,
        services: BTreeSet::from([SERVICE.to_string()]),
        blackout_windows: Vec::new(),
    }
}

pub fn candidate(id: &str, distance_km: f64) -> ProviderCandidate {
    ProviderCandidate {
        id: id.to_string(),
        distance_km,
        rating: 4.5,
        last_accept_time: None,
        available: true,
        services: BTreeSet::from([SERVICE.to_string()]),
    }
}
