//! End-to-end booking flows over the in-memory store.

mod common;

use booking_core::database::BookingStore;
use booking_core::models::{Actor, JobRequestStatus, RefundState};
use booking_core::state_machine::BookingState;
use booking_core::BookingError;
use chrono::{Duration, Utc};
use common::TestHarness;

#[tokio::test]
async fn test_happy_path_from_creation_to_receipt() {
    let harness = TestHarness::new();
    harness.add_providers(&["provider-a", "provider-b", "provider-c"], 2.0);
    let now = Utc::now();

    let booking = harness.create(now).await;
    assert_eq!(booking.status, BookingState::Matched);
    assert!(booking.payment_reference_id.is_some());
    assert!(booking.accept_deadline_at.is_some());
    assert!(booking.provider_id.is_none());

    // Fanout of two: the two closest providers get the first wave
    let offers = harness.offers(booking.id).await;
    assert_eq!(offers.len(), 2);
    let offered: Vec<_> = offers.iter().map(|o| o.provider_id.as_str()).collect();
    assert!(offered.contains(&"provider-a"));
    assert!(offered.contains(&"provider-b"));

    let winner = offers
        .iter()
        .find(|o| o.provider_id == "provider-a")
        .unwrap();
    let provider = Actor::provider("provider-a");
    let accepted = harness
        .core
        .coordinator
        .claim_at(booking.id, winner.id, &provider, now)
        .await
        .unwrap();
    assert_eq!(accepted.status, BookingState::Accepted);
    assert_eq!(accepted.provider_id.as_deref(), Some("provider-a"));

    for state in [
        BookingState::Enroute,
        BookingState::Arrived,
        BookingState::Started,
        BookingState::InProgress,
        BookingState::WorkCompleted,
    ] {
        let moved = harness
            .core
            .state_machine
            .transition_at(booking.id, state, &provider, now)
            .await
            .unwrap();
        assert_eq!(moved.status, state);
    }

    let completed = harness
        .core
        .bookings
        .confirm_completion_at(booking.id, &Actor::customer(common::CUSTOMER), Some(5), now)
        .await
        .unwrap();
    assert_eq!(completed.status, BookingState::Completed);
    assert_eq!(completed.rating, Some(5));
    assert!(completed.completed_at.is_some());

    // The completion action already wrote the receipt; fetching it again changes nothing
    let stored = harness.store.get_receipt(booking.id).await.unwrap().unwrap();
    let fetched = harness.core.receipts.generate_at(booking.id, now).await.unwrap();
    assert_eq!(stored, fetched);
    assert_eq!(fetched.provider_id, "provider-a");

    let offers = harness.offers(booking.id).await;
    assert_eq!(
        offers
            .iter()
            .filter(|o| o.status == JobRequestStatus::Accepted)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_terminal_bookings_reject_transitions() {
    let harness = TestHarness::new();
    let now = Utc::now();
    let booking = harness
        .park(BookingState::Completed, rust_decimal::Decimal::ONE_HUNDRED, None, now)
        .await;

    for to in [
        BookingState::InProgress,
        BookingState::Cancelled,
        BookingState::Refunded,
        BookingState::Matching,
    ] {
        let err = harness
            .core
            .state_machine
            .transition_at(booking.id, to, &Actor::admin("admin-1"), now)
            .await
            .unwrap_err();
        assert!(
            matches!(err, BookingError::Transition { .. } | BookingError::Conflict { .. }),
            "{to}: {err}"
        );
    }
    assert_eq!(harness.booking(booking.id).await.status, BookingState::Completed);
}

#[tokio::test]
async fn test_payment_failure_parks_booking() {
    let harness = TestHarness::new();
    harness.add_providers(&["provider-a"], 1.0);
    harness.gateway.fail_next_captures(3);

    let booking = harness.create(Utc::now()).await;
    assert_eq!(booking.status, BookingState::PaymentFailed);
    assert!(booking.payment_reference_id.is_none());
    assert!(harness.offers(booking.id).await.is_empty());
}

#[tokio::test]
async fn test_capture_retry_recovers() {
    let harness = TestHarness::new();
    harness.add_providers(&["provider-a"], 1.0);
    harness.gateway.fail_next_captures(2);

    let booking = harness.create(Utc::now()).await;
    assert_eq!(booking.status, BookingState::Matched);
    assert_eq!(harness.gateway.capture_count(), 1);
}

#[tokio::test]
async fn test_no_candidates_cancels_and_refunds_in_full() {
    let harness = TestHarness::new();
    let booking = harness.create(Utc::now()).await;

    assert_eq!(booking.status, BookingState::Refunded);
    assert_eq!(
        booking.cancellation_reason.as_deref(),
        Some("no_provider_available")
    );
    assert_eq!(booking.cancellation_fee, Some(rust_decimal::Decimal::ZERO));
    assert_eq!(booking.refund_amount, Some(booking.total_amount));
    assert_eq!(booking.refund_state, RefundState::Issued);
    assert!(booking.refund_reference_id.is_some());
}

#[tokio::test]
async fn test_scheduling_rejection_creates_nothing() {
    let harness = TestHarness::new();
    let now = Utc::now();
    let mut request = common::new_booking(common::CUSTOMER);
    request.scheduled_at = Some(now + Duration::minutes(5));

    let err = harness
        .core
        .bookings
        .create_booking_at(request, &Actor::customer(common::CUSTOMER), now)
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), "validation_error");
    assert_eq!(harness.store.booking_count(), 0);
}

#[tokio::test]
async fn test_role_rules_for_status_changes() {
    let harness = TestHarness::new();
    let now = Utc::now();
    let booking = harness
        .park(BookingState::Accepted, rust_decimal::Decimal::ONE_HUNDRED, None, now)
        .await;

    let customer = harness
        .core
        .state_machine
        .transition_at(booking.id, BookingState::Enroute, &Actor::customer(common::CUSTOMER), now)
        .await
        .unwrap_err();
    assert_eq!(customer.reason_code(), "not_authorized");

    let stranger = harness
        .core
        .state_machine
        .transition_at(booking.id, BookingState::Enroute, &Actor::provider("provider-9"), now)
        .await
        .unwrap_err();
    assert_eq!(stranger.reason_code(), "not_authorized");

    let skip = harness
        .core
        .state_machine
        .transition_at(booking.id, BookingState::Started, &Actor::provider("provider-1"), now)
        .await
        .unwrap_err();
    assert_eq!(skip.reason_code(), "invalid_transition");

    let moved = harness
        .core
        .state_machine
        .transition_at(booking.id, BookingState::Enroute, &Actor::provider("provider-1"), now)
        .await
        .unwrap();
    assert_eq!(moved.status, BookingState::Enroute);
    assert_eq!(moved.version, booking.version + 1);
}

#[tokio::test]
async fn test_confirmation_rules() {
    let harness = TestHarness::new();
    let now = Utc::now();
    let booking = harness
        .park(BookingState::WorkCompleted, rust_decimal::Decimal::ONE_HUNDRED, None, now)
        .await;

    let bad_rating = harness
        .core
        .bookings
        .confirm_completion_at(booking.id, &Actor::customer(common::CUSTOMER), Some(6), now)
        .await
        .unwrap_err();
    assert_eq!(bad_rating.reason_code(), "validation_error");

    let other_customer = harness
        .core
        .bookings
        .confirm_completion_at(booking.id, &Actor::customer("customer-2"), None, now)
        .await
        .unwrap_err();
    assert_eq!(other_customer.reason_code(), "not_authorized");

    let confirmed = harness
        .core
        .bookings
        .confirm_completion_at(booking.id, &Actor::customer(common::CUSTOMER), None, now)
        .await
        .unwrap();
    assert_eq!(confirmed.status, BookingState::Completed);

    let again = harness
        .core
        .bookings
        .confirm_completion_at(booking.id, &Actor::customer(common::CUSTOMER), None, now)
        .await
        .unwrap_err();
    assert_eq!(again.reason_code(), "invalid_transition");
}

#[tokio::test]
async fn test_decline_sends_next_wave() {
    let harness = TestHarness::new();
    harness.add_providers(&["provider-a", "provider-b", "provider-c"], 2.0);
    let now = Utc::now();
    let booking = harness.create(now).await;

    for provider in ["provider-a", "provider-b"] {
        let offer = harness
            .offers(booking.id)
            .await
            .into_iter()
            .find(|o| o.provider_id == provider)
            .unwrap();
        harness
            .core
            .dispatcher
            .decline_at(offer.id, &Actor::provider(provider), now)
            .await
            .unwrap();
    }

    let offers = harness.offers(booking.id).await;
    let third = offers
        .iter()
        .find(|o| o.provider_id == "provider-c")
        .expect("second wave reached the third provider");
    assert_eq!(third.status, JobRequestStatus::Sent);
    assert_eq!(third.wave, 2);
}

#[tokio::test]
async fn test_exhausted_candidates_cancel_booking() {
    let harness = TestHarness::new();
    harness.add_providers(&["provider-a"], 2.0);
    let now = Utc::now();
    let booking = harness.create(now).await;

    let offer = harness.offers(booking.id).await.pop().unwrap();
    harness
        .core
        .dispatcher
        .decline_at(offer.id, &Actor::provider("provider-a"), now)
        .await
        .unwrap();

    let booking = harness.booking(booking.id).await;
    assert!(booking.status == BookingState::Cancelled || booking.status == BookingState::Refunded);
    assert_eq!(
        booking.cancellation_reason.as_deref(),
        Some("no_provider_accepted")
    );
}

#[tokio::test]
async fn test_halted_booking_blocks_system_until_cleared() {
    let harness = TestHarness::new();
    let now = Utc::now();
    let booking = harness
        .park(BookingState::WorkCompleted, rust_decimal::Decimal::ONE_HUNDRED, None, now)
        .await;
    harness
        .core
        .state_machine
        .halt(booking.id, "manual check")
        .await
        .unwrap();

    let blocked = harness
        .core
        .bookings
        .confirm_completion_at(booking.id, &Actor::customer(common::CUSTOMER), None, now)
        .await
        .unwrap_err();
    assert_eq!(blocked.reason_code(), "invariant_halt");

    let denied = harness
        .core
        .state_machine
        .clear_halt(booking.id, &Actor::customer(common::CUSTOMER))
        .await
        .unwrap_err();
    assert_eq!(denied.reason_code(), "not_authorized");

    harness
        .core
        .state_machine
        .clear_halt(booking.id, &Actor::admin("admin-1"))
        .await
        .unwrap();
    let confirmed = harness
        .core
        .bookings
        .confirm_completion_at(booking.id, &Actor::customer(common::CUSTOMER), None, now)
        .await
        .unwrap();
    assert_eq!(confirmed.status, BookingState::Completed);
}

#[tokio::test]
async fn test_repeated_cancel_status_request_fails_once_terminal() {
    let harness = TestHarness::new();
    let now = Utc::now();
    let booking = harness
        .park(BookingState::Matched, rust_decimal::Decimal::ONE_HUNDRED, None, now)
        .await;
    let customer = Actor::customer(common::CUSTOMER);

    let first = harness
        .core
        .state_machine
        .transition_at(booking.id, BookingState::Cancelled, &customer, now)
        .await
        .unwrap();
    assert!(first.is_terminal());

    let later = now + Duration::minutes(5);
    for actor in [customer, Actor::provider("provider-9"), Actor::admin("admin-1")] {
        let err = harness
            .core
            .state_machine
            .transition_at(booking.id, BookingState::Cancelled, &actor, later)
            .await
            .unwrap_err();
        assert_eq!(err.reason_code(), "invalid_transition", "{actor}");
    }
    assert_eq!(harness.gateway.refund_calls(), 1);
}
