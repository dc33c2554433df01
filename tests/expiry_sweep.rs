//! Deadline sweeps: offer expiry, matching timeouts, follow-up waves, auto-completion.

mod common;

use booking_core::database::BookingStore;
use booking_core::models::{JobRequestStatus, RefundState};
use booking_core::state_machine::BookingState;
use chrono::{Duration, Utc};
use common::TestHarness;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_matching_window_expiry_cancels_with_no_provider_available() {
    let harness = TestHarness::new();
    let now = Utc::now();
    let providers = vec!["provider-a".to_string(), "provider-b".to_string()];
    let (booking, _) = harness.matched_with_offers(&providers, now);

    // Still inside every window: nothing to do
    let quiet = harness.core.sweeper.sweep_once(now).await.unwrap();
    assert!(quiet.is_idle());

    let after = booking.matching_expires_at + Duration::seconds(1);
    let report = harness.core.sweeper.sweep_once(after).await.unwrap();
    assert_eq!(report.offers_expired, 2);
    assert_eq!(report.bookings_cancelled, 1);
    assert_eq!(report.errors, 0);

    let stored = harness.booking(booking.id).await;
    assert_eq!(stored.status, BookingState::Cancelled);
    assert_eq!(
        stored.cancellation_reason.as_deref(),
        Some("no_provider_available")
    );
    assert!(stored.provider_id.is_none());
    // Never paid, so nothing is owed
    assert_eq!(stored.refund_state, RefundState::NotRequired);

    let offers = harness.offers(booking.id).await;
    assert!(offers.iter().all(|o| o.status == JobRequestStatus::Expired));
}

#[tokio::test]
async fn test_accept_deadline_expiry_cancels() {
    let harness = TestHarness::new();
    let now = Utc::now();
    let providers = vec!["provider-a".to_string()];
    let (booking, _) = harness.matched_with_offers(&providers, now);

    let deadline = booking.accept_deadline_at.unwrap();
    assert!(deadline < booking.matching_expires_at);
    let report = harness
        .core
        .sweeper
        .sweep_once(deadline + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(report.bookings_cancelled, 1);
    assert_eq!(harness.booking(booking.id).await.status, BookingState::Cancelled);
}

#[tokio::test]
async fn test_redundant_sweeps_are_no_ops() {
    let harness = TestHarness::new();
    let now = Utc::now();
    let providers = vec!["provider-a".to_string()];
    let (booking, _) = harness.matched_with_offers(&providers, now);
    let after = booking.matching_expires_at + Duration::minutes(1);

    let first = harness.core.sweeper.sweep_once(after).await.unwrap();
    assert_eq!(first.bookings_cancelled, 1);
    let version = harness.booking(booking.id).await.version;

    let second = harness.core.sweeper.sweep_once(after).await.unwrap();
    assert!(second.is_idle(), "{second:?}");
    assert_eq!(harness.booking(booking.id).await.version, version);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sweeps_cancel_once() {
    let harness = TestHarness::new();
    let now = Utc::now();
    let mut bookings = Vec::new();
    for i in 0..5 {
        let providers = vec![format!("provider-{i}")];
        bookings.push(harness.matched_with_offers(&providers, now).0);
    }
    let after = now + Duration::hours(1);

    let sweeps = (0..4).map(|_| {
        let core = harness.core.clone();
        tokio::spawn(async move { core.sweeper.sweep_once(after).await })
    });
    let reports: Vec<_> = futures::future::join_all(sweeps)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let cancelled: usize = reports.iter().map(|r| r.bookings_cancelled).sum();
    let errors: usize = reports.iter().map(|r| r.errors).sum();
    assert_eq!(cancelled, bookings.len());
    assert_eq!(errors, 0);
    for booking in bookings {
        assert_eq!(harness.booking(booking.id).await.status, BookingState::Cancelled);
    }
}

#[tokio::test]
async fn test_expired_offers_trigger_next_wave() {
    let harness = TestHarness::new();
    harness.add_providers(&["provider-a", "provider-b", "provider-c"], 2.0);
    let now = Utc::now();
    let booking = harness.create(now).await;
    assert_eq!(harness.offers(booking.id).await.len(), 2);

    let report = harness
        .core
        .sweeper
        .sweep_once(now + Duration::seconds(61))
        .await
        .unwrap();
    assert_eq!(report.offers_expired, 2);
    assert_eq!(report.waves_dispatched, 1);
    assert_eq!(report.bookings_cancelled, 0);

    let offers = harness.offers(booking.id).await;
    let live: Vec<_> = offers
        .iter()
        .filter(|o| o.status == JobRequestStatus::Sent)
        .collect();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].provider_id, "provider-c");
    assert_eq!(harness.booking(booking.id).await.status, BookingState::Matched);
}

#[tokio::test]
async fn test_offers_expired_outside_the_sweep_still_get_next_wave() {
    let harness = TestHarness::new();
    harness.add_providers(&["provider-a", "provider-b", "provider-c"], 2.0);
    let now = Utc::now();
    let booking = harness.create(now).await;

    // Another instance expired the offers and crashed before dispatching
    let expired = harness
        .store
        .expire_job_requests(now + Duration::seconds(61))
        .await
        .unwrap();
    assert_eq!(expired.len(), 2);

    let report = harness
        .core
        .sweeper
        .sweep_once(now + Duration::seconds(62))
        .await
        .unwrap();
    assert_eq!(report.offers_expired, 0);
    assert_eq!(report.waves_dispatched, 1);
    assert_eq!(report.bookings_cancelled, 0);

    let live: Vec<_> = harness
        .offers(booking.id)
        .await
        .into_iter()
        .filter(|o| o.status == JobRequestStatus::Sent)
        .collect();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].provider_id, "provider-c");

    let again = harness
        .core
        .sweeper
        .sweep_once(now + Duration::seconds(63))
        .await
        .unwrap();
    assert!(again.is_idle(), "{again:?}");
}

#[tokio::test]
async fn test_matched_booking_without_any_offers_is_left_alone() {
    let harness = TestHarness::new();
    let now = Utc::now();
    let (booking, _) = harness.matched_with_offers(&[], now);

    let report = harness.core.sweeper.sweep_once(now).await.unwrap();
    assert!(report.is_idle(), "{report:?}");
    assert_eq!(harness.booking(booking.id).await.status, BookingState::Matched);
}

#[tokio::test]
async fn test_work_completed_auto_completes_after_grace() {
    let harness = TestHarness::new();
    let now = Utc::now();
    let booking = harness
        .park(BookingState::WorkCompleted, dec!(90), None, now)
        .await;

    let early = harness
        .core
        .sweeper
        .sweep_once(now + Duration::minutes(30))
        .await
        .unwrap();
    assert_eq!(early.bookings_completed, 0);

    let report = harness
        .core
        .sweeper
        .sweep_once(now + Duration::hours(2))
        .await
        .unwrap();
    assert_eq!(report.bookings_completed, 1);

    let stored = harness.booking(booking.id).await;
    assert_eq!(stored.status, BookingState::Completed);
    assert!(harness.store.get_receipt(booking.id).await.unwrap().is_some());
}
