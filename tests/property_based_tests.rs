mod common;

use booking_core::database::BookingStore;
use booking_core::matching::{compare_candidates, rank_candidates};
use booking_core::models::{
    Actor, Booking, Location, NewBooking, ProviderCandidate, Urgency,
};
use booking_core::orchestration::CancellationPolicy;
use booking_core::state_machine::BookingState;
use chrono::{DateTime, Duration, TimeZone, Utc};
use common::{TestHarness, SERVICE};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::BTreeSet;

fn candidate_strategy() -> impl Strategy<Value = ProviderCandidate> {
    (
        "[a-z]{1,6}",
        0u32..40,
        0u32..=50,
        proptest::option::of(0i64..1_000_000),
        any::<bool>(),
    )
        .prop_map(|(id, distance, rating, accept_offset, available)| {
            let epoch: DateTime<Utc> = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
            ProviderCandidate {
                id,
                // Coarse values so ties on every key are common
                distance_km: f64::from(distance) / 2.0,
                rating: f64::from(rating) / 10.0,
                last_accept_time: accept_offset.map(|s| epoch + Duration::seconds(s)),
                available,
                services: BTreeSet::from([SERVICE.to_string()]),
            }
        })
}

fn candidates_and_shuffle() -> impl Strategy<Value = (Vec<ProviderCandidate>, Vec<ProviderCandidate>)>
{
    prop::collection::vec(candidate_strategy(), 0..24).prop_flat_map(|candidates| {
        let shuffled = Just(candidates.clone()).prop_shuffle();
        (Just(candidates), shuffled)
    })
}

proptest! {
    /// Ranking depends only on the candidates, never on the order they arrive in
    #[test]
    fn ranking_is_order_independent((original, shuffled) in candidates_and_shuffle()) {
        let a = rank_candidates(original, SERVICE, 15.0);
        let b = rank_candidates(shuffled, SERVICE, 15.0);
        prop_assert_eq!(a, b);
    }

    /// Ranked output is sorted, filtered, and within the radius
    #[test]
    fn ranking_respects_filters(candidates in prop::collection::vec(candidate_strategy(), 0..24)) {
        let ranked = rank_candidates(candidates, SERVICE, 10.0);
        for pair in ranked.windows(2) {
            prop_assert_ne!(compare_candidates(&pair[0], &pair[1]), Ordering::Greater);
        }
        for c in &ranked {
            prop_assert!(c.available);
            prop_assert!(c.distance_km <= 10.0);
        }
    }

    /// Fee and refund always split the total exactly, in whole cents
    #[test]
    fn cancellation_assessment_splits_total(
        cents in 1i64..10_000_000,
        status_index in 0usize..4,
        lead_minutes in -600i64..6_000,
    ) {
        let now = Utc::now();
        let status = [
            BookingState::Matched,
            BookingState::Accepted,
            BookingState::Enroute,
            BookingState::Started,
        ][status_index];
        let mut booking = Booking::new(
            NewBooking {
                customer_id: "customer-1".to_string(),
                service_id: SERVICE.to_string(),
                scheduled_at: Some(now + Duration::minutes(lead_minutes)),
                total_amount: Decimal::new(cents, 2),
                location: Location::new(0.0, 0.0),
                urgency: Urgency::Standard,
            },
            now,
            Duration::minutes(15),
        );
        booking.status = status;

        let assessment = CancellationPolicy::default().assess(&booking, now);
        prop_assert_eq!(
            assessment.cancellation_fee + assessment.refund_amount,
            booking.total_amount
        );
        prop_assert!(assessment.cancellation_fee >= Decimal::ZERO);
        prop_assert!(assessment.refund_amount >= Decimal::ZERO);
        prop_assert!(assessment.cancellation_fee.scale() <= 2);
        if status == BookingState::Matched {
            prop_assert_eq!(assessment.cancellation_fee, Decimal::ZERO);
        }
    }

    /// However the claims are ordered, at most one offer per booking ends up accepted
    #[test]
    fn at_most_one_accepted_offer(
        order in (1usize..8).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle()),
        expired_mask in any::<u8>(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let harness = TestHarness::new();
            let now = Utc::now();
            let providers: Vec<String> =
                (0..order.len()).map(|i| format!("provider-{i}")).collect();
            let (booking, offers) = harness.matched_with_offers(&providers, now);

            let mut winners = 0;
            for i in &order {
                let offer = &offers[*i];
                // Some claims arrive after the offer lapsed
                let at = if expired_mask & (1 << i) != 0 {
                    offer.expires_at + Duration::seconds(1)
                } else {
                    now
                };
                let actor = Actor::provider(offer.provider_id.clone());
                if harness
                    .core
                    .coordinator
                    .claim_at(booking.id, offer.id, &actor, at)
                    .await
                    .is_ok()
                {
                    winners += 1;
                }
            }

            let accepted = harness.store.count_accepted(booking.id).await.unwrap();
            assert!(accepted <= 1);
            assert_eq!(accepted, winners);
            let stored = harness.booking(booking.id).await;
            assert_eq!(stored.provider_id.is_some(), winners == 1);
        });
    }
}
