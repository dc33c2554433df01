//! Deterministic candidate ranking.
//!
//! Order: distance ascending, rating descending, last acceptance ascending (providers who
//! never accepted come first), then id ascending so equal candidates never swap.

use super::geo::distance_km;
use crate::error::{BookingError, BookingResult};
use crate::models::{Location, ProviderCandidate};
use crate::services::ProviderDirectory;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, instrument};

pub struct ProviderRanker {
    directory: Arc<dyn ProviderDirectory>,
}

impl ProviderRanker {
    pub fn new(directory: Arc<dyn ProviderDirectory>) -> Self {
        Self { directory }
    }

    /// Ranked candidates for a service near `location`. Empty means nobody qualifies.
    #[instrument(skip(self), fields(service_id = %service_id))]
    pub async fn rank(
        &self,
        service_id: &str,
        location: Location,
        max_distance_km: f64,
    ) -> BookingResult<Vec<ProviderCandidate>> {
        if !location.is_valid() {
            return Err(BookingError::validation(format!(
                "invalid location ({}, {})",
                location.latitude, location.longitude
            )));
        }
        if !(max_distance_km.is_finite() && max_distance_km >= 0.0) {
            return Err(BookingError::validation(format!(
                "max distance must be a non-negative number, got {max_distance_km}"
            )));
        }

        let profiles = self.directory.providers_for_service(service_id).await?;
        let candidates = profiles
            .iter()
            .map(|p| ProviderCandidate::from_profile(p, distance_km(location, p.location)));
        let ranked = rank_candidates(candidates, service_id, max_distance_km);

        debug!(
            considered = profiles.len(),
            ranked = ranked.len(),
            "Ranked provider candidates"
        );
        Ok(ranked)
    }
}

/// Filter and order candidates whose distances are already known
pub fn rank_candidates(
    candidates: impl IntoIterator<Item = ProviderCandidate>,
    service_id: &str,
    max_distance_km: f64,
) -> Vec<ProviderCandidate> {
    let mut ranked: Vec<ProviderCandidate> = candidates
        .into_iter()
        .filter(|c| {
            c.serves(service_id)
                && c.available
                && c.distance_km.is_finite()
                && c.distance_km <= max_distance_km
        })
        .collect();
    ranked.sort_by(compare_candidates);
    ranked
}

pub fn compare_candidates(a: &ProviderCandidate, b: &ProviderCandidate) -> Ordering {
    a.distance_km
        .total_cmp(&b.distance_km)
        .then_with(|| b.rating.total_cmp(&a.rating))
        .then_with(|| a.last_accept_time.cmp(&b.last_accept_time))
        .then_with(|| a.id.cmp(&b.id))
}
