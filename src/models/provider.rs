use super::booking::Location;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Period during which a provider cannot take work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackoutWindow {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl BlackoutWindow {
    pub fn new(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Self {
        Self { starts_at, ends_at }
    }

    /// Half-open containment: `[starts_at, ends_at)`
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.starts_at <= at && at < self.ends_at
    }
}

/// Provider record as held by the provider directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub id: String,
    pub location: Location,
    pub rating: f64,
    pub last_accept_time: Option<DateTime<Utc>>,
    pub available: bool,
    pub services: BTreeSet<String>,
    #[serde(default)]
    pub blackout_windows: Vec<BlackoutWindow>,
}

impl ProviderProfile {
    pub fn serves(&self, service_id: &str) -> bool {
        self.services.contains(service_id)
    }
}

/// Read-only projection of a provider relative to one booking location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCandidate {
    pub id: String,
    pub distance_km: f64,
    pub rating: f64,
    /// `None` means the provider has never accepted a job
    pub last_accept_time: Option<DateTime<Utc>>,
    pub available: bool,
    pub services: BTreeSet<String>,
}

impl ProviderCandidate {
    pub fn serves(&self, service_id: &str) -> bool {
        self.services.contains(service_id)
    }

    pub fn from_profile(profile: &ProviderProfile, distance_km: f64) -> Self {
        Self {
            id: profile.id.clone(),
            distance_km,
            rating: profile.rating,
            last_accept_time: profile.last_accept_time,
            available: profile.available,
            services: profile.services.clone(),
        }
    }
}
