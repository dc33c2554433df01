use super::booking::Booking;
use super::provider::ProviderCandidate;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRequestStatus {
    /// Offer is live and waiting for the provider
    Sent,
    Accepted,
    Declined,
    Expired,
    /// A sibling offer was accepted first, or the booking left matching
    Superseded,
}

impl JobRequestStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

impl fmt::Display for JobRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::Accepted => write!(f, "accepted"),
            Self::Declined => write!(f, "declined"),
            Self::Expired => write!(f, "expired"),
            Self::Superseded => write!(f, "superseded"),
        }
    }
}

impl std::str::FromStr for JobRequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "accepted" => Ok(Self::Accepted),
            "declined" => Ok(Self::Declined),
            "expired" => Ok(Self::Expired),
            "superseded" => Ok(Self::Superseded),
            _ => Err(format!("Invalid job request status: {s}")),
        }
    }
}

/// A time-boxed offer of one booking to one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub provider_id: String,
    /// 1-based index of the dispatch wave this offer belongs to
    pub wave: i32,
    pub sent_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: JobRequestStatus,
    pub responded_at: Option<DateTime<Utc>>,
    pub distance_km: f64,
    pub quoted_price: Decimal,
}

impl JobRequest {
    pub fn offer(
        booking: &Booking,
        candidate: &ProviderCandidate,
        wave: i32,
        now: DateTime<Utc>,
        offer_window: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            provider_id: candidate.id.clone(),
            wave,
            sent_at: now,
            expires_at: now + offer_window,
            status: JobRequestStatus::Sent,
            responded_at: None,
            distance_km: candidate.distance_km,
            quoted_price: booking.total_amount,
        }
    }

    /// Live means still `sent` and not past its expiry
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status.is_open() && now < self.expires_at
    }
}
