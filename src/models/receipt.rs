use super::booking::Booking;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable completion record, one per booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub booking_id: Uuid,
    pub customer_id: String,
    pub provider_id: String,
    pub service_id: String,
    pub total_amount: Decimal,
    pub payment_reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub rating: Option<u8>,
    pub issued_at: DateTime<Utc>,
}

impl Receipt {
    /// Snapshot a completed booking; `None` if it never reached `completed` with a provider
    pub fn from_completed(booking: &Booking, issued_at: DateTime<Utc>) -> Option<Self> {
        Some(Self {
            booking_id: booking.id,
            customer_id: booking.customer_id.clone(),
            provider_id: booking.provider_id.clone()?,
            service_id: booking.service_id.clone(),
            total_amount: booking.total_amount,
            payment_reference_id: booking.payment_reference_id.clone(),
            created_at: booking.created_at,
            accepted_at: booking.accepted_at?,
            completed_at: booking.completed_at?,
            rating: booking.rating,
            issued_at,
        })
    }
}
