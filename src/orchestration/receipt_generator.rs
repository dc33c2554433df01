use crate::database::BookingStore;
use crate::error::{BookingError, BookingResult, ConflictReason};
use crate::models::Receipt;
use crate::state_machine::BookingState;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Produces the one immutable receipt of a completed booking
pub struct ReceiptGenerator {
    store: Arc<dyn BookingStore>,
}

impl ReceiptGenerator {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    pub async fn generate(&self, booking_id: Uuid) -> BookingResult<Receipt> {
        self.generate_at(booking_id, Utc::now()).await
    }

    /// Return the stored receipt, creating it on first call for a completed booking
    pub async fn generate_at(
        &self,
        booking_id: Uuid,
        now: DateTime<Utc>,
    ) -> BookingResult<Receipt> {
        if let Some(receipt) = self.store.get_receipt(booking_id).await? {
            return Ok(receipt);
        }

        let booking = self
            .store
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;

        if booking.status != BookingState::Completed {
            return Err(BookingError::conflict(
                ConflictReason::NotCompleted,
                format!("booking {booking_id} is {} and has no receipt", booking.status),
            ));
        }

        let receipt = Receipt::from_completed(&booking, now).ok_or_else(|| {
            BookingError::Internal(format!(
                "completed booking {booking_id} lacks provider or completion timestamps"
            ))
        })?;
        let stored = self.store.insert_receipt_if_absent(&receipt).await?;
        if stored == receipt {
            info!(booking_id = %booking_id, "Receipt issued");
        }
        Ok(stored)
    }
}
