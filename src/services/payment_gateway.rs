//! Payment gateway boundary: capture on booking creation, refund on cancellation.
//!
//! Gateway calls are always made after the booking's conditional write has committed,
//! never inside it.

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("Payment declined: {0}")]
    Declined(String),

    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown payment reference {0}")]
    UnknownPayment(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Capture `amount` from the customer, returning the payment reference
    async fn capture(&self, amount: Decimal, customer_ref: &str) -> Result<String, PaymentError>;

    /// Refund against a captured payment. Idempotent per payment reference on the
    /// gateway side: repeating the call returns the original refund id.
    async fn refund(
        &self,
        payment_ref: &str,
        amount: Decimal,
        reason: &str,
    ) -> Result<String, PaymentError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPayment {
    pub customer_ref: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedRefund {
    pub refund_id: String,
    pub amount: Decimal,
    pub reason: String,
}

/// In-process gateway with scriptable failures
#[derive(Debug, Default)]
pub struct InMemoryPaymentGateway {
    captures: DashMap<String, CapturedPayment>,
    refunds: DashMap<String, IssuedRefund>,
    capture_failures: AtomicU32,
    refund_failures: AtomicU32,
    refund_calls: AtomicU32,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` capture calls fail as unavailable
    pub fn fail_next_captures(&self, n: u32) {
        self.capture_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` refund calls fail as unavailable
    pub fn fail_next_refunds(&self, n: u32) {
        self.refund_failures.store(n, Ordering::SeqCst);
    }

    pub fn refund_for(&self, payment_ref: &str) -> Option<IssuedRefund> {
        self.refunds.get(payment_ref).map(|r| r.value().clone())
    }

    pub fn refund_count(&self) -> usize {
        self.refunds.len()
    }

    /// Every refund call that reached the gateway, successful or not
    pub fn refund_calls(&self) -> u32 {
        self.refund_calls.load(Ordering::SeqCst)
    }

    pub fn capture_count(&self) -> usize {
        self.captures.len()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn capture(&self, amount: Decimal, customer_ref: &str) -> Result<String, PaymentError> {
        if Self::take_failure(&self.capture_failures) {
            return Err(PaymentError::Unavailable("scripted capture failure".to_string()));
        }
        if amount.is_sign_negative() {
            return Err(PaymentError::Declined(format!("invalid amount {amount}")));
        }

        let reference = format!("pay_{}", Uuid::new_v4().simple());
        self.captures.insert(
            reference.clone(),
            CapturedPayment {
                customer_ref: customer_ref.to_string(),
                amount,
            },
        );
        Ok(reference)
    }

    async fn refund(
        &self,
        payment_ref: &str,
        amount: Decimal,
        reason: &str,
    ) -> Result<String, PaymentError> {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.refund_failures) {
            return Err(PaymentError::Unavailable("scripted refund failure".to_string()));
        }

        let captured = self
            .captures
            .get(payment_ref)
            .ok_or_else(|| PaymentError::UnknownPayment(payment_ref.to_string()))?;
        if amount > captured.amount {
            return Err(PaymentError::Declined(format!(
                "refund {amount} exceeds captured {}",
                captured.amount
            )));
        }
        drop(captured);

        let refund = self
            .refunds
            .entry(payment_ref.to_string())
            .or_insert_with(|| IssuedRefund {
                refund_id: format!("re_{}", Uuid::new_v4().simple()),
                amount,
                reason: reason.to_string(),
            });
        Ok(refund.refund_id.clone())
    }
}
