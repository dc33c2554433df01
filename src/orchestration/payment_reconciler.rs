use super::refunds::{RefundAttempt, RefundProcessor};
use crate::database::BookingStore;
use crate::error::BookingResult;
use crate::logging::log_error;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub settled: usize,
    pub retrying: usize,
    pub escalated: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Retries refunds whose first gateway call did not go through
pub struct PaymentReconciler {
    store: Arc<dyn BookingStore>,
    refunds: Arc<RefundProcessor>,
}

impl PaymentReconciler {
    pub fn new(store: Arc<dyn BookingStore>, refunds: Arc<RefundProcessor>) -> Self {
        Self { store, refunds }
    }

    #[instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> BookingResult<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for booking in self.store.find_refunds_due(now).await? {
            match self.refunds.issue_at(booking.id, now).await {
                Ok(RefundAttempt::Settled { .. }) => report.settled += 1,
                Ok(RefundAttempt::Retrying { .. }) => report.retrying += 1,
                Ok(RefundAttempt::Escalated { .. }) => report.escalated += 1,
                Ok(RefundAttempt::NotDue) => report.skipped += 1,
                Err(e) if e.is_conflict() => report.skipped += 1,
                Err(e) => {
                    log_error("payment_reconciler", "issue_refund", &e, Some(booking.id));
                    report.errors += 1;
                }
            }
        }

        if report != ReconcileReport::default() {
            info!(
                settled = report.settled,
                retrying = report.retrying,
                escalated = report.escalated,
                errors = report.errors,
                "Refund reconciliation finished"
            );
        }
        Ok(report)
    }
}
