//! # Booking Core
//!
//! Single bootstrap path for every entry point (HTTP server, tests). Builds the store,
//! the state machine with its post-commit actions, and the components that drive it,
//! then optionally runs the expiry sweep and refund reconciliation on timers.

use super::{
    AssignmentCoordinator, BookingService, CancellationPolicy, CancellationPolicyEngine,
    ExpirySweeper, PaymentReconciler, ReceiptGenerator, RefundProcessor,
};
use crate::config::{BookingConfig, ConfigManager, ConfigurationError, StoreBackend};
use crate::database::{BookingStore, InMemoryBookingStore, PgBookingStore};
use crate::error::BookingResult;
use crate::events::{EventPublisher, NotificationTemplates};
use crate::matching::{JobRequestDispatcher, ProviderRanker};
use crate::resilience::BackoffPolicy;
use crate::scheduling::SchedulingValidator;
use crate::services::{
    InMemoryPaymentGateway, InMemoryProviderDirectory, PaymentGateway, ProviderDirectory,
};
use crate::state_machine::{
    BookingStateMachine, GenerateReceiptAction, IssueRefundAction, PublishTransitionEventAction,
};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Every component of the booking core, wired to one store and one publisher
pub struct BookingCore {
    pub config: BookingConfig,
    pub store: Arc<dyn BookingStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub directory: Arc<dyn ProviderDirectory>,
    pub publisher: EventPublisher,
    pub state_machine: Arc<BookingStateMachine>,
    pub ranker: Arc<ProviderRanker>,
    pub dispatcher: Arc<JobRequestDispatcher>,
    pub coordinator: Arc<AssignmentCoordinator>,
    pub cancellations: Arc<CancellationPolicyEngine>,
    pub receipts: Arc<ReceiptGenerator>,
    pub refunds: Arc<RefundProcessor>,
    pub sweeper: Arc<ExpirySweeper>,
    pub reconciler: Arc<PaymentReconciler>,
    pub bookings: Arc<BookingService>,
    running: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
}

impl BookingCore {
    /// Wire every component around the given collaborators
    pub fn new(
        config: BookingConfig,
        store: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        directory: Arc<dyn ProviderDirectory>,
    ) -> BookingResult<Self> {
        config.validate()?;

        let publisher = EventPublisher::new(config.notifications.channel_capacity);
        let templates = Arc::new(NotificationTemplates::from_config(&config.notifications)?);
        let backoff = BackoffPolicy::from_config(&config.payment);

        let refunds = Arc::new(RefundProcessor::new(
            store.clone(),
            gateway.clone(),
            backoff,
            publisher.clone(),
        ));
        let receipts = Arc::new(ReceiptGenerator::new(store.clone()));

        let state_machine = Arc::new(
            BookingStateMachine::new(
                store.clone(),
                CancellationPolicy::from_config(&config.cancellation),
                config.matching.accept_window(),
            )
            .with_action(Arc::new(PublishTransitionEventAction::new(
                publisher.clone(),
                templates,
            )))
            .with_action(Arc::new(GenerateReceiptAction::new(receipts.clone())))
            .with_action(Arc::new(IssueRefundAction::new(refunds.clone()))),
        );

        let ranker = Arc::new(ProviderRanker::new(directory.clone()));
        let dispatcher = Arc::new(JobRequestDispatcher::new(
            store.clone(),
            directory.clone(),
            state_machine.clone(),
            publisher.clone(),
            config.matching.offer_window(),
            config.matching.fanout,
        ));
        let coordinator = Arc::new(AssignmentCoordinator::new(
            state_machine.clone(),
            store.clone(),
            publisher.clone(),
        ));
        let cancellations = Arc::new(CancellationPolicyEngine::new(state_machine.clone()));
        let sweeper = Arc::new(ExpirySweeper::new(
            store.clone(),
            state_machine.clone(),
            dispatcher.clone(),
            config.sweep.completion_grace(),
        ));
        let reconciler = Arc::new(PaymentReconciler::new(store.clone(), refunds.clone()));
        let bookings = Arc::new(BookingService::new(
            store.clone(),
            state_machine.clone(),
            ranker.clone(),
            dispatcher.clone(),
            gateway.clone(),
            SchedulingValidator::new(config.scheduling.clone()),
            backoff,
            config.matching.clone(),
        ));

        info!(
            fanout = config.matching.fanout,
            offer_window_seconds = config.matching.offer_window_seconds,
            "✅ CORE: Booking core initialized"
        );

        Ok(Self {
            config,
            store,
            gateway,
            directory,
            publisher,
            state_machine,
            ranker,
            dispatcher,
            coordinator,
            cancellations,
            receipts,
            refunds,
            sweeper,
            reconciler,
            bookings,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
        })
    }

    /// In-memory store and collaborators; used by tests and local runs
    pub fn in_memory(config: BookingConfig) -> BookingResult<Self> {
        Self::new(
            config,
            Arc::new(InMemoryBookingStore::new()),
            Arc::new(InMemoryPaymentGateway::new()),
            Arc::new(InMemoryProviderDirectory::new()),
        )
    }

    /// Build from loaded configuration, connecting to PostgreSQL when the backend asks for it.
    /// The payment gateway and provider directory are in-memory either way.
    pub async fn from_config(config_manager: Arc<ConfigManager>) -> BookingResult<Self> {
        let config = config_manager.config().clone();
        info!(
            environment = config_manager.environment(),
            backend = ?config.database.backend,
            "🔧 CORE: Initializing booking core from configuration"
        );

        let store: Arc<dyn BookingStore> = match config.database.backend {
            StoreBackend::Memory => Arc::new(InMemoryBookingStore::new()),
            StoreBackend::Postgres => {
                let url = config.database.url.clone().ok_or_else(|| {
                    ConfigurationError::missing_required_field("database.url", "postgres backend")
                })?;
                let store = PgBookingStore::connect(&url, config.database.max_connections).await?;
                info!("📊 CORE: PostgreSQL booking store connected");
                Arc::new(store)
            }
        };

        Self::new(
            config,
            store,
            Arc::new(InMemoryPaymentGateway::new()),
            Arc::new(InMemoryProviderDirectory::new()),
        )
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the sweep and reconciliation timers. Calling it twice is a no-op.
    pub fn start_background_loops(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let interval = self.config.sweep.interval();

        let sweeper = self.sweeper.clone();
        let running = self.running.clone();
        let shutdown_notify = self.shutdown_notify.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            while running.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = sweeper.sweep_once(Utc::now()).await {
                            error!("Expiry sweep failed: {}", e);
                        }
                    }
                    _ = shutdown_notify.notified() => break,
                }
            }
            info!("Expiry sweep loop shutting down");
        });

        let reconciler = self.reconciler.clone();
        let running = self.running.clone();
        let shutdown_notify = self.shutdown_notify.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            while running.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = reconciler.run_once(Utc::now()).await {
                            error!("Refund reconciliation failed: {}", e);
                        }
                    }
                    _ = shutdown_notify.notified() => break,
                }
            }
            info!("Refund reconciliation loop shutting down");
        });

        info!(
            interval_ms = interval.as_millis() as u64,
            "🔄 CORE: Background loops started"
        );
    }

    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.shutdown_notify.notify_waiters();
            info!("🛑 CORE: Shutdown requested");
        }
    }

    /// Time the loops wait between passes
    pub fn sweep_interval(&self) -> Duration {
        self.config.sweep.interval()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_core_starts_and_stops() {
        let mut config = BookingConfig::default();
        config.sweep.interval_seconds = 1;
        let core = BookingCore::in_memory(config).unwrap();

        assert!(!core.is_running());
        core.start_background_loops();
        core.start_background_loops();
        assert!(core.is_running());

        core.shutdown();
        assert!(!core.is_running());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = BookingConfig::default();
        config.matching.fanout = 0;

        let err = BookingCore::in_memory(config).err().unwrap();
        assert_eq!(err.reason_code(), "configuration_error");
    }

    #[tokio::test]
    async fn test_from_config_defaults_to_memory_store() {
        let manager = ConfigManager::from_config(BookingConfig::default()).unwrap();
        let core = BookingCore::from_config(manager).await.unwrap();
        assert_eq!(core.config.database.backend, StoreBackend::Memory);
    }
}
