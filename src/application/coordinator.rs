use super::dispatcher::{ReconciliationDispatcher, Signal};
use super::event_logger::EventLogger;
use super::finalizer::Finalizer;
use super::link::{LinkCoordinator, LinkStart};
use super::manual::ManualCardCoordinator;
use super::state_store::{ExpiredPaymentSweep, PaymentStateStore};
use super::sweeper::{PeriodicSweep, Sweep, SweepHandle};
use super::terminal::{TerminalCoordinator, TerminalSettings, TerminalStart};
use super::webhook_cache::WebhookEventCache;
use crate::config::{CoordinatorConfig, ReconciliationStrategy};
use crate::domain::payment::{PaymentOutcome, PollResponse};
use crate::domain::ports::{
    CartServiceRef, NotificationSinkRef, PaymentProcessorRef, TransactionLedgerRef,
    WebhookVerifierRef,
};
use crate::domain::processor::Reader;
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// External systems the coordinator talks to.
pub struct Collaborators {
    pub processor: PaymentProcessorRef,
    pub verifier: WebhookVerifierRef,
    pub cart: CartServiceRef,
    pub ledger: TransactionLedgerRef,
    pub notifier: NotificationSinkRef,
}

/// Entry point for the operator UI and the webhook endpoint.
///
/// All channels share one state store and one finalizer, so a payment is
/// concluded exactly once no matter which path observes the outcome.
pub struct PaymentCoordinator {
    config: CoordinatorConfig,
    processor: PaymentProcessorRef,
    store: PaymentStateStore,
    dispatcher: Arc<ReconciliationDispatcher>,
    terminal: TerminalCoordinator,
    link: LinkCoordinator,
    manual: ManualCardCoordinator,
    sweeps: Mutex<Vec<SweepHandle>>,
}

impl PaymentCoordinator {
    /// Creates a coordinator with an empty state store and webhook cache.
    ///
    /// Nothing runs until [`start`](Self::start) is called.
    ///
    /// # Arguments
    ///
    /// * `config` - Timeouts, reconciliation strategy, currency and tipping policy.
    /// * `collaborators` - The processor, verifier, cart, ledger and notification sink.
    pub fn new(config: CoordinatorConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            processor,
            verifier,
            cart,
            ledger,
            notifier,
        } = collaborators;

        let store = PaymentStateStore::new();
        let cache = WebhookEventCache::new(config.payment_timeout);
        let dispatcher = Arc::new(ReconciliationDispatcher::new(
            config.strategy,
            processor.clone(),
            verifier,
            cache,
        ));
        let finalizer = Finalizer::new(
            store.clone(),
            cart,
            EventLogger::new(ledger),
            notifier.clone(),
        );

        let terminal = TerminalCoordinator::new(
            processor.clone(),
            dispatcher.clone(),
            finalizer.clone(),
            notifier.clone(),
            TerminalSettings {
                timeout: config.payment_timeout,
                currency: config.currency.clone(),
                location: config.location.clone(),
                tipping: config.tipping.clone(),
            },
        );
        let link = LinkCoordinator::new(
            processor.clone(),
            dispatcher.clone(),
            finalizer.clone(),
            notifier,
            config.payment_timeout,
            config.currency.clone(),
        );
        let manual =
            ManualCardCoordinator::new(processor.clone(), finalizer, config.currency.clone());

        Self {
            config,
            processor,
            store,
            dispatcher,
            terminal,
            link,
            manual,
            sweeps: Mutex::new(Vec::new()),
        }
    }

    /// Loads readers, registers the webhook endpoint and starts the sweeps.
    ///
    /// Neither remote step is fatal: an empty reader list only blocks terminal
    /// payments, and a failed registration degrades to polling.
    pub async fn start(&self) -> ReconciliationStrategy {
        if let Err(e) = self.terminal.refresh_readers().await {
            warn!(error = %e, "Could not load online readers at startup");
        }

        let strategy = self
            .dispatcher
            .initialize(self.config.webhook_url.as_deref())
            .await;

        let mut sweeps = self.sweeps.lock().await;
        if sweeps.is_empty() {
            let targets: [Arc<dyn Sweep>; 2] = [
                Arc::new(ExpiredPaymentSweep::new(
                    self.store.clone(),
                    self.processor.clone(),
                )),
                Arc::new(self.dispatcher.cache().clone()),
            ];
            for target in targets {
                sweeps.push(PeriodicSweep::spawn(
                    target,
                    self.config.sweep_interval,
                    self.config.payment_timeout,
                ));
            }
        }
        info!(strategy = ?strategy, "Payment coordinator started");
        strategy
    }

    /// Stops the sweeps and drops every in-flight record.
    pub async fn shutdown(&self) {
        let handles: Vec<SweepHandle> = self.sweeps.lock().await.drain(..).collect();
        for handle in handles {
            handle.stop().await;
        }
        let abandoned = self.store.len().await;
        if abandoned > 0 {
            warn!(abandoned, "Shutting down with payments still in flight");
        }
        self.store.clear().await;
        info!("Payment coordinator stopped");
    }

    pub async fn refresh_readers(&self) -> Result<Vec<Reader>> {
        self.terminal.refresh_readers().await
    }

    pub async fn begin_terminal_payment(
        &self,
        reader_id: &str,
        customer_contact: Option<String>,
    ) -> Result<TerminalStart> {
        self.terminal.begin(reader_id, customer_contact).await
    }

    pub async fn poll_terminal(&self, payment_id: &str) -> PollResponse {
        self.terminal.poll(payment_id).await
    }

    pub async fn cancel_terminal(&self, payment_id: &str) -> PollResponse {
        self.terminal.cancel(payment_id).await
    }

    pub async fn begin_link_payment(&self) -> Result<LinkStart> {
        self.link.begin().await
    }

    pub async fn poll_link(&self, link_id: &str) -> PollResponse {
        self.link.poll(link_id).await
    }

    pub async fn cancel_link(&self, link_id: &str) -> PollResponse {
        self.link.cancel(link_id).await
    }

    pub async fn charge_manual(
        &self,
        payment_method: &str,
        customer_contact: Option<String>,
    ) -> Result<PaymentOutcome> {
        self.manual.charge(payment_method, customer_contact).await
    }

    /// Verifies and applies an inbound webhook delivery.
    ///
    /// Returns `None` for verified events that concern no tracked channel.
    /// Deliveries for payments that already concluded yield `AlreadyConcluded`.
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<Option<PollResponse>> {
        let response = match self.dispatcher.ingest(payload, signature).await? {
            None => None,
            Some(Signal::Intent {
                payment_id,
                observation,
            }) => Some(self.terminal.on_webhook(&payment_id, &observation).await),
            Some(Signal::Link {
                payment_id,
                observation,
            }) => Some(self.link.on_webhook(&payment_id, observation).await),
        };
        Ok(response)
    }

    pub fn effective_strategy(&self) -> ReconciliationStrategy {
        self.dispatcher.effective_strategy()
    }

    pub fn store(&self) -> &PaymentStateStore {
        &self.store
    }

    pub fn webhook_cache(&self) -> &WebhookEventCache {
        self.dispatcher.cache()
    }
}
