use super::event_logger::EventLogger;
use super::state_store::PaymentStateStore;
use crate::domain::cart::CartSnapshot;
use crate::domain::ledger::LedgerEntry;
use crate::domain::payment::{Outcome, PaymentKind, PaymentOutcome, PaymentRecord};
use crate::domain::ports::{CartServiceRef, NotificationSinkRef, UiEvent};
use crate::domain::processor::{ProcessorError, ProcessorResult};
use tracing::{info, warn};

/// Result of a best-effort remote call. The error is logged, never propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCleanup {
    Done,
    /// The processor refused because there was nothing left to act on.
    NotAllowed,
    Failed(String),
}

pub fn best_effort(
    action: &'static str,
    payment_id: &str,
    result: ProcessorResult<()>,
) -> RemoteCleanup {
    match result {
        Ok(()) => RemoteCleanup::Done,
        Err(ProcessorError::ActionNotAllowed(msg)) => {
            info!(payment_id = %payment_id, action, reason = %msg, "Remote cleanup not needed");
            RemoteCleanup::NotAllowed
        }
        Err(e) => {
            warn!(payment_id = %payment_id, action, error = %e, "Remote cleanup failed");
            RemoteCleanup::Failed(e.to_string())
        }
    }
}

/// The only path from an in-flight record to a terminal outcome.
///
/// Finalization is split in two: `claim` atomically removes the record (and
/// clears the cart when the outcome calls for it); only the caller holding the
/// claimed record may then `conclude`, which writes the ledger and notifies the
/// UI. Racing sources therefore produce exactly one ledger entry.
#[derive(Clone)]
pub struct Finalizer {
    store: PaymentStateStore,
    cart: CartServiceRef,
    logger: EventLogger,
    notifier: NotificationSinkRef,
}

impl Finalizer {
    /// Creates a finalizer over the shared state store.
    ///
    /// # Arguments
    ///
    /// * `store` - The store records are claimed from.
    /// * `cart` - Cleared when a claimed outcome calls for it.
    /// * `logger` - Writes the single ledger entry per payment.
    /// * `notifier` - Receives the outcome for the operator UI.
    pub fn new(
        store: PaymentStateStore,
        cart: CartServiceRef,
        logger: EventLogger,
        notifier: NotificationSinkRef,
    ) -> Self {
        Self {
            store,
            cart,
            logger,
            notifier,
        }
    }

    pub fn store(&self) -> &PaymentStateStore {
        &self.store
    }

    pub fn cart(&self) -> &CartServiceRef {
        &self.cart
    }

    pub async fn claim(&self, payment_id: &str, outcome: &Outcome) -> Option<PaymentRecord> {
        if outcome.clears_cart() {
            self.store.remove_and_clear_cart(payment_id, &self.cart).await
        } else {
            self.store.remove(payment_id).await
        }
    }

    /// Writes the ledger entry and publishes the outcome for a claimed payment.
    pub async fn conclude(
        &self,
        payment_id: &str,
        kind: PaymentKind,
        cart: &CartSnapshot,
        outcome: Outcome,
    ) -> PaymentOutcome {
        self.logger
            .record(LedgerEntry::new(payment_id, kind, cart, &outcome))
            .await;

        let result = PaymentOutcome::new(payment_id, kind, outcome);
        info!(
            payment_id = %payment_id,
            kind = %kind,
            outcome = result.outcome.label(),
            "Payment concluded"
        );
        self.notifier.publish(UiEvent::Outcome(result.clone()));
        result
    }

    /// Records a payment that never had an in-flight record, such as a keyed-in card.
    pub async fn conclude_untracked(
        &self,
        payment_id: &str,
        kind: PaymentKind,
        cart: &CartSnapshot,
        outcome: Outcome,
    ) -> PaymentOutcome {
        if outcome.clears_cart()
            && let Err(e) = self.cart.clear().await
        {
            warn!(payment_id = %payment_id, error = %e, "Failed to clear cart after payment");
        }
        self.conclude(payment_id, kind, cart, outcome).await
    }
}
