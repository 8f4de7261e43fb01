use super::dispatcher::{LinkObservation, ReconciliationDispatcher};
use super::finalizer::{Finalizer, best_effort};
use crate::domain::cart::CartSnapshot;
use crate::domain::payment::{
    LinkPaymentRecord, Outcome, PaymentKind, PaymentRecord, PollResponse,
};
use crate::domain::ports::{NotificationSinkRef, PaymentProcessorRef, UiEvent};
use crate::domain::processor::LinkRequest;
use crate::domain::progress::ProgressSnapshot;
use crate::error::{Result, translate};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkStart {
    pub payment_id: String,
    /// Checkout URL rendered as a QR code for the customer.
    pub url: String,
    pub progress: ProgressSnapshot,
}

/// Drives payment links from creation to completion, expiry or cancellation.
pub struct LinkCoordinator {
    processor: PaymentProcessorRef,
    dispatcher: Arc<ReconciliationDispatcher>,
    finalizer: Finalizer,
    notifier: NotificationSinkRef,
    timeout: Duration,
    currency: String,
}

impl LinkCoordinator {
    pub fn new(
        processor: PaymentProcessorRef,
        dispatcher: Arc<ReconciliationDispatcher>,
        finalizer: Finalizer,
        notifier: NotificationSinkRef,
        timeout: Duration,
        currency: String,
    ) -> Self {
        Self {
            processor,
            dispatcher,
            finalizer,
            notifier,
            timeout,
            currency,
        }
    }

    /// Creates the link. If creation fails nothing is tracked.
    pub async fn begin(&self) -> Result<LinkStart> {
        let cart = self.finalizer.cart().snapshot().await?;
        let amount = cart.chargeable_amount()?;

        let description = cart
            .items
            .iter()
            .map(|item| format!("{} x{}", item.name, item.quantity))
            .collect::<Vec<_>>()
            .join(", ");
        let link = self
            .processor
            .create_payment_link(&LinkRequest {
                amount,
                currency: self.currency.clone(),
                description,
                metadata: HashMap::from([(
                    "payment_type".to_string(),
                    PaymentKind::Link.to_string(),
                )]),
            })
            .await
            .map_err(translate)?;

        let started_at = Instant::now();
        self.finalizer
            .store()
            .add(PaymentRecord::Link(LinkPaymentRecord {
                payment_id: link.id.clone(),
                started_at,
            }))
            .await;
        info!(link_id = %link.id, amount, "Payment link created");

        Ok(LinkStart {
            payment_id: link.id,
            url: link.url,
            progress: ProgressSnapshot::compute(started_at, started_at, self.timeout),
        })
    }

    pub async fn poll(&self, link_id: &str) -> PollResponse {
        let Some(PaymentRecord::Link(record)) = self.finalizer.store().get(link_id).await else {
            return PollResponse::AlreadyConcluded;
        };

        let timed_out = Instant::now().saturating_duration_since(record.started_at) > self.timeout;
        let observation = self.dispatcher.observe_link(link_id).await;

        if timed_out {
            // A checkout completed just before the deadline still counts as paid.
            let outcome = match observation {
                Ok(LinkObservation::Completed) => Outcome::Succeeded,
                Ok(LinkObservation::Open) => Outcome::Expired,
                Err(e) => {
                    warn!(link_id = %link_id, error = %e, "Link status check failed at timeout");
                    Outcome::Expired
                }
            };
            return self.finish(link_id, outcome).await;
        }

        match observation {
            Ok(observation) => self.apply(&record, observation).await,
            Err(e) => {
                warn!(link_id = %link_id, error = %e, "Link status check failed, will retry");
                PollResponse::pending(self.progress(&record), true)
            }
        }
    }

    pub async fn on_webhook(&self, link_id: &str, observation: LinkObservation) -> PollResponse {
        match self.finalizer.store().get(link_id).await {
            Some(PaymentRecord::Link(record)) => self.apply(&record, observation).await,
            _ => PollResponse::AlreadyConcluded,
        }
    }

    pub async fn cancel(&self, link_id: &str) -> PollResponse {
        self.finish(link_id, Outcome::Cancelled).await
    }

    async fn apply(
        &self,
        record: &LinkPaymentRecord,
        observation: LinkObservation,
    ) -> PollResponse {
        match observation {
            LinkObservation::Completed => self.finish(&record.payment_id, Outcome::Succeeded).await,
            LinkObservation::Open => {
                let progress = self.progress(record);
                self.notifier.publish(UiEvent::Progress {
                    payment_id: record.payment_id.clone(),
                    progress,
                });
                PollResponse::pending(progress, false)
            }
        }
    }

    /// Claims the record, deactivates the link and writes the ledger entry.
    ///
    /// The link is deactivated after completion too, so it cannot be paid twice.
    /// The entry is written even when deactivation fails.
    async fn finish(&self, link_id: &str, outcome: Outcome) -> PollResponse {
        if !matches!(
            self.finalizer.store().get(link_id).await,
            Some(PaymentRecord::Link(_))
        ) {
            return PollResponse::AlreadyConcluded;
        }

        // Read before the claim clears it.
        let cart = match self.finalizer.cart().snapshot().await {
            Ok(cart) => cart,
            Err(e) => {
                warn!(link_id = %link_id, error = %e, "Could not read cart for ledger entry");
                CartSnapshot::default()
            }
        };

        if self.finalizer.claim(link_id, &outcome).await.is_none() {
            return PollResponse::AlreadyConcluded;
        }
        best_effort(
            "deactivate_payment_link",
            link_id,
            self.processor.deactivate_payment_link(link_id).await,
        );
        PollResponse::Concluded(
            self.finalizer
                .conclude(link_id, PaymentKind::Link, &cart, outcome)
                .await,
        )
    }

    fn progress(&self, record: &LinkPaymentRecord) -> ProgressSnapshot {
        ProgressSnapshot::compute(record.started_at, Instant::now(), self.timeout)
    }
}
