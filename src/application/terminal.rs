use super::dispatcher::{IntentObservation, ReconciliationDispatcher};
use super::finalizer::{Finalizer, best_effort};
use crate::domain::cart::CartSnapshot;
use crate::domain::payment::{
    Outcome, PaymentKind, PaymentOutcome, PaymentRecord, PollResponse, TerminalPaymentRecord,
};
use crate::domain::ports::{NotificationSinkRef, PaymentProcessorRef, UiEvent};
use crate::domain::processor::{
    IntentChannel, IntentRequest, IntentStatus, ProcessorError, Reader, ReaderActionStatus,
};
use crate::domain::progress::ProgressSnapshot;
use crate::domain::tipping::TippingPolicy;
use crate::error::{Result, ValidationError, translate};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{info, warn};

/// Initial result of asking a reader to collect payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderRequestState {
    Succeeded,
    Failed,
    InProgress,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerminalStart {
    pub payment_id: String,
    pub reader_id: String,
    pub state: ReaderRequestState,
    pub tipping_offered: bool,
    /// Set when the reader reported a final result right away.
    pub outcome: Option<PaymentOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Transition {
    Pending,
    Succeeded,
    Failed(String),
}

/// "Awaiting payment method" and "declined" share a status string; only the
/// presence of a last error tells them apart.
fn classify(observation: Option<&IntentObservation>) -> Transition {
    let Some(observation) = observation else {
        return Transition::Pending;
    };
    match (&observation.status, &observation.error) {
        (IntentStatus::Succeeded, _) => Transition::Succeeded,
        (IntentStatus::Canceled, _) => {
            Transition::Failed("the payment was canceled at the processor".to_string())
        }
        (IntentStatus::RequiresPaymentMethod, Some(error)) => Transition::Failed(error.clone()),
        _ => Transition::Pending,
    }
}

pub struct TerminalSettings {
    pub timeout: Duration,
    pub currency: String,
    pub location: Option<String>,
    pub tipping: TippingPolicy,
}

/// Drives card-present payments from the reader request to a terminal outcome.
pub struct TerminalCoordinator {
    processor: PaymentProcessorRef,
    dispatcher: Arc<ReconciliationDispatcher>,
    finalizer: Finalizer,
    notifier: NotificationSinkRef,
    readers: RwLock<HashMap<String, Reader>>,
    settings: TerminalSettings,
}

impl TerminalCoordinator {
    pub fn new(
        processor: PaymentProcessorRef,
        dispatcher: Arc<ReconciliationDispatcher>,
        finalizer: Finalizer,
        notifier: NotificationSinkRef,
        settings: TerminalSettings,
    ) -> Self {
        Self {
            processor,
            dispatcher,
            finalizer,
            notifier,
            readers: RwLock::new(HashMap::new()),
            settings,
        }
    }

    /// Reloads the set of online readers from the processor.
    pub async fn refresh_readers(&self) -> Result<Vec<Reader>> {
        let online = self
            .processor
            .list_online_readers()
            .await
            .map_err(translate)?;
        let mut readers = self.readers.write().await;
        *readers = online.iter().map(|r| (r.id.clone(), r.clone())).collect();
        info!(count = readers.len(), "Refreshed online readers");
        Ok(online)
    }

    /// Requests a reader action for the current cart.
    ///
    /// Validation happens against cached state only, so a rejected request
    /// never reaches the processor and never creates a record. A card declined
    /// while the action is requested is a definitive outcome and is logged.
    ///
    /// # Arguments
    ///
    /// * `reader_id` - An online reader from the last `refresh_readers` call.
    /// * `customer_contact` - Optional receipt email, also stored as intent metadata.
    pub async fn begin(
        &self,
        reader_id: &str,
        customer_contact: Option<String>,
    ) -> Result<TerminalStart> {
        if reader_id.is_empty() {
            let reason = "no reader selected".to_string();
            return Err(ValidationError::NoReaderAvailable(reason).into());
        }
        if !self.readers.read().await.contains_key(reader_id) {
            let reason = format!("{reader_id} is not online");
            return Err(ValidationError::NoReaderAvailable(reason).into());
        }

        let cart = self.finalizer.cart().snapshot().await?;
        let amount = cart.chargeable_amount()?;

        let tipping_offered = self.settings.tipping.is_eligible(
            cart.summary.total,
            &cart,
            self.settings.location.as_deref(),
        );

        let mut metadata = HashMap::from([
            ("payment_type".to_string(), PaymentKind::Terminal.to_string()),
            ("reader_id".to_string(), reader_id.to_string()),
        ]);
        if let Some(contact) = &customer_contact {
            metadata.insert("customer_contact".to_string(), contact.clone());
        }
        let intent = self
            .processor
            .create_payment_intent(&IntentRequest {
                amount,
                currency: self.settings.currency.clone(),
                channel: IntentChannel::CardPresent,
                payment_method: None,
                confirm: false,
                receipt_email: customer_contact.clone(),
                metadata,
            })
            .await
            .map_err(translate)?;

        let action = match self
            .processor
            .process_payment_on_reader(reader_id, &intent.id, !tipping_offered)
            .await
        {
            Ok(action) => action,
            Err(e) => {
                best_effort(
                    "cancel_payment_intent",
                    &intent.id,
                    self.processor.cancel_payment_intent(&intent.id).await,
                );
                let (code, message) = match e {
                    ProcessorError::Declined { code, message } => (code, message),
                    other => return Err(translate(other)),
                };
                info!(
                    payment_id = %intent.id,
                    decline_code = ?code,
                    "Card declined on the reader"
                );
                let outcome = self
                    .finalizer
                    .conclude_untracked(
                        &intent.id,
                        PaymentKind::Terminal,
                        &cart,
                        Outcome::Failed { reason: message },
                    )
                    .await;
                return Ok(TerminalStart {
                    payment_id: intent.id,
                    reader_id: reader_id.to_string(),
                    state: ReaderRequestState::Failed,
                    tipping_offered,
                    outcome: Some(outcome),
                });
            }
        };

        let record = TerminalPaymentRecord {
            payment_id: intent.id.clone(),
            reader_id: reader_id.to_string(),
            started_at: Instant::now(),
            customer_contact,
            summary: cart.summary,
            cart,
        };
        self.finalizer
            .store()
            .add(PaymentRecord::Terminal(record))
            .await;
        info!(
            payment_id = %intent.id,
            reader_id = %reader_id,
            amount,
            tipping_offered,
            "Reader action requested"
        );

        let (state, outcome) = match action.status {
            ReaderActionStatus::Succeeded => (
                ReaderRequestState::Succeeded,
                self.finish(&intent.id, Outcome::Succeeded).await.into_outcome(),
            ),
            ReaderActionStatus::Failed => {
                let reason = action
                    .failure_message
                    .unwrap_or_else(|| "the reader declined the payment".to_string());
                (
                    ReaderRequestState::Failed,
                    self.finish(&intent.id, Outcome::Failed { reason })
                        .await
                        .into_outcome(),
                )
            }
            ReaderActionStatus::InProgress => (ReaderRequestState::InProgress, None),
            ReaderActionStatus::Unknown(status) => {
                warn!(
                    payment_id = %intent.id,
                    status = %status,
                    "Reader returned an unrecognized action status"
                );
                (ReaderRequestState::Unknown, None)
            }
        };

        Ok(TerminalStart {
            payment_id: intent.id,
            reader_id: reader_id.to_string(),
            state,
            tipping_offered,
            outcome,
        })
    }

    /// One client-driven tick for an in-flight terminal payment.
    pub async fn poll(&self, payment_id: &str) -> PollResponse {
        let Some(PaymentRecord::Terminal(record)) = self.finalizer.store().get(payment_id).await
        else {
            return PollResponse::AlreadyConcluded;
        };

        let timed_out =
            Instant::now().saturating_duration_since(record.started_at) > self.settings.timeout;
        let observation = self.dispatcher.observe_intent(payment_id).await;

        if timed_out {
            // The processor's answer still wins over the clock: a late tap was captured.
            let transition = match &observation {
                Ok(observation) => classify(observation.as_ref()),
                Err(e) => {
                    warn!(payment_id = %payment_id, error = %e, "Status check failed at timeout");
                    Transition::Pending
                }
            };
            return match transition {
                Transition::Succeeded => self.finish(payment_id, Outcome::Succeeded).await,
                Transition::Failed(reason) => {
                    self.finish(payment_id, Outcome::Failed { reason }).await
                }
                Transition::Pending => self.expire(&record).await,
            };
        }

        match observation {
            Ok(observation) => self.apply(&record, observation.as_ref()).await,
            Err(e) => {
                warn!(payment_id = %payment_id, error = %e, "Status check failed, will retry");
                PollResponse::pending(self.progress(&record), true)
            }
        }
    }

    /// Applies a webhook-delivered status to a tracked payment.
    pub async fn on_webhook(
        &self,
        payment_id: &str,
        observation: &IntentObservation,
    ) -> PollResponse {
        match self.finalizer.store().get(payment_id).await {
            Some(PaymentRecord::Terminal(record)) => self.apply(&record, Some(observation)).await,
            _ => PollResponse::AlreadyConcluded,
        }
    }

    /// Operator-initiated cancellation. Concurrent callers see exactly one conclusion.
    pub async fn cancel(&self, payment_id: &str) -> PollResponse {
        let Some(record) = self.claim(payment_id, &Outcome::Cancelled).await else {
            return PollResponse::AlreadyConcluded;
        };
        self.cancel_remote(&record).await;
        PollResponse::Concluded(self.conclude(&record, Outcome::Cancelled).await)
    }

    async fn apply(
        &self,
        record: &TerminalPaymentRecord,
        observation: Option<&IntentObservation>,
    ) -> PollResponse {
        match classify(observation) {
            Transition::Pending => {
                let progress = self.progress(record);
                self.notifier.publish(UiEvent::Progress {
                    payment_id: record.payment_id.clone(),
                    progress,
                });
                PollResponse::pending(progress, false)
            }
            Transition::Succeeded => self.finish(&record.payment_id, Outcome::Succeeded).await,
            Transition::Failed(reason) => {
                self.finish(&record.payment_id, Outcome::Failed { reason })
                    .await
            }
        }
    }

    async fn expire(&self, record: &TerminalPaymentRecord) -> PollResponse {
        let Some(record) = self.claim(&record.payment_id, &Outcome::Expired).await else {
            return PollResponse::AlreadyConcluded;
        };
        info!(payment_id = %record.payment_id, "Terminal payment timed out");
        self.cancel_remote(&record).await;
        PollResponse::Concluded(self.conclude(&record, Outcome::Expired).await)
    }

    async fn finish(&self, payment_id: &str, outcome: Outcome) -> PollResponse {
        match self.claim(payment_id, &outcome).await {
            Some(record) => PollResponse::Concluded(self.conclude(&record, outcome).await),
            None => PollResponse::AlreadyConcluded,
        }
    }

    async fn claim(&self, payment_id: &str, outcome: &Outcome) -> Option<TerminalPaymentRecord> {
        if !matches!(
            self.finalizer.store().get(payment_id).await,
            Some(PaymentRecord::Terminal(_))
        ) {
            return None;
        }
        match self.finalizer.claim(payment_id, outcome).await? {
            PaymentRecord::Terminal(record) => Some(record),
            PaymentRecord::Link(_) => None,
        }
    }

    async fn conclude(&self, record: &TerminalPaymentRecord, outcome: Outcome) -> PaymentOutcome {
        let snapshot = CartSnapshot {
            items: record.cart.items.clone(),
            summary: record.summary,
        };
        self.finalizer
            .conclude(&record.payment_id, PaymentKind::Terminal, &snapshot, outcome)
            .await
    }

    /// Cancel the reader action, then the payment intent. Failures never block local cleanup.
    async fn cancel_remote(&self, record: &TerminalPaymentRecord) {
        best_effort(
            "cancel_reader_action",
            &record.payment_id,
            self.processor.cancel_reader_action(&record.reader_id).await,
        );
        best_effort(
            "cancel_payment_intent",
            &record.payment_id,
            self.processor
                .cancel_payment_intent(&record.payment_id)
                .await,
        );
    }

    fn progress(&self, record: &TerminalPaymentRecord) -> ProgressSnapshot {
        ProgressSnapshot::compute(record.started_at, Instant::now(), self.settings.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed(status: IntentStatus, error: Option<&str>) -> IntentObservation {
        IntentObservation {
            status,
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn test_awaiting_payment_method_without_error_stays_pending() {
        let observation = observed(IntentStatus::RequiresPaymentMethod, None);
        assert_eq!(classify(Some(&observation)), Transition::Pending);
    }

    #[test]
    fn test_awaiting_payment_method_with_error_is_a_decline() {
        let observation = observed(
            IntentStatus::RequiresPaymentMethod,
            Some("Your card has insufficient funds."),
        );
        assert_eq!(
            classify(Some(&observation)),
            Transition::Failed("Your card has insufficient funds.".to_string())
        );
    }

    #[test]
    fn test_classify_terminal_statuses() {
        assert_eq!(
            classify(Some(&observed(IntentStatus::Succeeded, None))),
            Transition::Succeeded
        );
        assert!(matches!(
            classify(Some(&observed(IntentStatus::Canceled, None))),
            Transition::Failed(_)
        ));
        assert_eq!(
            classify(Some(&observed(IntentStatus::Processing, None))),
            Transition::Pending
        );
        assert_eq!(classify(None), Transition::Pending);
    }
}
