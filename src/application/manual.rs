use super::finalizer::{Finalizer, best_effort};
use crate::domain::payment::{Outcome, PaymentKind, PaymentOutcome};
use crate::domain::ports::PaymentProcessorRef;
use crate::domain::processor::{IntentChannel, IntentRequest, IntentStatus, ProcessorError};
use crate::error::{Result, ValidationError, translate};
use std::collections::HashMap;
use tracing::{info, warn};

/// Keyed-in card payments. Confirmation is synchronous, so no record is tracked.
pub struct ManualCardCoordinator {
    processor: PaymentProcessorRef,
    finalizer: Finalizer,
    currency: String,
}

impl ManualCardCoordinator {
    pub fn new(processor: PaymentProcessorRef, finalizer: Finalizer, currency: String) -> Self {
        Self {
            processor,
            finalizer,
            currency,
        }
    }

    /// Charges a tokenized card for the current cart.
    ///
    /// A decline is a definitive outcome and is written to the ledger; a
    /// communication failure is returned as retryable and writes nothing.
    pub async fn charge(
        &self,
        payment_method: &str,
        customer_contact: Option<String>,
    ) -> Result<PaymentOutcome> {
        if payment_method.trim().is_empty() {
            return Err(ValidationError::MissingPaymentMethod.into());
        }
        let cart = self.finalizer.cart().snapshot().await?;
        let amount = cart.chargeable_amount()?;

        let request = IntentRequest {
            amount,
            currency: self.currency.clone(),
            channel: IntentChannel::Card,
            payment_method: Some(payment_method.to_string()),
            confirm: true,
            receipt_email: customer_contact,
            metadata: HashMap::from([(
                "payment_type".to_string(),
                PaymentKind::Manual.to_string(),
            )]),
        };

        let (payment_id, outcome) = match self.processor.create_payment_intent(&request).await {
            Ok(intent) => {
                let outcome = match (&intent.status, intent.last_error) {
                    (IntentStatus::Succeeded, _) => Outcome::Succeeded,
                    (IntentStatus::RequiresPaymentMethod, Some(reason)) => {
                        Outcome::Failed { reason }
                    }
                    (status, _) => {
                        warn!(
                            payment_id = %intent.id,
                            status = %status.as_str(),
                            "Keyed-in card could not be completed at the register"
                        );
                        best_effort(
                            "cancel_payment_intent",
                            &intent.id,
                            self.processor.cancel_payment_intent(&intent.id).await,
                        );
                        Outcome::Failed {
                            reason: "the card requires additional verification".to_string(),
                        }
                    }
                };
                (intent.id, outcome)
            }
            Err(ProcessorError::Declined { code, message }) => {
                info!(decline_code = ?code, "Keyed-in card declined");
                // Declines at confirmation carry no intent id back to us.
                (
                    format!("manual_{}", uuid::Uuid::new_v4().simple()),
                    Outcome::Failed { reason: message },
                )
            }
            Err(e) => return Err(translate(e)),
        };

        Ok(self
            .finalizer
            .conclude_untracked(&payment_id, PaymentKind::Manual, &cart, outcome)
            .await)
    }
}
