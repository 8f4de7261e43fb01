use super::cart::CartSnapshot;
use super::ledger::LedgerEntry;
use super::payment::PaymentOutcome;
use super::processor::{
    CheckoutSession, IntentRequest, LinkRequest, PaymentIntent, PaymentLink, ProcessorEvent,
    ProcessorResult, Reader, ReaderAction, WebhookEndpoint,
};
use super::progress::ProgressSnapshot;
use crate::error::{Result, SignatureError};
use async_trait::async_trait;
use secrecy::SecretString;
use serde::Serialize;
use std::sync::Arc;

/// The third-party card-processing API.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_payment_intent(
        &self,
        request: &IntentRequest,
    ) -> ProcessorResult<PaymentIntent>;
    async fn retrieve_payment_intent(&self, intent_id: &str) -> ProcessorResult<PaymentIntent>;
    async fn cancel_payment_intent(&self, intent_id: &str) -> ProcessorResult<()>;

    async fn list_online_readers(&self) -> ProcessorResult<Vec<Reader>>;
    async fn process_payment_on_reader(
        &self,
        reader_id: &str,
        intent_id: &str,
        skip_tipping: bool,
    ) -> ProcessorResult<ReaderAction>;
    async fn cancel_reader_action(&self, reader_id: &str) -> ProcessorResult<()>;

    async fn create_payment_link(&self, request: &LinkRequest) -> ProcessorResult<PaymentLink>;
    async fn deactivate_payment_link(&self, link_id: &str) -> ProcessorResult<()>;
    async fn list_completed_sessions(&self, link_id: &str) -> ProcessorResult<Vec<CheckoutSession>>;

    /// Reuses an enabled endpoint for `url` when one exists, otherwise creates it.
    async fn register_webhook(
        &self,
        url: &str,
        events: &[&str],
    ) -> ProcessorResult<WebhookEndpoint>;

    /// Parse an already verified webhook body.
    fn parse_webhook(&self, payload: &[u8]) -> ProcessorResult<ProcessorEvent>;
}

/// Verifies the signature header of an inbound webhook against the configured secret.
pub trait WebhookVerifier: Send + Sync {
    fn verify(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> std::result::Result<(), SignatureError>;

    /// Replaces the signing secret, e.g. with the one issued for a new endpoint.
    fn rotate_secret(&self, secret: &SecretString) -> std::result::Result<(), SignatureError>;
}

/// The operator's current cart.
#[async_trait]
pub trait CartService: Send + Sync {
    async fn snapshot(&self) -> Result<CartSnapshot>;
    async fn clear(&self) -> Result<()>;
}

/// Append-only transaction ledger.
#[async_trait]
pub trait TransactionLedger: Send + Sync {
    async fn append(&self, entry: &LedgerEntry) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UiEvent {
    Progress {
        payment_id: String,
        progress: ProgressSnapshot,
    },
    Outcome(PaymentOutcome),
}

/// Operator UI channel. Push or client poll is a deployment choice.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, event: UiEvent);
}

pub type PaymentProcessorRef = Arc<dyn PaymentProcessor>;
pub type WebhookVerifierRef = Arc<dyn WebhookVerifier>;
pub type CartServiceRef = Arc<dyn CartService>;
pub type TransactionLedgerRef = Arc<dyn TransactionLedger>;
pub type NotificationSinkRef = Arc<dyn NotificationSink>;
