use crate::domain::processor::ProcessorError;
use thiserror::Error;

/// Rejections raised before any remote call is made. No record exists afterwards.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no reader available: {0}")]
    NoReaderAvailable(String),
    #[error("the cart is empty")]
    EmptyCart,
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("no payment method supplied")]
    MissingPaymentMethod,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature header")]
    Missing,
    #[error("malformed signature header: {0}")]
    Malformed(String),
    #[error("signature timestamp outside tolerance ({0}s)")]
    Expired(u64),
    #[error("signature does not match payload")]
    Mismatch,
    #[error("webhook signing secret is unusable")]
    InvalidSecret,
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Processor communication error: {0}")]
    RemoteCommunication(String),
    #[error("Payment declined: {0}")]
    Declined(String),
    #[error("Webhook rejected: {0}")]
    WebhookRejected(#[from] SignatureError),
    #[error("Ledger error: {0}")]
    Ledger(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PaymentError {
    /// Transient failures render a soft "please wait" and the caller keeps polling.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::RemoteCommunication(_))
    }
}

/// Maps a raw processor error onto the coordinator's error kinds.
///
/// Declines are terminal; everything else is treated as a retryable
/// communication failure so a single bad call never ends a payment.
pub fn translate(err: ProcessorError) -> PaymentError {
    match err {
        ProcessorError::Declined { message, .. } => PaymentError::Declined(message),
        other => PaymentError::RemoteCommunication(other.to_string()),
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
