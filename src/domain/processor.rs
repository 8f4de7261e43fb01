//! Processor-facing model: the subset of the card-processing API the coordinator depends on.

use super::payment::PaymentKind;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Raw error returned by a processor adapter. Translated at the coordinator boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    #[error("card declined: {message}")]
    Declined {
        code: Option<String>,
        message: String,
    },
    #[error("resource missing: {0}")]
    ResourceMissing(String),
    #[error("action not allowed: {0}")]
    ActionNotAllowed(String),
    #[error("processor returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

pub type ProcessorResult<T> = std::result::Result<T, ProcessorError>;

/// Lifecycle status of a payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    Other(String),
}

impl IntentStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "requires_payment_method" => Self::RequiresPaymentMethod,
            "requires_confirmation" => Self::RequiresConfirmation,
            "requires_action" => Self::RequiresAction,
            "processing" => Self::Processing,
            "requires_capture" => Self::RequiresCapture,
            "canceled" => Self::Canceled,
            "succeeded" => Self::Succeeded,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::Processing => "processing",
            Self::RequiresCapture => "requires_capture",
            Self::Canceled => "canceled",
            Self::Succeeded => "succeeded",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for IntentStatus {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<IntentStatus> for String {
    fn from(status: IntentStatus) -> Self {
        status.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentChannel {
    /// Collected on a physical reader.
    CardPresent,
    /// Card details keyed in by the operator.
    Card,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntentRequest {
    /// Minor units.
    pub amount: i64,
    pub currency: String,
    pub channel: IntentChannel,
    /// Tokenized payment method, set for keyed-in cards.
    pub payment_method: Option<String>,
    /// Confirm in the same call.
    pub confirm: bool,
    pub receipt_email: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentIntent {
    pub id: String,
    pub status: IntentStatus,
    pub amount: i64,
    pub currency: String,
    /// Present when the last attempt to collect failed.
    pub last_error: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reader {
    pub id: String,
    pub label: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderActionStatus {
    InProgress,
    Succeeded,
    Failed,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderAction {
    pub reader_id: String,
    pub status: ReaderActionStatus,
    pub failure_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkRequest {
    pub amount: i64,
    pub currency: String,
    pub description: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentLink {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WebhookEndpoint {
    pub id: String,
    pub url: String,
    /// Signing secret. The processor only reveals it when the endpoint is created,
    /// so a reused endpoint leaves it unset and the configured secret stays in force.
    pub secret: Option<SecretString>,
}

/// A verified, parsed webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorEvent {
    pub id: String,
    pub event_type: String,
    /// None for event types the coordinator does not track.
    pub update: Option<StatusUpdate>,
}

/// Externally reported status of one payment, as carried by a webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub kind: PaymentKind,
    pub external_id: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    pub metadata: HashMap<String, String>,
    pub error: Option<String>,
}

/// Status string a link update carries once a checkout session for it completes.
pub const LINK_COMPLETED: &str = "completed";

/// Events the coordinator registers for.
pub const WEBHOOK_EVENTS: &[&str] = &[
    "payment_intent.succeeded",
    "payment_intent.payment_failed",
    "payment_intent.canceled",
    "payment_intent.requires_action",
    "payment_intent.processing",
    "checkout.session.completed",
];
