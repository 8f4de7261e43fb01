use super::cart::{CartSnapshot, PriceSummary};
use super::progress::ProgressSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// The channel a payment attempt runs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentKind {
    Terminal,
    Link,
    Manual,
}

impl PaymentKind {
    /// Ledger type prefix, suffixed by the outcome.
    pub fn ledger_type(&self) -> &'static str {
        match self {
            PaymentKind::Terminal => "terminal_payment",
            PaymentKind::Link => "link_payment",
            PaymentKind::Manual => "manual_payment",
        }
    }
}

impl fmt::Display for PaymentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentKind::Terminal => write!(f, "terminal"),
            PaymentKind::Link => write!(f, "link"),
            PaymentKind::Manual => write!(f, "manual"),
        }
    }
}

/// An attended card-present payment driven on a physical reader.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalPaymentRecord {
    /// Processor payment intent id.
    pub payment_id: String,
    pub reader_id: String,
    pub started_at: Instant,
    pub customer_contact: Option<String>,
    pub cart: CartSnapshot,
    pub summary: PriceSummary,
}

/// A customer-scanned payment link.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkPaymentRecord {
    pub payment_id: String,
    pub started_at: Instant,
}

/// An in-flight payment tracked by the state store.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentRecord {
    Terminal(TerminalPaymentRecord),
    Link(LinkPaymentRecord),
}

impl PaymentRecord {
    pub fn id(&self) -> &str {
        match self {
            PaymentRecord::Terminal(r) => &r.payment_id,
            PaymentRecord::Link(r) => &r.payment_id,
        }
    }

    pub fn kind(&self) -> PaymentKind {
        match self {
            PaymentRecord::Terminal(_) => PaymentKind::Terminal,
            PaymentRecord::Link(_) => PaymentKind::Link,
        }
    }

    pub fn started_at(&self) -> Instant {
        match self {
            PaymentRecord::Terminal(r) => r.started_at,
            PaymentRecord::Link(r) => r.started_at,
        }
    }

    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.started_at()) > timeout
    }

    pub fn metadata(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert("payment_type".to_string(), self.kind().to_string());
        if let PaymentRecord::Terminal(r) = self {
            metadata.insert("reader_id".to_string(), r.reader_id.clone());
            if let Some(contact) = &r.customer_contact {
                metadata.insert("customer_contact".to_string(), contact.clone());
            }
        }
        metadata
    }
}

/// How a payment attempt ended. Each variant is reached at most once per payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed { reason: String },
    /// TIMED_OUT for terminal payments, EXPIRED for links.
    Expired,
    Cancelled,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Succeeded => "succeeded",
            Outcome::Failed { .. } => "failed",
            Outcome::Expired => "expired",
            Outcome::Cancelled => "cancelled",
        }
    }

    pub fn ledger_suffix(&self) -> &'static str {
        match self {
            Outcome::Succeeded => "",
            Outcome::Failed { .. } => "_failed",
            Outcome::Expired => "_expired",
            Outcome::Cancelled => "_cancelled",
        }
    }

    /// The payment was not taken and the customer walked away: the cart is emptied.
    /// A decline leaves the cart in place so the operator can retry.
    pub fn clears_cart(&self) -> bool {
        !matches!(self, Outcome::Failed { .. })
    }

    pub fn message(&self, kind: PaymentKind) -> String {
        match (self, kind) {
            (Outcome::Succeeded, _) => "Payment successful.".to_string(),
            (Outcome::Failed { reason }, _) => format!("Payment failed: {reason}"),
            (Outcome::Expired, PaymentKind::Link) => {
                "Payment link expired before it was paid.".to_string()
            }
            (Outcome::Expired, _) => "Payment timed out. The reader has been reset.".to_string(),
            (Outcome::Cancelled, _) => "Payment cancelled.".to_string(),
        }
    }
}

/// Definitive result of a finished attempt, as rendered to the operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentOutcome {
    pub payment_id: String,
    pub kind: PaymentKind,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub message: String,
}

impl PaymentOutcome {
    pub fn new(payment_id: impl Into<String>, kind: PaymentKind, outcome: Outcome) -> Self {
        let message = outcome.message(kind);
        Self {
            payment_id: payment_id.into(),
            kind,
            outcome,
            message,
        }
    }
}

/// Answer to a single poll tick. Safe to request repeatedly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PollResponse {
    Pending {
        progress: ProgressSnapshot,
        message: String,
        /// The last processor call failed; polling should continue.
        retrying: bool,
    },
    Concluded(PaymentOutcome),
    /// The payment already reached a terminal state on an earlier tick or event.
    AlreadyConcluded,
}

impl PollResponse {
    pub fn pending(progress: ProgressSnapshot, retrying: bool) -> Self {
        let message = if retrying {
            "Still waiting on the payment processor, please wait...".to_string()
        } else {
            "Waiting for payment...".to_string()
        };
        PollResponse::Pending {
            progress,
            message,
            retrying,
        }
    }

    pub fn into_outcome(self) -> Option<PaymentOutcome> {
        match self {
            PollResponse::Concluded(outcome) => Some(outcome),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(started_at: Instant) -> PaymentRecord {
        PaymentRecord::Link(LinkPaymentRecord {
            payment_id: "plink_1".to_string(),
            started_at,
        })
    }

    #[test]
    fn test_outcome_ledger_suffixes() {
        assert_eq!(Outcome::Succeeded.ledger_suffix(), "");
        assert_eq!(
            Outcome::Failed {
                reason: "declined".to_string()
            }
            .ledger_suffix(),
            "_failed"
        );
        assert_eq!(Outcome::Expired.ledger_suffix(), "_expired");
        assert_eq!(Outcome::Cancelled.ledger_suffix(), "_cancelled");
    }

    #[test]
    fn test_decline_keeps_cart() {
        assert!(Outcome::Succeeded.clears_cart());
        assert!(Outcome::Expired.clears_cart());
        assert!(Outcome::Cancelled.clears_cart());
        assert!(
            !Outcome::Failed {
                reason: "declined".to_string()
            }
            .clears_cart()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_expiry_is_strictly_after_timeout() {
        let start = Instant::now();
        let record = link(start);
        let timeout = Duration::from_secs(120);

        assert!(!record.is_expired(start + Duration::from_secs(120), timeout));
        assert!(record.is_expired(start + Duration::from_secs(121), timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_metadata_includes_reader() {
        let record = PaymentRecord::Terminal(TerminalPaymentRecord {
            payment_id: "pi_1".to_string(),
            reader_id: "tmr_1".to_string(),
            started_at: Instant::now(),
            customer_contact: Some("ada@example.com".to_string()),
            cart: CartSnapshot::default(),
            summary: PriceSummary::default(),
        });
        let metadata = record.metadata();
        assert_eq!(metadata.get("reader_id").map(String::as_str), Some("tmr_1"));
        assert_eq!(
            metadata.get("payment_type").map(String::as_str),
            Some("terminal")
        );
    }
}
