use super::cart::{CartItem, CartSnapshot};
use super::payment::{Outcome, PaymentKind};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One append-only ledger row, written exactly once per finished payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub payment_id: String,
    pub recorded_at: DateTime<Utc>,
    pub items: Vec<CartItem>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub payment_method: PaymentKind,
    /// Channel type with an outcome suffix, e.g. `terminal_payment_expired`.
    pub entry_type: String,
}

impl LedgerEntry {
    pub fn new(
        payment_id: &str,
        kind: PaymentKind,
        cart: &CartSnapshot,
        outcome: &Outcome,
    ) -> Self {
        Self {
            payment_id: payment_id.to_string(),
            recorded_at: Utc::now(),
            items: cart.items.clone(),
            subtotal: cart.summary.subtotal,
            tax: cart.summary.tax,
            total: cart.summary.total,
            payment_method: kind,
            entry_type: format!("{}{}", kind.ledger_type(), outcome.ledger_suffix()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_type_is_suffixed_by_outcome() {
        let cart = CartSnapshot::default();
        let entry = LedgerEntry::new("pi_1", PaymentKind::Terminal, &cart, &Outcome::Expired);
        assert_eq!(entry.entry_type, "terminal_payment_expired");

        let entry = LedgerEntry::new("plink_1", PaymentKind::Link, &cart, &Outcome::Succeeded);
        assert_eq!(entry.entry_type, "link_payment");
    }
}
