use crate::error::ValidationError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A single line in the operator's cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    /// Catalog category, consulted by the tipping allow-list.
    #[serde(default)]
    pub category: Option<String>,
}

impl CartItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Subtotal, tax and total as computed by the cart service.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceSummary {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl PriceSummary {
    /// Total expressed in the currency's minor unit (cents), as the processor expects.
    pub fn total_minor_units(&self) -> Option<i64> {
        (self.total * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
    }
}

/// Cart contents captured at the moment a payment attempt begins.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub items: Vec<CartItem>,
    pub summary: PriceSummary,
}

impl CartSnapshot {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Amount to charge in minor units, rejecting empty carts and non-positive totals.
    pub fn chargeable_amount(&self) -> Result<i64, ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::EmptyCart);
        }
        self.summary
            .total_minor_units()
            .filter(|amount| *amount > 0)
            .ok_or_else(|| ValidationError::InvalidAmount(self.summary.total.to_string()))
    }

    pub fn categories(&self) -> impl Iterator<Item = Option<&str>> {
        self.items.iter().map(|item| item.category.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_total_minor_units_rounds_to_cents() {
        let summary = PriceSummary {
            subtotal: dec!(10.00),
            tax: dec!(0.825),
            total: dec!(10.825),
        };
        assert_eq!(summary.total_minor_units(), Some(1083));
    }

    #[test]
    fn test_chargeable_amount_rejects_empty_and_zero_totals() {
        assert_eq!(
            CartSnapshot::default().chargeable_amount(),
            Err(ValidationError::EmptyCart)
        );

        let free = CartSnapshot {
            items: vec![CartItem {
                name: "Water".to_string(),
                quantity: 1,
                unit_price: dec!(0.00),
                category: None,
            }],
            summary: PriceSummary::default(),
        };
        assert!(matches!(
            free.chargeable_amount(),
            Err(ValidationError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_line_total() {
        let item = CartItem {
            name: "Latte".to_string(),
            quantity: 3,
            unit_price: dec!(4.50),
            category: None,
        };
        assert_eq!(item.line_total(), dec!(13.50));
    }
}
