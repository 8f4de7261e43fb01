use super::cart::CartSnapshot;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// On-reader tipping rules, evaluated per transaction before the reader action is requested.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TippingPolicy {
    /// Global enable flag, used when the location has no override.
    pub enabled: bool,
    /// Per-location override, keyed by terminal location id.
    #[serde(default)]
    pub location_overrides: HashMap<String, bool>,
    /// Minimum total that offers a tip prompt. Zero means unbounded.
    #[serde(default)]
    pub min_amount: Decimal,
    /// Maximum total that offers a tip prompt. Zero means unbounded.
    #[serde(default)]
    pub max_amount: Decimal,
    /// Categories allowed to be tipped on. Empty means unrestricted.
    #[serde(default)]
    pub allowed_categories: HashSet<String>,
}

impl TippingPolicy {
    /// Returns true when every rule allows tipping for this amount, cart and location.
    pub fn is_eligible(
        &self,
        amount: Decimal,
        cart: &CartSnapshot,
        location: Option<&str>,
    ) -> bool {
        let enabled = location
            .and_then(|loc| self.location_overrides.get(loc).copied())
            .unwrap_or(self.enabled);
        if !enabled {
            return false;
        }

        if self.min_amount > Decimal::ZERO && amount < self.min_amount {
            return false;
        }
        if self.max_amount > Decimal::ZERO && amount > self.max_amount {
            return false;
        }

        if self.allowed_categories.is_empty() {
            return true;
        }
        cart.categories().all(|category| {
            category.is_some_and(|category| self.allowed_categories.contains(category))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cart::CartItem;
    use rust_decimal_macros::dec;

    fn cart(categories: &[Option<&str>]) -> CartSnapshot {
        CartSnapshot {
            items: categories
                .iter()
                .map(|c| CartItem {
                    name: "item".to_string(),
                    quantity: 1,
                    unit_price: dec!(5.00),
                    category: c.map(str::to_string),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_global_disable_without_override_is_off() {
        let policy = TippingPolicy::default();
        assert!(!policy.is_eligible(dec!(20.00), &cart(&[None]), Some("loc_1")));
        assert!(!policy.is_eligible(dec!(20.00), &cart(&[None]), None));
    }

    #[test]
    fn test_location_override_false_beats_global_enable() {
        let policy = TippingPolicy {
            enabled: true,
            location_overrides: HashMap::from([("loc_1".to_string(), false)]),
            ..Default::default()
        };
        assert!(!policy.is_eligible(dec!(20.00), &cart(&[None]), Some("loc_1")));
        assert!(policy.is_eligible(dec!(20.00), &cart(&[None]), Some("loc_2")));
    }

    #[test]
    fn test_location_override_true_beats_global_disable() {
        let policy = TippingPolicy {
            enabled: false,
            location_overrides: HashMap::from([("loc_1".to_string(), true)]),
            ..Default::default()
        };
        assert!(policy.is_eligible(dec!(20.00), &cart(&[None]), Some("loc_1")));
    }

    #[test]
    fn test_amount_thresholds() {
        let policy = TippingPolicy {
            enabled: true,
            min_amount: dec!(5.00),
            max_amount: dec!(100.00),
            ..Default::default()
        };
        let items = cart(&[None]);
        assert!(!policy.is_eligible(dec!(4.99), &items, None));
        assert!(policy.is_eligible(dec!(5.00), &items, None));
        assert!(policy.is_eligible(dec!(100.00), &items, None));
        assert!(!policy.is_eligible(dec!(100.01), &items, None));
    }

    #[test]
    fn test_zero_thresholds_are_unbounded() {
        let policy = TippingPolicy {
            enabled: true,
            ..Default::default()
        };
        assert!(policy.is_eligible(dec!(0.01), &cart(&[None]), None));
        assert!(policy.is_eligible(dec!(99999.00), &cart(&[None]), None));
    }

    #[test]
    fn test_category_allow_list() {
        let policy = TippingPolicy {
            enabled: true,
            allowed_categories: HashSet::from(["food".to_string(), "drinks".to_string()]),
            ..Default::default()
        };
        assert!(policy.is_eligible(dec!(10.00), &cart(&[Some("food"), Some("drinks")]), None));
        assert!(!policy.is_eligible(dec!(10.00), &cart(&[Some("food"), Some("retail")]), None));
        assert!(!policy.is_eligible(dec!(10.00), &cart(&[None]), None));
    }
}
