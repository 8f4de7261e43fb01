use crate::domain::cart::{CartItem, CartSnapshot, PriceSummary};
use crate::domain::ledger::LedgerEntry;
use crate::domain::ports::{CartService, TransactionLedger};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

/// A thread-safe in-memory cart.
///
/// Tax is computed from a flat rate and rounded to cents. Clones share the
/// same contents, so a test can keep a handle while the coordinator owns another.
#[derive(Clone)]
pub struct InMemoryCart {
    items: Arc<RwLock<Vec<CartItem>>>,
    tax_rate: Decimal,
    clears: Arc<AtomicUsize>,
}

impl InMemoryCart {
    pub fn new(tax_rate: Decimal) -> Self {
        Self {
            items: Arc::new(RwLock::new(Vec::new())),
            tax_rate,
            clears: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A cart holding two lines at an 8.25% tax rate. Total is 13.26.
    pub fn with_sample_items() -> Self {
        let cart = Self::new(dec!(0.0825));
        let items = vec![
            CartItem {
                name: "Latte".to_string(),
                quantity: 2,
                unit_price: dec!(4.50),
                category: Some("drinks".to_string()),
            },
            CartItem {
                name: "Croissant".to_string(),
                quantity: 1,
                unit_price: dec!(3.25),
                category: Some("bakery".to_string()),
            },
        ];
        Self {
            items: Arc::new(RwLock::new(items)),
            ..cart
        }
    }

    pub async fn set_items(&self, items: Vec<CartItem>) {
        *self.items.write().await = items;
    }

    pub async fn add_item(&self, item: CartItem) {
        self.items.write().await.push(item);
    }

    /// Number of times the cart has been cleared.
    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    fn summarize(&self, items: &[CartItem]) -> PriceSummary {
        let subtotal: Decimal = items.iter().map(CartItem::line_total).sum();
        let tax = (subtotal * self.tax_rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        PriceSummary {
            subtotal,
            tax,
            total: subtotal + tax,
        }
    }
}

impl Default for InMemoryCart {
    fn default() -> Self {
        Self::new(Decimal::ZERO)
    }
}

#[async_trait]
impl CartService for InMemoryCart {
    async fn snapshot(&self) -> Result<CartSnapshot> {
        let items = self.items.read().await.clone();
        let summary = self.summarize(&items);
        Ok(CartSnapshot { items, summary })
    }

    async fn clear(&self) -> Result<()> {
        self.items.write().await.clear();
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Ledger that keeps entries in memory. Writes can be made to fail on demand.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    entries: Arc<Mutex<Vec<LedgerEntry>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransactionLedger for InMemoryLedger {
    async fn append(&self, entry: &LedgerEntry) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PaymentError::Ledger("ledger is unavailable".to_string()));
        }
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry.clone());
        Ok(())
    }
}
