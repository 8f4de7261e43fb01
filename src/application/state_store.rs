use super::finalizer::best_effort;
use super::sweeper::Sweep;
use crate::domain::payment::PaymentRecord;
use crate::domain::ports::{CartServiceRef, PaymentProcessorRef};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

/// In-flight payments keyed by payment id.
///
/// Cloning shares the underlying map. The lock is only held for the map
/// mutation itself, never across a processor or ledger call.
#[derive(Default, Clone)]
pub struct PaymentStateStore {
    records: Arc<RwLock<HashMap<String, PaymentRecord>>>,
}

impl PaymentStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record for a new attempt.
    ///
    /// Returns false if one already exists for the id.
    pub async fn add(&self, record: PaymentRecord) -> bool {
        let mut records = self.records.write().await;
        if records.contains_key(record.id()) {
            warn!(payment_id = %record.id(), "Refusing to track a payment twice");
            return false;
        }
        debug!(payment_id = %record.id(), kind = %record.kind(), "Tracking payment");
        records.insert(record.id().to_string(), record);
        true
    }

    pub async fn get(&self, payment_id: &str) -> Option<PaymentRecord> {
        let records = self.records.read().await;
        records.get(payment_id).cloned()
    }

    pub async fn contains(&self, payment_id: &str) -> bool {
        let records = self.records.read().await;
        records.contains_key(payment_id)
    }

    /// Atomically claims a record.
    ///
    /// Only the caller that receives `Some` may finalize it.
    pub async fn remove(&self, payment_id: &str) -> Option<PaymentRecord> {
        let mut records = self.records.write().await;
        records.remove(payment_id)
    }

    /// Claims the record and, only if this call claimed it, clears the cart.
    ///
    /// A cart failure is reported but does not undo the claim.
    pub async fn remove_and_clear_cart(
        &self,
        payment_id: &str,
        cart: &CartServiceRef,
    ) -> Option<PaymentRecord> {
        let record = self.remove(payment_id).await?;
        if let Err(e) = cart.clear().await {
            warn!(payment_id = %payment_id, error = %e, "Failed to clear cart after payment");
        }
        Some(record)
    }

    pub async fn clear(&self) {
        let mut records = self.records.write().await;
        records.clear();
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Evicts records older than `timeout`, returning what was removed.
    pub async fn sweep_expired(&self, now: Instant, timeout: Duration) -> Vec<PaymentRecord> {
        let mut records = self.records.write().await;
        let expired: Vec<String> = records
            .iter()
            .filter(|(_, record)| record.is_expired(now, timeout))
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| records.remove(&id))
            .collect()
    }
}

/// Evicts abandoned payments and releases what they still hold at the processor.
///
/// Nothing is written to the ledger for a swept payment.
pub struct ExpiredPaymentSweep {
    store: PaymentStateStore,
    processor: PaymentProcessorRef,
}

impl ExpiredPaymentSweep {
    pub fn new(store: PaymentStateStore, processor: PaymentProcessorRef) -> Self {
        Self { store, processor }
    }

    async fn release(&self, record: &PaymentRecord) {
        match record {
            PaymentRecord::Terminal(r) => {
                best_effort(
                    "cancel_reader_action",
                    &r.payment_id,
                    self.processor.cancel_reader_action(&r.reader_id).await,
                );
                best_effort(
                    "cancel_payment_intent",
                    &r.payment_id,
                    self.processor.cancel_payment_intent(&r.payment_id).await,
                );
            }
            PaymentRecord::Link(r) => {
                best_effort(
                    "deactivate_payment_link",
                    &r.payment_id,
                    self.processor.deactivate_payment_link(&r.payment_id).await,
                );
            }
        }
    }
}

#[async_trait]
impl Sweep for ExpiredPaymentSweep {
    fn name(&self) -> &'static str {
        "payment_state"
    }

    async fn sweep(&self, now: Instant, timeout: Duration) -> usize {
        let evicted = self.store.sweep_expired(now, timeout).await;
        for record in &evicted {
            warn!(
                payment_id = %record.id(),
                kind = %record.kind(),
                "Swept payment that outlived the timeout without being finalized"
            );
            self.release(record).await;
        }
        evicted.len()
    }
}
