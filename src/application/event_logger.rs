use crate::domain::ledger::LedgerEntry;
use crate::domain::ports::TransactionLedgerRef;
use tracing::{error, info};

/// Writes one ledger entry per finished payment.
///
/// A failed write is reported through tracing and never reaches the caller:
/// the in-memory transition and the UI response proceed regardless.
#[derive(Clone)]
pub struct EventLogger {
    ledger: TransactionLedgerRef,
}

impl EventLogger {
    pub fn new(ledger: TransactionLedgerRef) -> Self {
        Self { ledger }
    }

    /// Returns whether the entry was persisted.
    pub async fn record(&self, entry: LedgerEntry) -> bool {
        match self.ledger.append(&entry).await {
            Ok(()) => {
                info!(
                    payment_id = %entry.payment_id,
                    entry_type = %entry.entry_type,
                    total = %entry.total,
                    "Ledger entry written"
                );
                true
            }
            Err(e) => {
                error!(
                    payment_id = %entry.payment_id,
                    entry_type = %entry.entry_type,
                    error = %e,
                    "Failed to write ledger entry"
                );
                false
            }
        }
    }
}
