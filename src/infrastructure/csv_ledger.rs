use crate::domain::ledger::LedgerEntry;
use crate::domain::ports::TransactionLedger;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const HEADER: [&str; 8] = [
    "payment_id",
    "recorded_at",
    "items",
    "subtotal",
    "tax",
    "total",
    "payment_method",
    "entry_type",
];

/// Append-only CSV ledger. Cart items are stored as a JSON column.
///
/// Writes run on the blocking pool and are serialized, so concurrent
/// conclusions never interleave rows.
#[derive(Clone)]
pub struct CsvLedger {
    path: Arc<PathBuf>,
    write_lock: Arc<Mutex<()>>,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn append_row(path: &Path, entry: &LedgerEntry) -> Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let needs_header = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    if needs_header {
        writer.write_record(HEADER)?;
    }
    writer.write_record([
        entry.payment_id.clone(),
        entry.recorded_at.to_rfc3339(),
        serde_json::to_string(&entry.items)?,
        entry.subtotal.to_string(),
        entry.tax.to_string(),
        entry.total.to_string(),
        entry.payment_method.to_string(),
        entry.entry_type.clone(),
    ])?;
    writer.flush()?;
    Ok(())
}

#[async_trait]
impl TransactionLedger for CsvLedger {
    async fn append(&self, entry: &LedgerEntry) -> Result<()> {
        let path = self.path.clone();
        let lock = self.write_lock.clone();
        let entry = entry.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            append_row(&path, &entry)
        })
        .await
        .map_err(|e| PaymentError::Ledger(e.to_string()))?
    }
}
