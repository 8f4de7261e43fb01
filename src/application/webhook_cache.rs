use super::sweeper::Sweep;
use crate::domain::payment::PaymentKind;
use crate::domain::processor::StatusUpdate;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Status of one payment as last reported by a webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookCacheEntry {
    pub id: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    pub metadata: HashMap<String, String>,
    pub last_updated: Instant,
    pub error: Option<String>,
}

impl WebhookCacheEntry {
    pub fn from_update(update: StatusUpdate, now: Instant) -> Self {
        Self {
            id: update.external_id,
            status: update.status,
            amount: update.amount,
            currency: update.currency,
            metadata: update.metadata,
            last_updated: now,
            error: update.error,
        }
    }

    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_updated) > ttl
    }
}

type CacheKey = (PaymentKind, String);

/// Webhook-reported statuses keyed by (payment kind, external id).
///
/// Entries older than the TTL are logically absent: reads filter them out and
/// schedule their eviction, independently of the periodic sweep.
/// Writes are last-write-wins.
#[derive(Clone)]
pub struct WebhookEventCache {
    entries: Arc<RwLock<HashMap<CacheKey, WebhookCacheEntry>>>,
    ttl: Duration,
}

impl WebhookEventCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub async fn record(&self, kind: PaymentKind, entry: WebhookCacheEntry) {
        let mut entries = self.entries.write().await;
        entries.insert((kind, entry.id.clone()), entry);
    }

    pub async fn get(&self, kind: PaymentKind, id: &str) -> Option<WebhookCacheEntry> {
        let key = (kind, id.to_string());
        let entry = {
            let entries = self.entries.read().await;
            entries.get(&key).cloned()
        }?;

        if entry.is_expired(Instant::now(), self.ttl) {
            let cache = self.clone();
            tokio::spawn(async move { cache.evict_if_stale(key).await });
            return None;
        }
        Some(entry)
    }

    pub async fn remove(&self, kind: PaymentKind, id: &str) -> Option<WebhookCacheEntry> {
        let mut entries = self.entries.write().await;
        entries.remove(&(kind, id.to_string()))
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn sweep_expired(&self, now: Instant) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now, self.ttl));
        before - entries.len()
    }

    // A fresh delivery may have replaced the stale entry since the read.
    async fn evict_if_stale(&self, key: CacheKey) {
        let mut entries = self.entries.write().await;
        if entries
            .get(&key)
            .is_some_and(|entry| entry.is_expired(Instant::now(), self.ttl))
        {
            entries.remove(&key);
            debug!(kind = %key.0, id = %key.1, "Evicted stale webhook entry on read");
        }
    }
}

#[async_trait]
impl Sweep for WebhookEventCache {
    fn name(&self) -> &'static str {
        "webhook_cache"
    }

    async fn sweep(&self, now: Instant, _timeout: Duration) -> usize {
        self.sweep_expired(now).await
    }
}
