use super::webhook_cache::{WebhookCacheEntry, WebhookEventCache};
use crate::config::ReconciliationStrategy;
use crate::domain::payment::PaymentKind;
use crate::domain::ports::{PaymentProcessorRef, WebhookVerifierRef};
use crate::domain::processor::{IntentStatus, LINK_COMPLETED, WEBHOOK_EVENTS};
use crate::error::{PaymentError, Result, SignatureError, translate};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What a signal source currently says about a payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentObservation {
    pub status: IntentStatus,
    /// Last collection error. Distinguishes a decline from "awaiting card".
    pub error: Option<String>,
}

impl From<&WebhookCacheEntry> for IntentObservation {
    fn from(entry: &WebhookCacheEntry) -> Self {
        Self {
            status: IntentStatus::parse(&entry.status),
            error: entry.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkObservation {
    Open,
    Completed,
}

/// A verified webhook that concerns a tracked channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Intent {
        payment_id: String,
        observation: IntentObservation,
    },
    Link {
        payment_id: String,
        observation: LinkObservation,
    },
}

/// Chooses whether poll ticks query the processor or read the webhook cache.
///
/// The transition logic is shared; only the source of observations changes.
/// A webhook strategy whose registration failed at startup degrades to polling.
pub struct ReconciliationDispatcher {
    configured: ReconciliationStrategy,
    webhook_active: AtomicBool,
    processor: PaymentProcessorRef,
    verifier: WebhookVerifierRef,
    cache: WebhookEventCache,
}

impl ReconciliationDispatcher {
    pub fn new(
        configured: ReconciliationStrategy,
        processor: PaymentProcessorRef,
        verifier: WebhookVerifierRef,
        cache: WebhookEventCache,
    ) -> Self {
        Self {
            configured,
            webhook_active: AtomicBool::new(false),
            processor,
            verifier,
            cache,
        }
    }

    /// Registers the webhook endpoint when the webhook strategy is configured.
    pub async fn initialize(&self, webhook_url: Option<&str>) -> ReconciliationStrategy {
        if self.configured == ReconciliationStrategy::Polling {
            return self.effective_strategy();
        }

        let Some(url) = webhook_url else {
            warn!("Webhook strategy configured without a public URL, falling back to polling");
            return self.effective_strategy();
        };

        match self.processor.register_webhook(url, WEBHOOK_EVENTS).await {
            Ok(endpoint) => {
                info!(
                    endpoint_id = %endpoint.id,
                    url = %endpoint.url,
                    "Webhook endpoint registered"
                );
                if let Some(secret) = &endpoint.secret {
                    if let Err(e) = self.verifier.rotate_secret(secret) {
                        warn!(error = %e, "Unusable endpoint secret, falling back to polling");
                        return self.effective_strategy();
                    }
                    info!(endpoint_id = %endpoint.id, "Adopted signing secret of the new endpoint");
                }
                self.webhook_active.store(true, Ordering::SeqCst);
            }
            Err(e) => {
                warn!(error = %e, "Webhook registration failed, falling back to polling");
            }
        }
        self.effective_strategy()
    }

    pub fn effective_strategy(&self) -> ReconciliationStrategy {
        if self.webhook_active.load(Ordering::SeqCst) {
            ReconciliationStrategy::Webhook
        } else {
            ReconciliationStrategy::Polling
        }
    }

    pub fn cache(&self) -> &WebhookEventCache {
        &self.cache
    }

    /// Returns `None` when the selected source has nothing to report yet.
    pub async fn observe_intent(&self, intent_id: &str) -> Result<Option<IntentObservation>> {
        match self.effective_strategy() {
            ReconciliationStrategy::Webhook => Ok(self
                .cache
                .get(PaymentKind::Terminal, intent_id)
                .await
                .as_ref()
                .map(IntentObservation::from)),
            ReconciliationStrategy::Polling => {
                let intent = self
                    .processor
                    .retrieve_payment_intent(intent_id)
                    .await
                    .map_err(|e| PaymentError::RemoteCommunication(e.to_string()))?;
                Ok(Some(IntentObservation {
                    status: intent.status,
                    error: intent.last_error,
                }))
            }
        }
    }

    pub async fn observe_link(&self, link_id: &str) -> Result<LinkObservation> {
        let completed = match self.effective_strategy() {
            ReconciliationStrategy::Webhook => self
                .cache
                .get(PaymentKind::Link, link_id)
                .await
                .is_some_and(|entry| entry.status == LINK_COMPLETED),
            ReconciliationStrategy::Polling => !self
                .processor
                .list_completed_sessions(link_id)
                .await
                .map_err(|e| PaymentError::RemoteCommunication(e.to_string()))?
                .is_empty(),
        };
        Ok(if completed {
            LinkObservation::Completed
        } else {
            LinkObservation::Open
        })
    }

    /// Verifies, parses and caches an inbound webhook delivery.
    ///
    /// Unverified payloads are rejected before they can reach the cache.
    #[tracing::instrument(
        name = "webhook",
        skip_all,
        fields(event_id = tracing::field::Empty, event_type = tracing::field::Empty)
    )]
    pub async fn ingest(&self, payload: &[u8], signature: Option<&str>) -> Result<Option<Signal>> {
        let signature = signature.ok_or(SignatureError::Missing)?;
        self.verifier.verify(payload, signature).inspect_err(|e| {
            warn!(error = %e, "Rejected webhook with invalid signature");
        })?;

        let event = self.processor.parse_webhook(payload).map_err(translate)?;
        tracing::Span::current()
            .record("event_id", tracing::field::display(&event.id))
            .record("event_type", tracing::field::display(&event.event_type));

        let Some(update) = event.update else {
            debug!("Ignoring untracked webhook event");
            return Ok(None);
        };

        let kind = update.kind;
        let entry = WebhookCacheEntry::from_update(update, Instant::now());
        let signal = match kind {
            PaymentKind::Link => Signal::Link {
                payment_id: entry.id.clone(),
                observation: if entry.status == LINK_COMPLETED {
                    LinkObservation::Completed
                } else {
                    LinkObservation::Open
                },
            },
            _ => Signal::Intent {
                payment_id: entry.id.clone(),
                observation: IntentObservation::from(&entry),
            },
        };

        info!(id = %entry.id, status = %entry.status, "Webhook status cached");
        self.cache.record(kind, entry).await;
        Ok(Some(signal))
    }
}
