#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tillpay::application::coordinator::{Collaborators, PaymentCoordinator};
use tillpay::config::CoordinatorConfig;
use tillpay::domain::payment::{PaymentKind, PollResponse};
use tillpay::domain::ports::PaymentProcessor;
use tillpay::domain::processor::{
    CheckoutSession, IntentRequest, IntentStatus, LinkRequest, PaymentIntent, PaymentLink,
    ProcessorError, ProcessorEvent, ProcessorResult, Reader, ReaderAction, ReaderActionStatus,
    StatusUpdate, WebhookEndpoint,
};
use tillpay::infrastructure::broadcast::BroadcastNotifier;
use tillpay::infrastructure::in_memory::{InMemoryCart, InMemoryLedger};
use tillpay::infrastructure::signature::StripeSignatureVerifier;

pub const READER: &str = "tmr_1";
pub const WEBHOOK_SECRET: &str = "whsec_test";

/// What the scripted processor answers. Errors stay in place until cleared.
#[derive(Debug, Clone)]
pub struct Script {
    pub readers: Vec<Reader>,
    pub reader_action: ReaderActionStatus,
    pub reader_failure: Option<String>,
    pub intent_status: IntentStatus,
    pub intent_error: Option<String>,
    pub create_intent_error: Option<ProcessorError>,
    pub process_error: Option<ProcessorError>,
    pub retrieve_error: Option<ProcessorError>,
    pub cancel_intent_error: Option<ProcessorError>,
    pub cancel_action_error: Option<ProcessorError>,
    pub link_error: Option<ProcessorError>,
    pub deactivate_error: Option<ProcessorError>,
    pub register_error: Option<ProcessorError>,
    /// Secret the processor reveals for a newly created endpoint.
    pub endpoint_secret: Option<String>,
    pub completed_links: HashSet<String>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            readers: vec![Reader {
                id: READER.to_string(),
                label: Some("Front counter".to_string()),
                location: Some("tml_1".to_string()),
            }],
            reader_action: ReaderActionStatus::InProgress,
            reader_failure: None,
            intent_status: IntentStatus::RequiresPaymentMethod,
            intent_error: None,
            create_intent_error: None,
            process_error: None,
            retrieve_error: None,
            cancel_intent_error: None,
            cancel_action_error: None,
            link_error: None,
            deactivate_error: None,
            register_error: None,
            endpoint_secret: None,
            completed_links: HashSet::new(),
        }
    }
}

#[derive(Default)]
pub struct MockProcessor {
    script: Mutex<Script>,
    calls: Mutex<HashMap<&'static str, usize>>,
    skip_tipping: Mutex<Option<bool>>,
    next_id: AtomicUsize,
}

impl MockProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, f: impl FnOnce(&mut Script)) {
        f(&mut self.script.lock().unwrap());
    }

    pub fn calls(&self, name: &str) -> usize {
        self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn last_skip_tipping(&self) -> Option<bool> {
        *self.skip_tipping.lock().unwrap()
    }

    fn record(&self, name: &'static str) -> Script {
        *self.calls.lock().unwrap().entry(name).or_insert(0) += 1;
        self.script.lock().unwrap().clone()
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn intent(&self, id: String, script: &Script) -> PaymentIntent {
        PaymentIntent {
            id,
            status: script.intent_status.clone(),
            amount: 1326,
            currency: "usd".to_string(),
            last_error: script.intent_error.clone(),
            metadata: HashMap::new(),
        }
    }
}

fn fail_or<T>(error: Option<ProcessorError>, value: T) -> ProcessorResult<T> {
    match error {
        Some(e) => Err(e),
        None => Ok(value),
    }
}

#[async_trait]
impl PaymentProcessor for MockProcessor {
    async fn create_payment_intent(
        &self,
        _request: &IntentRequest,
    ) -> ProcessorResult<PaymentIntent> {
        let script = self.record("create_payment_intent");
        let intent = self.intent(self.next_id("pi"), &script);
        fail_or(script.create_intent_error, intent)
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> ProcessorResult<PaymentIntent> {
        let script = self.record("retrieve_payment_intent");
        let intent = self.intent(intent_id.to_string(), &script);
        fail_or(script.retrieve_error, intent)
    }

    async fn cancel_payment_intent(&self, _intent_id: &str) -> ProcessorResult<()> {
        fail_or(self.record("cancel_payment_intent").cancel_intent_error, ())
    }

    async fn list_online_readers(&self) -> ProcessorResult<Vec<Reader>> {
        Ok(self.record("list_online_readers").readers)
    }

    async fn process_payment_on_reader(
        &self,
        reader_id: &str,
        _intent_id: &str,
        skip_tipping: bool,
    ) -> ProcessorResult<ReaderAction> {
        let script = self.record("process_payment_on_reader");
        *self.skip_tipping.lock().unwrap() = Some(skip_tipping);
        fail_or(
            script.process_error,
            ReaderAction {
                reader_id: reader_id.to_string(),
                status: script.reader_action,
                failure_message: script.reader_failure,
            },
        )
    }

    async fn cancel_reader_action(&self, _reader_id: &str) -> ProcessorResult<()> {
        fail_or(self.record("cancel_reader_action").cancel_action_error, ())
    }

    async fn create_payment_link(&self, _request: &LinkRequest) -> ProcessorResult<PaymentLink> {
        let script = self.record("create_payment_link");
        let id = self.next_id("plink");
        let url = format!("https://pay.example.test/{id}");
        fail_or(script.link_error, PaymentLink { id, url })
    }

    async fn deactivate_payment_link(&self, _link_id: &str) -> ProcessorResult<()> {
        fail_or(self.record("deactivate_payment_link").deactivate_error, ())
    }

    async fn list_completed_sessions(
        &self,
        link_id: &str,
    ) -> ProcessorResult<Vec<CheckoutSession>> {
        let script = self.record("list_completed_sessions");
        let sessions = if script.completed_links.contains(link_id) {
            vec![CheckoutSession {
                id: format!("cs_{link_id}"),
                amount_total: Some(1326),
                currency: Some("usd".to_string()),
            }]
        } else {
            Vec::new()
        };
        fail_or(script.retrieve_error, sessions)
    }

    async fn register_webhook(
        &self,
        url: &str,
        _events: &[&str],
    ) -> ProcessorResult<WebhookEndpoint> {
        let script = self.record("register_webhook");
        fail_or(
            script.register_error,
            WebhookEndpoint {
                id: "we_1".to_string(),
                url: url.to_string(),
                secret: script.endpoint_secret.map(SecretString::from),
            },
        )
    }

    /// Test payload: `{"id", "type", "kind", "external_id", "status", "error"}`.
    fn parse_webhook(&self, payload: &[u8]) -> ProcessorResult<ProcessorEvent> {
        let value: Value =
            serde_json::from_slice(payload).map_err(|e| ProcessorError::Decode(e.to_string()))?;
        let text = |key: &str| value[key].as_str().map(str::to_string);

        let kind = match value["kind"].as_str() {
            Some("terminal") => Some(PaymentKind::Terminal),
            Some("link") => Some(PaymentKind::Link),
            _ => None,
        };
        let update = kind.map(|kind| StatusUpdate {
            kind,
            external_id: text("external_id").unwrap_or_default(),
            status: text("status").unwrap_or_default(),
            amount: 1326,
            currency: "usd".to_string(),
            metadata: HashMap::new(),
            error: text("error"),
        });
        Ok(ProcessorEvent {
            id: text("id").unwrap_or_default(),
            event_type: text("type").unwrap_or_default(),
            update,
        })
    }
}

pub fn intent_event(intent_id: &str, status: &str, error: Option<&str>) -> Value {
    json!({
        "id": format!("evt_{intent_id}_{status}"),
        "type": format!("payment_intent.{status}"),
        "kind": "terminal",
        "external_id": intent_id,
        "status": status,
        "error": error,
    })
}

pub fn link_completed_event(link_id: &str) -> Value {
    json!({
        "id": format!("evt_{link_id}"),
        "type": "checkout.session.completed",
        "kind": "link",
        "external_id": link_id,
        "status": "completed",
    })
}

pub fn webhook_config() -> CoordinatorConfig {
    CoordinatorConfig {
        webhook_url: Some("https://till.example.test/webhooks".to_string()),
        ..CoordinatorConfig::default()
    }
    .with_strategy(tillpay::config::ReconciliationStrategy::Webhook)
}

pub struct Harness {
    pub coordinator: PaymentCoordinator,
    pub processor: Arc<MockProcessor>,
    pub cart: InMemoryCart,
    pub ledger: InMemoryLedger,
    pub notifier: BroadcastNotifier,
    signer: StripeSignatureVerifier,
}

impl Harness {
    /// Builds a coordinator over a sample cart with readers already loaded.
    pub async fn new(config: CoordinatorConfig) -> Self {
        Self::with_processor(config, MockProcessor::new()).await
    }

    pub async fn with_processor(config: CoordinatorConfig, processor: MockProcessor) -> Self {
        let processor = Arc::new(processor);
        let cart = InMemoryCart::with_sample_items();
        let ledger = InMemoryLedger::new();
        let notifier = BroadcastNotifier::default();
        let secret = SecretString::from(WEBHOOK_SECRET.to_string());
        let verifier = StripeSignatureVerifier::new(&secret, Duration::from_secs(300)).unwrap();
        let signer = StripeSignatureVerifier::new(&secret, Duration::from_secs(300)).unwrap();

        let coordinator = PaymentCoordinator::new(
            config,
            Collaborators {
                processor: processor.clone(),
                verifier: Arc::new(verifier),
                cart: Arc::new(cart.clone()),
                ledger: Arc::new(ledger.clone()),
                notifier: Arc::new(notifier.clone()),
            },
        );
        coordinator.refresh_readers().await.unwrap();

        Self {
            coordinator,
            processor,
            cart,
            ledger,
            notifier,
            signer,
        }
    }

    /// Serializes `event` and signs it with the configured webhook secret.
    pub fn signed(&self, event: &Value) -> (Vec<u8>, String) {
        let payload = event.to_string().into_bytes();
        let header = self
            .signer
            .sign_with_timestamp(&payload, chrono::Utc::now().timestamp());
        (payload, header)
    }

    pub async fn deliver(&self, event: &Value) -> tillpay::error::Result<Option<PollResponse>> {
        let (payload, header) = self.signed(event);
        self.coordinator.handle_webhook(&payload, Some(&header)).await
    }

    pub fn entry_types(&self) -> Vec<String> {
        self.ledger
            .entries()
            .into_iter()
            .map(|entry| entry.entry_type)
            .collect()
    }

    pub async fn cart_total(&self) -> rust_decimal::Decimal {
        use tillpay::domain::ports::CartService;
        self.cart.snapshot().await.unwrap().summary.total
    }
}

pub const SAMPLE_TOTAL: rust_decimal::Decimal = dec!(13.26);
