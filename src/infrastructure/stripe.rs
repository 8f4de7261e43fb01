use crate::domain::payment::PaymentKind;
use crate::domain::ports::PaymentProcessor;
use crate::domain::processor::{
    CheckoutSession, IntentChannel, IntentRequest, IntentStatus, LINK_COMPLETED, LinkRequest,
    PaymentIntent, PaymentLink, ProcessorError, ProcessorEvent, ProcessorResult, Reader,
    ReaderAction, ReaderActionStatus, StatusUpdate, WebhookEndpoint,
};
use async_trait::async_trait;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_BASE_URL: &str = "https://api.stripe.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

type Form = Vec<(String, String)>;

/// REST adapter for the card processor.
///
/// Every POST carries a fresh `Idempotency-Key` so transport retries at the
/// HTTP layer cannot create duplicate intents or links.
pub struct StripeClient {
    http: Client,
    api_key: SecretString,
    base_url: String,
}

impl StripeClient {
    pub fn new(api_key: SecretString, base_url: impl Into<String>) -> ProcessorResult<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProcessorError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> ProcessorResult<T> {
        debug!(path, "GET");
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(self.api_key.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|e| ProcessorError::Transport(e.to_string()))?;
        decode(response).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, form: &Form) -> ProcessorResult<T> {
        debug!(path, "POST");
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(self.api_key.expose_secret())
            .header("Idempotency-Key", Uuid::new_v4().to_string())
            .form(form)
            .send()
            .await
            .map_err(|e| ProcessorError::Transport(e.to_string()))?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> ProcessorResult<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProcessorError::Transport(e.to_string()))?;
    if !status.is_success() {
        return Err(map_error(status.as_u16(), &body));
    }
    serde_json::from_str(&body).map_err(|e| ProcessorError::Decode(e.to_string()))
}

fn map_error(status: u16, body: &str) -> ProcessorError {
    let Ok(ApiErrorEnvelope { error }) = serde_json::from_str::<ApiErrorEnvelope>(body) else {
        return ProcessorError::Api {
            status,
            message: body.to_string(),
        };
    };
    let message = error
        .message
        .unwrap_or_else(|| format!("request failed with status {status}"));
    if error.kind.as_deref() == Some("card_error") {
        return ProcessorError::Declined {
            code: error.code,
            message,
        };
    }

    let code = error.code.unwrap_or_default();
    if code == "resource_missing" {
        ProcessorError::ResourceMissing(message)
    } else if code.contains("action_not_allowed")
        || code.contains("intent_invalid_state")
        || code == "payment_intent_unexpected_state"
    {
        ProcessorError::ActionNotAllowed(message)
    } else {
        ProcessorError::Api { status, message }
    }
}

fn metadata_fields(form: &mut Form, metadata: &HashMap<String, String>) {
    for (key, value) in metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
    }
}

fn kind_from_metadata(metadata: &HashMap<String, String>) -> PaymentKind {
    match metadata.get("payment_type").map(String::as_str) {
        Some("manual") => PaymentKind::Manual,
        Some("link") => PaymentKind::Link,
        _ => PaymentKind::Terminal,
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiList<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ApiIntent {
    id: String,
    status: IntentStatus,
    amount: i64,
    currency: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    last_payment_error: Option<ApiErrorBody>,
}

impl From<ApiIntent> for PaymentIntent {
    fn from(intent: ApiIntent) -> Self {
        Self {
            id: intent.id,
            status: intent.status,
            amount: intent.amount,
            currency: intent.currency,
            last_error: intent
                .last_payment_error
                .map(|e| e.message.unwrap_or_else(|| "the payment failed".to_string())),
            metadata: intent.metadata,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiReader {
    id: String,
    label: Option<String>,
    location: Option<String>,
    action: Option<ApiReaderAction>,
}

#[derive(Debug, Deserialize)]
struct ApiReaderAction {
    status: String,
    failure_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiLink {
    id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ApiWebhookEndpoint {
    id: String,
    url: String,
    status: Option<String>,
    secret: Option<String>,
}

impl From<ApiWebhookEndpoint> for WebhookEndpoint {
    fn from(endpoint: ApiWebhookEndpoint) -> Self {
        Self {
            id: endpoint.id,
            url: endpoint.url,
            secret: endpoint.secret.map(SecretString::from),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiSession {
    id: String,
    amount_total: Option<i64>,
    currency: Option<String>,
    payment_link: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ApiEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: ApiEventData,
}

#[derive(Debug, Deserialize)]
struct ApiEventData {
    object: serde_json::Value,
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn create_payment_intent(
        &self,
        request: &IntentRequest,
    ) -> ProcessorResult<PaymentIntent> {
        let method_type = match request.channel {
            IntentChannel::CardPresent => "card_present",
            IntentChannel::Card => "card",
        };
        let mut form: Form = vec![
            ("amount".to_string(), request.amount.to_string()),
            ("currency".to_string(), request.currency.clone()),
            ("payment_method_types[]".to_string(), method_type.to_string()),
            ("capture_method".to_string(), "automatic".to_string()),
        ];
        if let Some(method) = &request.payment_method {
            form.push(("payment_method".to_string(), method.clone()));
        }
        if request.confirm {
            form.push(("confirm".to_string(), "true".to_string()));
        }
        if let Some(email) = &request.receipt_email {
            form.push(("receipt_email".to_string(), email.clone()));
        }
        metadata_fields(&mut form, &request.metadata);

        let intent: ApiIntent = self.post("/payment_intents", &form).await?;
        Ok(intent.into())
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> ProcessorResult<PaymentIntent> {
        let intent: ApiIntent = self.get(&format!("/payment_intents/{intent_id}"), &[]).await?;
        Ok(intent.into())
    }

    async fn cancel_payment_intent(&self, intent_id: &str) -> ProcessorResult<()> {
        let _: ApiId = self
            .post(&format!("/payment_intents/{intent_id}/cancel"), &Form::new())
            .await?;
        Ok(())
    }

    async fn list_online_readers(&self) -> ProcessorResult<Vec<Reader>> {
        let readers: ApiList<ApiReader> = self
            .get("/terminal/readers", &[("status", "online")])
            .await?;
        Ok(readers
            .data
            .into_iter()
            .map(|r| Reader {
                id: r.id,
                label: r.label,
                location: r.location,
            })
            .collect())
    }

    async fn process_payment_on_reader(
        &self,
        reader_id: &str,
        intent_id: &str,
        skip_tipping: bool,
    ) -> ProcessorResult<ReaderAction> {
        let form: Form = vec![
            ("payment_intent".to_string(), intent_id.to_string()),
            (
                "process_config[skip_tipping]".to_string(),
                skip_tipping.to_string(),
            ),
        ];
        let reader: ApiReader = self
            .post(
                &format!("/terminal/readers/{reader_id}/process_payment_intent"),
                &form,
            )
            .await?;

        let (status, failure_message) = match reader.action {
            Some(action) => {
                let status = match action.status.as_str() {
                    "in_progress" => ReaderActionStatus::InProgress,
                    "succeeded" => ReaderActionStatus::Succeeded,
                    "failed" => ReaderActionStatus::Failed,
                    other => ReaderActionStatus::Unknown(other.to_string()),
                };
                (status, action.failure_message)
            }
            None => (ReaderActionStatus::Unknown("missing".to_string()), None),
        };
        Ok(ReaderAction {
            reader_id: reader.id,
            status,
            failure_message,
        })
    }

    async fn cancel_reader_action(&self, reader_id: &str) -> ProcessorResult<()> {
        let _: ApiId = self
            .post(&format!("/terminal/readers/{reader_id}/cancel_action"), &Form::new())
            .await?;
        Ok(())
    }

    async fn create_payment_link(&self, request: &LinkRequest) -> ProcessorResult<PaymentLink> {
        // Links are priced, so a one-off price is created for the cart first.
        let price_form: Form = vec![
            ("currency".to_string(), request.currency.clone()),
            ("unit_amount".to_string(), request.amount.to_string()),
            ("product_data[name]".to_string(), request.description.clone()),
        ];
        let price: ApiId = self.post("/prices", &price_form).await?;

        let mut form: Form = vec![
            ("line_items[0][price]".to_string(), price.id),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
        ];
        metadata_fields(&mut form, &request.metadata);
        let link: ApiLink = self.post("/payment_links", &form).await?;
        Ok(PaymentLink {
            id: link.id,
            url: link.url,
        })
    }

    async fn deactivate_payment_link(&self, link_id: &str) -> ProcessorResult<()> {
        let form: Form = vec![("active".to_string(), "false".to_string())];
        let _: ApiId = self
            .post(&format!("/payment_links/{link_id}"), &form)
            .await?;
        Ok(())
    }

    async fn list_completed_sessions(
        &self,
        link_id: &str,
    ) -> ProcessorResult<Vec<CheckoutSession>> {
        let sessions: ApiList<ApiSession> = self
            .get(
                "/checkout/sessions",
                &[("payment_link", link_id), ("status", "complete")],
            )
            .await?;
        Ok(sessions
            .data
            .into_iter()
            .map(|s| CheckoutSession {
                id: s.id,
                amount_total: s.amount_total,
                currency: s.currency,
            })
            .collect())
    }

    async fn register_webhook(
        &self,
        url: &str,
        events: &[&str],
    ) -> ProcessorResult<WebhookEndpoint> {
        let existing: ApiList<ApiWebhookEndpoint> =
            self.get("/webhook_endpoints", &[("limit", "100")]).await?;
        if let Some(endpoint) = existing
            .data
            .into_iter()
            .find(|e| e.url == url && e.status.as_deref() != Some("disabled"))
        {
            debug!(endpoint_id = %endpoint.id, "Reusing webhook endpoint");
            // Listed endpoints never carry their secret.
            return Ok(WebhookEndpoint {
                secret: None,
                ..endpoint.into()
            });
        }

        let mut form: Form = vec![("url".to_string(), url.to_string())];
        form.extend(
            events
                .iter()
                .enumerate()
                .map(|(i, event)| (format!("enabled_events[{i}]"), event.to_string())),
        );
        let endpoint: ApiWebhookEndpoint = self.post("/webhook_endpoints", &form).await?;
        Ok(endpoint.into())
    }

    fn parse_webhook(&self, payload: &[u8]) -> ProcessorResult<ProcessorEvent> {
        let event: ApiEvent =
            serde_json::from_slice(payload).map_err(|e| ProcessorError::Decode(e.to_string()))?;

        let update = if event.event_type.starts_with("payment_intent.") {
            let intent: ApiIntent = serde_json::from_value(event.data.object)
                .map_err(|e| ProcessorError::Decode(e.to_string()))?;
            let kind = kind_from_metadata(&intent.metadata);
            let intent = PaymentIntent::from(intent);
            Some(StatusUpdate {
                kind,
                external_id: intent.id,
                status: intent.status.as_str().to_string(),
                amount: intent.amount,
                currency: intent.currency,
                metadata: intent.metadata,
                error: intent.last_error,
            })
        } else if event.event_type == "checkout.session.completed" {
            let session: ApiSession = serde_json::from_value(event.data.object)
                .map_err(|e| ProcessorError::Decode(e.to_string()))?;
            session.payment_link.map(|link_id| StatusUpdate {
                kind: PaymentKind::Link,
                external_id: link_id,
                status: LINK_COMPLETED.to_string(),
                amount: session.amount_total.unwrap_or_default(),
                currency: session.currency.unwrap_or_default(),
                metadata: session.metadata,
                error: None,
            })
        } else {
            None
        };

        Ok(ProcessorEvent {
            id: event.id,
            event_type: event.event_type,
            update,
        })
    }
}
