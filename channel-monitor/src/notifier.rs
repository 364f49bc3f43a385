use crate::types::{DeliveryOutcome, Item, Notifier};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Writes every delivery to the log. Useful for dry runs.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, subscriber_id: &str, item: &Item) -> DeliveryOutcome {
        let kind = if item.is_live { "Live stream" } else { "New video" };
        info!(subscriber_id, item_id = %item.item_id, "{}: {} from {} ({})", kind, item.title, item.channel_title, item.url);
        DeliveryOutcome::Delivered
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    subscriber_id: &'a str,
    item: &'a Item,
}

/// POSTs each delivery as JSON to a fixed URL. Anything but a 2xx answer is
/// a failed delivery.
pub struct WebhookNotifier {
    client: Client,
    endpoint: String,
}

impl WebhookNotifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, subscriber_id: &str, item: &Item) -> DeliveryOutcome {
        let payload = WebhookPayload { subscriber_id, item };

        let response = match self.client.post(&self.endpoint).json(&payload).send().await {
            Ok(response) => response,
            Err(e) => return DeliveryOutcome::Failed(e.to_string()),
        };

        let outcome = outcome_for_status(response.status());
        if outcome.is_delivered() {
            debug!(subscriber_id, item_id = %item.item_id, "Webhook accepted delivery");
        }
        outcome
    }
}

fn outcome_for_status(status: StatusCode) -> DeliveryOutcome {
    if status.is_success() {
        DeliveryOutcome::Delivered
    } else {
        DeliveryOutcome::Failed(format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        ))
    }
}
