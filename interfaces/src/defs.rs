use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One piece of content published by a channel, as returned by a
/// [`ContentSource`]. Only `item_id` outlives a sweep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub item_id: String,
    pub title: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
    pub url: String,
    pub thumbnail: Option<String>,
    pub channel_title: String,
    pub is_live: bool,
}

/// A channel URL resolved against the content source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedChannel {
    pub channel_id: String,
    pub channel_name: String,
}

/// Result of handing one item to one subscriber.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Channel not found: {0}")]
    NotFound(String),

    #[error("Invalid channel URL: {0}")]
    InvalidUrl(String),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl SourceError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Http(_) => true,
            SourceError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

// Object style note:
// Implementations own their own timeout and rate-limit discipline. The
// monitor calls them strictly one at a time and never cancels a call midway.

/// Where items come from.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Up to `count` most recent regular items, newest first.
    async fn fetch_latest_items(&self, channel_id: &str, count: usize) -> Result<Vec<Item>, SourceError>;

    /// Items currently live on the channel. Every returned item has `is_live == true`.
    async fn fetch_live_items(&self, channel_id: &str) -> Result<Vec<Item>, SourceError>;

    /// Turn a user supplied channel URL into a channel id and display name.
    async fn resolve_channel(&self, url: &str) -> Result<ResolvedChannel, SourceError>;
}

/// Where items go.
///
/// Delivery is best effort: failures are reported through the returned
/// [`DeliveryOutcome`] and must never panic or block indefinitely.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, subscriber_id: &str, item: &Item) -> DeliveryOutcome;
}
