use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
// Collaborator contracts live in the interfaces crate
pub use interfaces::{ContentSource, DeliveryOutcome, Item, Notifier, ResolvedChannel, SourceError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub subscriber_id: String,
    pub title: Option<String>,
    pub is_active: bool,
    pub registered_at: DateTime<Utc>,
}

/// One channel monitored on behalf of one subscriber, with its cursor state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedChannel {
    pub subscriber_id: String,
    pub channel_id: String,
    pub channel_url: String,
    pub channel_name: String,
    pub cursor_item_id: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedItem {
    pub item_id: String,
    pub subscriber_id: String,
    pub channel_id: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub subscribers: i64,
    pub active_subscribers: i64,
    pub tracked_channels: i64,
    pub never_checked: i64,
    pub processed_items: i64,
}

/// What a single `check_channel` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckOutcome {
    pub fetched: usize,
    pub admitted: usize,
    pub delivered: usize,
    pub delivery_failures: usize,
    pub cursor: Option<String>,
    /// Set when a warm cursor was not found in the fetched window.
    pub cursor_gap: bool,
    /// Set when shutdown was requested before every admitted item was handled.
    pub interrupted: bool,
}

/// Totals for one sweep over all active tracked channels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub channels_checked: usize,
    pub channels_failed: usize,
    pub items_delivered: usize,
    pub delivery_failures: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub api_base_url: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "channel-monitor/0.1".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 2,
            api_base_url: "https://www.googleapis.com/youtube/v3".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Content source error: {0}")]
    Source(#[from] SourceError),

    #[error("Invalid channel: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Channel {channel_id} is already tracked for subscriber {subscriber_id}")]
    ChannelAlreadyTracked { subscriber_id: String, channel_id: String },

    #[error("Channel {channel} is not tracked for subscriber {subscriber_id}")]
    ChannelNotTracked { subscriber_id: String, channel: String },

    #[error("Subscriber not found: {id}")]
    SubscriberNotFound { id: String },

    #[error("Corrupt stored timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
