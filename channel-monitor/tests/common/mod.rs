#![allow(dead_code)]

use async_trait::async_trait;
use channel_monitor::{
    ChannelStore, ContentSource, DeliveryOutcome, Item, MonitorConfig, MonitorEngine, Notifier, ResolvedChannel,
    SourceError,
};
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub const SUBSCRIBER: &str = "-1001234567890";
pub const CHANNEL: &str = "UCchannel000000000000001";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A regular upload published `hours_ago` hours before now.
pub fn video(id: &str, hours_ago: i64) -> Item {
    Item {
        item_id: id.to_string(),
        title: format!("Video {}", id),
        description: format!("Description of {}", id),
        published_at: Utc::now() - Duration::hours(hours_ago),
        url: format!("https://www.youtube.com/watch?v={}", id),
        thumbnail: Some(format!("https://i.ytimg.com/vi/{}/mqdefault.jpg", id)),
        channel_title: "Test Channel".to_string(),
        is_live: false,
    }
}

pub fn live(id: &str) -> Item {
    Item {
        is_live: true,
        ..video(id, 0)
    }
}

/// Scripted content source. Channels without a script return no items.
#[derive(Default)]
pub struct FakeSource {
    latest: Mutex<HashMap<String, Vec<Item>>>,
    live: Mutex<HashMap<String, Vec<Item>>>,
    failing_latest: Mutex<HashSet<String>>,
    failing_live: Mutex<HashSet<String>>,
    pub latest_calls: AtomicUsize,
    pub live_calls: AtomicUsize,
}

impl FakeSource {
    pub fn set_latest(&self, channel_id: &str, items: Vec<Item>) {
        self.latest.lock().unwrap().insert(channel_id.to_string(), items);
    }

    pub fn set_live(&self, channel_id: &str, items: Vec<Item>) {
        self.live.lock().unwrap().insert(channel_id.to_string(), items);
    }

    pub fn fail_latest(&self, channel_id: &str) {
        self.failing_latest.lock().unwrap().insert(channel_id.to_string());
    }

    pub fn fail_live(&self, channel_id: &str) {
        self.failing_live.lock().unwrap().insert(channel_id.to_string());
    }

    pub fn latest_calls(&self) -> usize {
        self.latest_calls.load(Ordering::SeqCst)
    }

    pub fn live_calls(&self) -> usize {
        self.live_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn fetch_latest_items(&self, channel_id: &str, count: usize) -> Result<Vec<Item>, SourceError> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_latest.lock().unwrap().contains(channel_id) {
            return Err(SourceError::Api { status: 503, message: "backend unavailable".to_string() });
        }
        let items = self.latest.lock().unwrap().get(channel_id).cloned().unwrap_or_default();
        Ok(items.into_iter().take(count).collect())
    }

    async fn fetch_live_items(&self, channel_id: &str) -> Result<Vec<Item>, SourceError> {
        self.live_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_live.lock().unwrap().contains(channel_id) {
            return Err(SourceError::Http("connection reset".to_string()));
        }
        Ok(self.live.lock().unwrap().get(channel_id).cloned().unwrap_or_default())
    }

    async fn resolve_channel(&self, url: &str) -> Result<ResolvedChannel, SourceError> {
        Err(SourceError::NotFound(url.to_string()))
    }
}

/// Records every delivery. Items listed with `fail_item` report a failure,
/// and `cancel_after` trips a token once that many deliveries were made.
#[derive(Default)]
pub struct RecordingNotifier {
    deliveries: Mutex<Vec<(String, String)>>,
    failing: Mutex<HashSet<String>>,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl RecordingNotifier {
    pub fn fail_item(&self, item_id: &str) {
        self.failing.lock().unwrap().insert(item_id.to_string());
    }

    pub fn cancel_after(&self, deliveries: usize, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((deliveries, token));
    }

    pub fn delivered_ids(&self) -> Vec<String> {
        self.deliveries.lock().unwrap().iter().map(|(_, item)| item.clone()).collect()
    }

    pub fn deliveries(&self) -> Vec<(String, String)> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.deliveries.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, subscriber_id: &str, item: &Item) -> DeliveryOutcome {
        let count = {
            let mut deliveries = self.deliveries.lock().unwrap();
            deliveries.push((subscriber_id.to_string(), item.item_id.clone()));
            deliveries.len()
        };

        if let Some((limit, token)) = self.cancel_after.lock().unwrap().as_ref() {
            if count >= *limit {
                token.cancel();
            }
        }

        if self.failing.lock().unwrap().contains(&item.item_id) {
            DeliveryOutcome::Failed("chat not found".to_string())
        } else {
            DeliveryOutcome::Delivered
        }
    }
}

pub struct Harness {
    pub store: Arc<ChannelStore>,
    pub source: Arc<FakeSource>,
    pub notifier: Arc<RecordingNotifier>,
    pub engine: Arc<MonitorEngine>,
}

impl Harness {
    pub async fn new() -> channel_monitor::Result<Self> {
        Self::with_config(MonitorConfig::default().without_delays()).await
    }

    pub async fn with_config(config: MonitorConfig) -> channel_monitor::Result<Self> {
        init_tracing();
        let store = Arc::new(ChannelStore::in_memory().await?);
        let source = Arc::new(FakeSource::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = Arc::new(MonitorEngine::new(
            store.clone(),
            source.clone(),
            notifier.clone(),
            config,
        ));

        Ok(Self {
            store,
            source,
            notifier,
            engine,
        })
    }

    /// Register `subscriber_id` and track `channel_id` for it.
    pub async fn track(&self, subscriber_id: &str, channel_id: &str) -> channel_monitor::Result<()> {
        self.store.register_subscriber(subscriber_id, Some("Test group")).await?;
        self.store
            .add_tracked_channel(
                subscriber_id,
                channel_id,
                &format!("https://www.youtube.com/channel/{}", channel_id),
                &format!("Channel {}", channel_id),
            )
            .await?;
        Ok(())
    }

    /// Check a channel with its current stored state.
    pub async fn check(&self, subscriber_id: &str, channel_id: &str) -> channel_monitor::Result<channel_monitor::CheckOutcome> {
        let channel = self
            .store
            .get_tracked_channel(subscriber_id, channel_id)
            .await?
            .expect("channel is tracked");
        self.engine.check_channel(&channel, &CancellationToken::new()).await
    }

    pub async fn cursor(&self, subscriber_id: &str, channel_id: &str) -> Option<String> {
        self.store
            .get_tracked_channel(subscriber_id, channel_id)
            .await
            .unwrap()
            .and_then(|channel| channel.cursor_item_id)
    }
}
