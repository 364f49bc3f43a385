use crate::admission::{admit_live, admit_regular, delivery_order};
use crate::config::MonitorConfig;
use crate::store::ChannelStore;
use crate::types::{CheckOutcome, ContentSource, DeliveryOutcome, Item, Notifier, Result, TrackedChannel};
use crate::utils::time::pause;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Fetches one tracked channel, decides which items are new, hands them to
/// the notifier oldest first, and moves the channel's cursor.
pub struct MonitorEngine {
    store: Arc<ChannelStore>,
    source: Arc<dyn ContentSource>,
    notifier: Arc<dyn Notifier>,
    config: MonitorConfig,
}

impl MonitorEngine {
    pub fn new(
        store: Arc<ChannelStore>,
        source: Arc<dyn ContentSource>,
        notifier: Arc<dyn Notifier>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            source,
            notifier,
            config,
        }
    }

    pub fn store(&self) -> Arc<ChannelStore> {
        self.store.clone()
    }

    pub fn source(&self) -> Arc<dyn ContentSource> {
        self.source.clone()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Check one channel for one subscriber.
    ///
    /// Fetch failures return early with nothing written, so the channel is
    /// simply retried on the next sweep from the same cursor. Once
    /// deliveries start, every item is recorded in the ledger whether or not
    /// the notifier succeeded. Shutdown is honoured between items only.
    pub async fn check_channel(&self, channel: &TrackedChannel, shutdown: &CancellationToken) -> Result<CheckOutcome> {
        let subscriber_id = channel.subscriber_id.as_str();
        let channel_id = channel.channel_id.as_str();
        let mut outcome = CheckOutcome {
            cursor: channel.cursor_item_id.clone(),
            ..Default::default()
        };

        let fetched = self
            .source
            .fetch_latest_items(channel_id, self.config.max_items_per_check)
            .await?;
        outcome.fetched = fetched.len();

        if fetched.is_empty() {
            debug!(subscriber_id, channel_id, "No items found for channel {}", channel.channel_name);
            return Ok(outcome);
        }

        let processed = self.processed_ids(&fetched, subscriber_id).await?;
        let regular = admit_regular(
            &fetched,
            channel.cursor_item_id.as_deref(),
            &processed,
            Utc::now(),
            self.config.recency_window(),
        );

        if regular.cursor_gap {
            warn!(
                subscriber_id,
                channel_id,
                cursor = channel.cursor_item_id.as_deref().unwrap_or_default(),
                "Cursor not found in the latest {} items of {}; admitting everything not yet processed",
                fetched.len(),
                channel.channel_name
            );
        }
        outcome.cursor_gap = regular.cursor_gap;

        let live = self.source.fetch_live_items(channel_id).await?;
        let live_processed = self.processed_ids(&live, subscriber_id).await?;
        let live = {
            let regular_ids: HashSet<&str> = regular.admitted.iter().map(|item| item.item_id.as_str()).collect();
            admit_live(&live, &live_processed, &regular_ids)
        };

        let to_deliver = delivery_order(regular.admitted, live);
        outcome.admitted = to_deliver.len();

        if to_deliver.is_empty() {
            // Keep the cursor following the channel even when nothing qualified.
            let newest = &fetched[0].item_id;
            self.advance_cursor(subscriber_id, channel_id, newest).await?;
            outcome.cursor = Some(newest.clone());
            debug!(subscriber_id, channel_id, cursor = %newest, "Nothing new for {}", channel.channel_name);
            return Ok(outcome);
        }

        info!(
            subscriber_id,
            channel_id,
            "Found {} new items for {}",
            to_deliver.len(),
            channel.channel_name
        );

        for (index, item) in to_deliver.iter().enumerate() {
            if index > 0 && !pause(self.config.inter_delivery_delay(), shutdown).await {
                outcome.interrupted = true;
                break;
            }
            if shutdown.is_cancelled() {
                outcome.interrupted = true;
                break;
            }

            match self.notifier.deliver(subscriber_id, item).await {
                DeliveryOutcome::Delivered => {
                    outcome.delivered += 1;
                    info!(subscriber_id, item_id = %item.item_id, live = item.is_live, "Delivered '{}'", item.title);
                }
                DeliveryOutcome::Failed(reason) => {
                    outcome.delivery_failures += 1;
                    warn!(subscriber_id, item_id = %item.item_id, "Delivery failed, not retrying: {}", reason);
                }
            }

            self.store.mark_processed(&item.item_id, channel_id, subscriber_id).await?;

            if !item.is_live {
                self.advance_cursor(subscriber_id, channel_id, &item.item_id).await?;
                outcome.cursor = Some(item.item_id.clone());
            }
        }

        if outcome.interrupted {
            info!(subscriber_id, channel_id, "Shutdown requested; remaining items wait for the next run");
        }

        Ok(outcome)
    }

    async fn processed_ids(&self, items: &[Item], subscriber_id: &str) -> Result<HashSet<String>> {
        let mut processed = HashSet::new();
        for item in items {
            if self.store.has_processed(&item.item_id, subscriber_id).await? {
                processed.insert(item.item_id.clone());
            }
        }
        Ok(processed)
    }

    async fn advance_cursor(&self, subscriber_id: &str, channel_id: &str, item_id: &str) -> Result<()> {
        if !self.store.update_cursor(subscriber_id, channel_id, item_id).await? {
            // Removed while we were checking it; nothing left to update.
            debug!(subscriber_id, channel_id, "Channel no longer tracked, cursor update dropped");
        }
        Ok(())
    }
}
