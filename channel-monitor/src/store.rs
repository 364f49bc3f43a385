use crate::types::{MonitorError, ProcessedItem, Result, StoreStats, Subscriber, TrackedChannel};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Row};
use std::str::FromStr;
use tracing::{debug, info};

/// Fixed-width RFC 3339 so that lexical order in SQL is chronological order.
pub(crate) fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

/// Cursor state, subscribers and the processed-item ledger.
///
/// Every method is a single statement committed on its own; nothing here
/// spans a fetch or a delivery.
pub struct ChannelStore {
    db: SqlitePool,
}

impl ChannelStore {
    /// Open (creating if needed) the database at `database_url` and bring the
    /// schema up to date.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let db = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { db };
        store.migrate().await?;
        Ok(store)
    }

    /// A private in-memory database. The pool is pinned to a single
    /// connection, since every SQLite memory connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { db };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.db).await?;
        debug!("Channel store schema is up to date");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    pub async fn close(&self) {
        self.db.close().await;
    }

    // Subscribers

    /// Register a subscriber, or reactivate and retitle an existing one.
    pub async fn register_subscriber(&self, subscriber_id: &str, title: Option<&str>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscribers (subscriber_id, title, is_active, registered_at)
            VALUES (?1, ?2, 1, ?3)
            ON CONFLICT (subscriber_id) DO UPDATE SET
                title = COALESCE(excluded.title, subscribers.title),
                is_active = 1
            "#,
        )
        .bind(subscriber_id)
        .bind(title)
        .bind(encode_timestamp(Utc::now()))
        .execute(&self.db)
        .await?;

        info!(subscriber_id, "Registered subscriber");
        Ok(())
    }

    /// Stop sweeping a subscriber's channels. Its state is kept.
    pub async fn deactivate_subscriber(&self, subscriber_id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE subscribers SET is_active = 0 WHERE subscriber_id = ?1")
            .bind(subscriber_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MonitorError::SubscriberNotFound { id: subscriber_id.to_string() });
        }

        info!(subscriber_id, "Deactivated subscriber");
        Ok(())
    }

    pub async fn get_subscriber(&self, subscriber_id: &str) -> Result<Option<Subscriber>> {
        let row = sqlx::query(
            "SELECT subscriber_id, title, is_active, registered_at FROM subscribers WHERE subscriber_id = ?1",
        )
        .bind(subscriber_id)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(r) => Ok(Some(Subscriber {
                subscriber_id: r.try_get("subscriber_id")?,
                title: r.try_get("title")?,
                is_active: r.try_get("is_active")?,
                registered_at: decode_timestamp(r.try_get::<&str, _>("registered_at")?)?,
            })),
            None => Ok(None),
        }
    }

    /// Like [`Self::get_subscriber`], but a missing subscriber is
    /// [`MonitorError::SubscriberNotFound`].
    pub async fn require_subscriber(&self, subscriber_id: &str) -> Result<Subscriber> {
        self.get_subscriber(subscriber_id)
            .await?
            .ok_or_else(|| MonitorError::SubscriberNotFound { id: subscriber_id.to_string() })
    }

    // Tracked channels

    /// Start tracking a channel for a subscriber. An existing
    /// `(subscriber_id, channel_id)` pair is reported as
    /// [`MonitorError::ChannelAlreadyTracked`] and left untouched.
    pub async fn add_tracked_channel(
        &self,
        subscriber_id: &str,
        channel_id: &str,
        channel_url: &str,
        channel_name: &str,
    ) -> Result<TrackedChannel> {
        let added_at = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO tracked_channels (subscriber_id, channel_id, channel_url, channel_name, added_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (subscriber_id, channel_id) DO NOTHING
            "#,
        )
        .bind(subscriber_id)
        .bind(channel_id)
        .bind(channel_url)
        .bind(channel_name)
        .bind(encode_timestamp(added_at))
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MonitorError::ChannelAlreadyTracked {
                subscriber_id: subscriber_id.to_string(),
                channel_id: channel_id.to_string(),
            });
        }

        info!(subscriber_id, channel_id, "Tracking channel {}", channel_name);
        Ok(TrackedChannel {
            subscriber_id: subscriber_id.to_string(),
            channel_id: channel_id.to_string(),
            channel_url: channel_url.to_string(),
            channel_name: channel_name.to_string(),
            cursor_item_id: None,
            last_checked_at: None,
            added_at: decode_timestamp(&encode_timestamp(added_at))?,
        })
    }

    /// Returns whether a channel was removed. Ledger entries are kept.
    pub async fn remove_tracked_channel(&self, subscriber_id: &str, channel_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tracked_channels WHERE subscriber_id = ?1 AND channel_id = ?2")
            .bind(subscriber_id)
            .bind(channel_id)
            .execute(&self.db)
            .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            info!(subscriber_id, channel_id, "Stopped tracking channel");
        } else {
            debug!(subscriber_id, channel_id, "No tracked channel to remove");
        }
        Ok(removed)
    }

    /// Same as [`Self::remove_tracked_channel`], keyed by the URL the channel
    /// was added with.
    pub async fn remove_tracked_channel_by_url(&self, subscriber_id: &str, channel_url: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tracked_channels WHERE subscriber_id = ?1 AND channel_url = ?2")
            .bind(subscriber_id)
            .bind(channel_url)
            .execute(&self.db)
            .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            info!(subscriber_id, channel_url, "Stopped tracking channel");
        }
        Ok(removed)
    }

    pub async fn get_tracked_channel(&self, subscriber_id: &str, channel_id: &str) -> Result<Option<TrackedChannel>> {
        let row = sqlx::query_as::<_, TrackedChannelRow>(
            r#"
            SELECT subscriber_id, channel_id, channel_url, channel_name, cursor_item_id, last_checked_at, added_at
            FROM tracked_channels
            WHERE subscriber_id = ?1 AND channel_id = ?2
            "#,
        )
        .bind(subscriber_id)
        .bind(channel_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(TrackedChannelRow::into_tracked_channel).transpose()
    }

    /// All channels tracked for one subscriber, by name.
    pub async fn get_tracked_channels(&self, subscriber_id: &str) -> Result<Vec<TrackedChannel>> {
        let rows = sqlx::query_as::<_, TrackedChannelRow>(
            r#"
            SELECT subscriber_id, channel_id, channel_url, channel_name, cursor_item_id, last_checked_at, added_at
            FROM tracked_channels
            WHERE subscriber_id = ?1
            ORDER BY channel_name
            "#,
        )
        .bind(subscriber_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TrackedChannelRow::into_tracked_channel).collect()
    }

    /// Every channel of every active subscriber, least recently checked
    /// first and never-checked channels ahead of all others.
    pub async fn get_all_active_tracked_channels(&self) -> Result<Vec<TrackedChannel>> {
        let rows = sqlx::query_as::<_, TrackedChannelRow>(
            r#"
            SELECT c.subscriber_id, c.channel_id, c.channel_url, c.channel_name,
                   c.cursor_item_id, c.last_checked_at, c.added_at
            FROM tracked_channels c
            JOIN subscribers s ON s.subscriber_id = c.subscriber_id
            WHERE s.is_active = 1
            ORDER BY c.last_checked_at ASC NULLS FIRST, c.id ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TrackedChannelRow::into_tracked_channel).collect()
    }

    /// Move a channel's cursor and stamp it as checked now. Returns false if
    /// the channel has been removed in the meantime.
    pub async fn update_cursor(&self, subscriber_id: &str, channel_id: &str, item_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tracked_channels
            SET cursor_item_id = ?1, last_checked_at = ?2
            WHERE subscriber_id = ?3 AND channel_id = ?4
            "#,
        )
        .bind(item_id)
        .bind(encode_timestamp(Utc::now()))
        .bind(subscriber_id)
        .bind(channel_id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // Processed-item ledger

    pub async fn has_processed(&self, item_id: &str, subscriber_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM processed_items WHERE item_id = ?1 AND subscriber_id = ?2")
            .bind(item_id)
            .bind(subscriber_id)
            .fetch_optional(&self.db)
            .await?;

        Ok(row.is_some())
    }

    /// Record an item as handled for a subscriber. Marking twice is a no-op;
    /// the return value tells whether this call inserted the record.
    pub async fn mark_processed(&self, item_id: &str, channel_id: &str, subscriber_id: &str) -> Result<bool> {
        self.mark_processed_at(item_id, channel_id, subscriber_id, Utc::now()).await
    }

    pub async fn mark_processed_at(
        &self,
        item_id: &str,
        channel_id: &str,
        subscriber_id: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_items (item_id, channel_id, subscriber_id, processed_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (item_id, subscriber_id) DO NOTHING
            "#,
        )
        .bind(item_id)
        .bind(channel_id)
        .bind(subscriber_id)
        .bind(encode_timestamp(processed_at))
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_processed_item(&self, item_id: &str, subscriber_id: &str) -> Result<Option<ProcessedItem>> {
        let row = sqlx::query(
            r#"
            SELECT item_id, subscriber_id, channel_id, processed_at
            FROM processed_items
            WHERE item_id = ?1 AND subscriber_id = ?2
            "#,
        )
        .bind(item_id)
        .bind(subscriber_id)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(r) => Ok(Some(ProcessedItem {
                item_id: r.try_get("item_id")?,
                subscriber_id: r.try_get("subscriber_id")?,
                channel_id: r.try_get("channel_id")?,
                processed_at: decode_timestamp(r.try_get::<&str, _>("processed_at")?)?,
            })),
            None => Ok(None),
        }
    }

    /// Delete ledger entries processed more than `days` days ago. Returns
    /// how many were deleted. A cutoff before the earliest representable
    /// date is a [`MonitorError::Validation`] error.
    pub async fn cleanup_processed_older_than(&self, days: u32) -> Result<u64> {
        let cutoff = Duration::try_days(days as i64)
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .ok_or_else(|| MonitorError::Validation(format!("retention of {} days is out of range", days)))?;

        let result = sqlx::query("DELETE FROM processed_items WHERE processed_at < ?1")
            .bind(encode_timestamp(cutoff))
            .execute(&self.db)
            .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            info!("Cleaned up {} processed item records older than {} days", deleted, days);
        }
        Ok(deleted)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM subscribers) AS subscribers,
                (SELECT COUNT(*) FROM subscribers WHERE is_active = 1) AS active_subscribers,
                (SELECT COUNT(*) FROM tracked_channels) AS tracked_channels,
                (SELECT COUNT(*) FROM tracked_channels WHERE last_checked_at IS NULL) AS never_checked,
                (SELECT COUNT(*) FROM processed_items) AS processed_items
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        Ok(StoreStats {
            subscribers: row.try_get("subscribers")?,
            active_subscribers: row.try_get("active_subscribers")?,
            tracked_channels: row.try_get("tracked_channels")?,
            never_checked: row.try_get("never_checked")?,
            processed_items: row.try_get("processed_items")?,
        })
    }
}

#[derive(Debug, FromRow)]
struct TrackedChannelRow {
    subscriber_id: String,
    channel_id: String,
    channel_url: String,
    channel_name: String,
    cursor_item_id: Option<String>,
    last_checked_at: Option<String>,
    added_at: String,
}

impl TrackedChannelRow {
    fn into_tracked_channel(self) -> Result<TrackedChannel> {
        Ok(TrackedChannel {
            subscriber_id: self.subscriber_id,
            channel_id: self.channel_id,
            channel_url: self.channel_url,
            channel_name: self.channel_name,
            cursor_item_id: self.cursor_item_id,
            last_checked_at: self.last_checked_at.as_deref().map(decode_timestamp).transpose()?,
            added_at: decode_timestamp(&self.added_at)?,
        })
    }
}
