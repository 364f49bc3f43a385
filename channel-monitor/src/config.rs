use crate::types::{MonitorError, Result};
use chrono::Duration as ChronoDuration;
use clap::Args;
use std::time::Duration;

/// Ten years. Longer windows and intervals are rejected by `validate`.
const MAX_HOURS: u64 = 87_600;
const MAX_RETENTION_DAYS: u32 = 3_650;
const MAX_POLL_INTERVAL_MINUTES: u64 = MAX_HOURS * 60;

/// Tunables for the monitor. Every field can be set on the command line or
/// through the environment variable named next to it.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct MonitorConfig {
    /// Minutes to sleep between sweeps
    #[arg(long, env = "POLL_INTERVAL_MINUTES", default_value_t = 15)]
    pub poll_interval_minutes: u64,

    /// How many recent items to fetch per channel per sweep
    #[arg(long, env = "MAX_ITEMS_PER_CHECK", default_value_t = 5)]
    pub max_items_per_check: usize,

    /// On a channel's first sweep, only items this recent are delivered
    #[arg(long, env = "RECENCY_WINDOW_HOURS", default_value_t = 24)]
    pub recency_window_hours: u64,

    /// Ledger entries older than this are deleted by retention cleanup
    #[arg(long, env = "RETENTION_DAYS", default_value_t = 30)]
    pub retention_days: u32,

    #[arg(long, env = "INTER_CHANNEL_DELAY_SECONDS", default_value_t = 1)]
    pub inter_channel_delay_seconds: u64,

    #[arg(long, env = "INTER_DELIVERY_DELAY_SECONDS", default_value_t = 2)]
    pub inter_delivery_delay_seconds: u64,

    /// How often the scheduler runs retention cleanup
    #[arg(long, env = "CLEANUP_INTERVAL_HOURS", default_value_t = 24)]
    pub cleanup_interval_hours: u64,

    /// Pause after a sweep fails outright
    #[arg(long, env = "SWEEP_FAILURE_BACKOFF_SECONDS", default_value_t = 60)]
    pub sweep_failure_backoff_seconds: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_minutes: 15,
            max_items_per_check: 5,
            recency_window_hours: 24,
            retention_days: 30,
            inter_channel_delay_seconds: 1,
            inter_delivery_delay_seconds: 2,
            cleanup_interval_hours: 24,
            sweep_failure_backoff_seconds: 60,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_minutes == 0 {
            return Err(MonitorError::Config("poll_interval_minutes must be at least 1".to_string()));
        }
        if self.max_items_per_check == 0 {
            return Err(MonitorError::Config("max_items_per_check must be at least 1".to_string()));
        }
        if self.recency_window_hours == 0 {
            return Err(MonitorError::Config("recency_window_hours must be at least 1".to_string()));
        }
        if self.poll_interval_minutes > MAX_POLL_INTERVAL_MINUTES {
            return Err(MonitorError::Config(format!(
                "poll_interval_minutes must be at most {}",
                MAX_POLL_INTERVAL_MINUTES
            )));
        }
        if self.recency_window_hours > MAX_HOURS {
            return Err(MonitorError::Config(format!("recency_window_hours must be at most {}", MAX_HOURS)));
        }
        if self.cleanup_interval_hours > MAX_HOURS {
            return Err(MonitorError::Config(format!("cleanup_interval_hours must be at most {}", MAX_HOURS)));
        }
        if self.retention_days > MAX_RETENTION_DAYS {
            return Err(MonitorError::Config(format!(
                "retention_days must be at most {}",
                MAX_RETENTION_DAYS
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_minutes.saturating_mul(60))
    }

    pub fn recency_window(&self) -> ChronoDuration {
        ChronoDuration::hours(self.recency_window_hours.min(MAX_HOURS) as i64)
    }

    pub fn inter_channel_delay(&self) -> Duration {
        Duration::from_secs(self.inter_channel_delay_seconds)
    }

    pub fn inter_delivery_delay(&self) -> Duration {
        Duration::from_secs(self.inter_delivery_delay_seconds)
    }

    pub fn cleanup_interval(&self) -> ChronoDuration {
        ChronoDuration::hours(self.cleanup_interval_hours.min(MAX_HOURS) as i64)
    }

    pub fn sweep_failure_backoff(&self) -> Duration {
        Duration::from_secs(self.sweep_failure_backoff_seconds)
    }

    /// Same settings with every pause removed, for tests and one-shot sweeps.
    pub fn without_delays(mut self) -> Self {
        self.inter_channel_delay_seconds = 0;
        self.inter_delivery_delay_seconds = 0;
        self.sweep_failure_backoff_seconds = 0;
        self
    }
}
