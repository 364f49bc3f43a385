use crate::engine::MonitorEngine;
use crate::types::{Result, SweepReport};
use crate::utils::time::{pause, should_run};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// One pass over every active tracked channel, strictly one at a time.
///
/// Per-channel failures are logged and counted; only a failure to list the
/// channels fails the sweep as a whole.
pub async fn sweep(engine: Arc<MonitorEngine>, shutdown: CancellationToken) -> Result<SweepReport> {
    let mut report = SweepReport::default();
    let channels = engine.store().get_all_active_tracked_channels().await?;

    if channels.is_empty() {
        debug!("No channels to monitor");
        return Ok(report);
    }

    info!("Checking {} channels for new items", channels.len());

    for (index, channel) in channels.iter().enumerate() {
        if index > 0 && !pause(engine.config().inter_channel_delay(), &shutdown).await {
            report.cancelled = true;
            break;
        }
        if shutdown.is_cancelled() {
            report.cancelled = true;
            break;
        }

        match engine.check_channel(channel, &shutdown).await {
            Ok(outcome) => {
                report.channels_checked += 1;
                report.items_delivered += outcome.delivered;
                report.delivery_failures += outcome.delivery_failures;
                if outcome.interrupted {
                    report.cancelled = true;
                    break;
                }
            }
            Err(e) => {
                report.channels_failed += 1;
                warn!(
                    subscriber_id = %channel.subscriber_id,
                    channel_id = %channel.channel_id,
                    "Error checking channel {}: {}",
                    channel.channel_name,
                    e
                );
            }
        }
    }

    info!(
        "Sweep finished: {} channels checked, {} failed, {} items delivered, {} delivery failures",
        report.channels_checked, report.channels_failed, report.items_delivered, report.delivery_failures
    );
    Ok(report)
}

/// Drives sweeps forever: sweep, clean up the ledger when due, sleep.
pub struct Scheduler {
    engine: Arc<MonitorEngine>,
    last_cleanup: Option<DateTime<Utc>>,
}

impl Scheduler {
    pub fn new(engine: Arc<MonitorEngine>) -> Self {
        Self {
            engine,
            last_cleanup: None,
        }
    }

    /// A single sweep, run in place.
    pub async fn run_once(&self, shutdown: &CancellationToken) -> Result<SweepReport> {
        sweep(self.engine.clone(), shutdown.clone()).await
    }

    /// Loop until `shutdown` is cancelled. Cancellation is honoured while
    /// sleeping and between channels or items, never during a delivery.
    /// A sweep that fails, or panics, is logged and retried after a short
    /// backoff; this never returns for any other reason.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        let config = self.engine.config().clone();
        info!(
            "Starting channel monitoring (checking every {} minutes)",
            config.poll_interval_minutes
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let span = info_span!("sweep", sweep_id = %Uuid::new_v4());
            let handle = tokio::spawn(sweep(self.engine.clone(), shutdown.clone()).instrument(span));

            let wait = match handle.await {
                Ok(Ok(report)) => {
                    if report.cancelled {
                        break;
                    }
                    self.cleanup_if_due().await;
                    config.poll_interval()
                }
                Ok(Err(e)) => {
                    error!("Error in monitoring loop: {}", e);
                    config.sweep_failure_backoff()
                }
                Err(e) => {
                    error!("Sweep task aborted: {}", e);
                    config.sweep_failure_backoff()
                }
            };

            if !pause(wait, &shutdown).await {
                break;
            }
        }

        info!("Channel monitoring stopped");
    }

    /// Run retention cleanup if the cleanup interval has elapsed. Returns the
    /// number of deleted ledger records, if cleanup ran.
    pub async fn cleanup_if_due(&mut self) -> Option<u64> {
        let config = self.engine.config();
        let now = Utc::now();
        if !should_run(self.last_cleanup, config.cleanup_interval(), now) {
            return None;
        }

        match self.engine.store().cleanup_processed_older_than(config.retention_days).await {
            Ok(deleted) => {
                self.last_cleanup = Some(now);
                Some(deleted)
            }
            Err(e) => {
                warn!("Ledger cleanup failed, will retry after the next sweep: {}", e);
                None
            }
        }
    }
}
