use anyhow::{Context, Result};
use channel_monitor::{
    ChannelStore, ContentSource, FetchConfig, LogNotifier, MonitorConfig, MonitorEngine, MonitorError, Notifier, Scheduler,
    WebhookNotifier, YouTubeSource,
};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "channel-monitor", about = "Deliver new channel uploads to subscribers, once each, in order")]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://channel_monitor.db")]
    database_url: String,

    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true)]
    youtube_api_key: Option<String>,

    /// Deliver to this webhook instead of the log
    #[arg(long, env = "WEBHOOK_URL")]
    webhook_url: Option<String>,

    #[command(flatten)]
    config: MonitorConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sweep forever until interrupted
    Run,
    /// Run a single sweep and exit
    Sweep,
    /// Register (or reactivate) a subscriber
    Subscribe {
        subscriber_id: String,
        #[arg(long)]
        title: Option<String>,
    },
    /// Stop sweeping a subscriber's channels, keeping its state
    Unsubscribe { subscriber_id: String },
    /// Track a channel for a subscriber
    Add { subscriber_id: String, channel_url: String },
    /// Stop tracking a channel, by the URL it was added with
    Remove { subscriber_id: String, channel_url: String },
    /// List a subscriber's channels
    List { subscriber_id: String },
    /// Delete old ledger entries
    Cleanup {
        #[arg(long)]
        days: Option<u32>,
    },
    /// Print store counters
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    cli.config.validate()?;

    let store = Arc::new(
        ChannelStore::connect(&cli.database_url)
            .await
            .with_context(|| format!("opening database {}", cli.database_url))?,
    );

    let result = dispatch(&cli, store.clone()).await;
    store.close().await;
    result
}

async fn dispatch(cli: &Cli, store: Arc<ChannelStore>) -> Result<()> {
    match &cli.command {
        Command::Run => {
            let engine = Arc::new(build_engine(cli, store)?);
            let shutdown = CancellationToken::new();
            tokio::spawn(cancel_on_signal(shutdown.clone()));

            Scheduler::new(engine).run(shutdown).await;
        }
        Command::Sweep => {
            let engine = Arc::new(build_engine(cli, store)?);
            let shutdown = CancellationToken::new();
            tokio::spawn(cancel_on_signal(shutdown.clone()));

            let report = Scheduler::new(engine).run_once(&shutdown).await?;
            println!(
                "checked {} channels ({} failed), delivered {} items ({} delivery failures)",
                report.channels_checked, report.channels_failed, report.items_delivered, report.delivery_failures
            );
        }
        Command::Subscribe { subscriber_id, title } => {
            store.register_subscriber(subscriber_id, title.as_deref()).await?;
            println!("subscriber {} is active", subscriber_id);
        }
        Command::Unsubscribe { subscriber_id } => {
            store.deactivate_subscriber(subscriber_id).await?;
            println!("subscriber {} is inactive", subscriber_id);
        }
        Command::Add { subscriber_id, channel_url } => {
            // Channels of unregistered subscribers are never swept.
            let subscriber = store.require_subscriber(subscriber_id).await?;
            if !subscriber.is_active {
                warn!(subscriber_id = %subscriber_id, "Subscriber is inactive; the channel is swept once it is reactivated");
            }

            let source = youtube_source(cli)?;
            let resolved = source
                .resolve_channel(channel_url)
                .await
                .map_err(|e| MonitorError::Validation(e.to_string()))?;

            match store
                .add_tracked_channel(subscriber_id, &resolved.channel_id, channel_url, &resolved.channel_name)
                .await
            {
                Ok(channel) => println!("now tracking {} ({})", channel.channel_name, channel.channel_id),
                Err(MonitorError::ChannelAlreadyTracked { .. }) => {
                    println!("{} is already tracked for {}", resolved.channel_name, subscriber_id)
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Remove { subscriber_id, channel_url } => {
            if store.remove_tracked_channel_by_url(subscriber_id, channel_url).await? {
                println!("stopped tracking {}", channel_url);
            } else {
                return Err(MonitorError::ChannelNotTracked {
                    subscriber_id: subscriber_id.clone(),
                    channel: channel_url.clone(),
                }
                .into());
            }
        }
        Command::List { subscriber_id } => {
            let channels = store.get_tracked_channels(subscriber_id).await?;
            if channels.is_empty() {
                println!("no channels tracked for {}", subscriber_id);
            }
            for (n, channel) in channels.iter().enumerate() {
                let status = match channel.last_checked_at {
                    Some(at) => format!("last checked {}", at.format("%Y-%m-%d %H:%M UTC")),
                    None => "pending first check".to_string(),
                };
                println!("{}. {} <{}> {}", n + 1, channel.channel_name, channel.channel_url, status);
            }
        }
        Command::Cleanup { days } => {
            let days = days.unwrap_or(cli.config.retention_days);
            let deleted = store.cleanup_processed_older_than(days).await?;
            println!("deleted {} ledger records older than {} days", deleted, days);
        }
        Command::Stats => {
            let stats = store.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}

fn youtube_source(cli: &Cli) -> Result<YouTubeSource> {
    let api_key = cli
        .youtube_api_key
        .as_deref()
        .context("YOUTUBE_API_KEY environment variable is required")?;
    Ok(YouTubeSource::new(api_key, FetchConfig::default())?)
}

fn build_engine(cli: &Cli, store: Arc<ChannelStore>) -> Result<MonitorEngine> {
    let source = Arc::new(youtube_source(cli)?);
    let notifier: Arc<dyn Notifier> = match &cli.webhook_url {
        Some(url) => {
            info!("Delivering to webhook {}", url);
            Arc::new(WebhookNotifier::new(url.clone(), Duration::from_secs(30))?)
        }
        None => {
            warn!("No WEBHOOK_URL configured, deliveries only go to the log");
            Arc::new(LogNotifier)
        }
    };

    Ok(MonitorEngine::new(store, source, notifier, cli.config.clone()))
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                error!("Could not listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Received shutdown signal, finishing the current item");
    shutdown.cancel();
}
