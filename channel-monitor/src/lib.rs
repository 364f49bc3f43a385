pub mod types;
pub mod config;
pub mod store;
pub mod admission;
pub mod engine;
pub mod scheduler;
pub mod youtube;
pub mod notifier;
pub mod utils;

pub use types::*;
pub use config::MonitorConfig;
pub use store::ChannelStore;
pub use engine::MonitorEngine;
pub use scheduler::Scheduler;
pub use youtube::YouTubeSource;
pub use notifier::{LogNotifier, WebhookNotifier};
