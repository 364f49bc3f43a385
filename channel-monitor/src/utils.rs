/// Channel URL utilities
pub mod url {
    use url::Url;

    /// The ways a YouTube channel URL can name its channel.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ChannelRef {
        /// `/channel/UC...`, already a channel id
        Id(String),
        /// `/@handle`
        Handle(String),
        /// `/c/name`
        Custom(String),
        /// `/user/name`, legacy usernames
        User(String),
    }

    fn is_youtube_host(host: &str) -> bool {
        matches!(host, "youtube.com" | "www.youtube.com" | "m.youtube.com")
    }

    fn is_valid_identifier(identifier: &str) -> bool {
        !identifier.is_empty()
            && identifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    }

    /// Work out which channel a URL points at. A missing scheme is accepted.
    pub fn parse_channel_url(raw: &str) -> Option<ChannelRef> {
        let raw = raw.trim();
        let parsed = match Url::parse(raw) {
            Ok(url) => url,
            Err(_) => Url::parse(&format!("https://{}", raw)).ok()?,
        };

        if !matches!(parsed.scheme(), "http" | "https") || !is_youtube_host(parsed.host_str()?) {
            return None;
        }

        let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();
        let channel = match segments.as_slice() {
            ["channel", id, ..] if id.starts_with("UC") => ChannelRef::Id(id.to_string()),
            ["c", name, ..] => ChannelRef::Custom(name.to_string()),
            ["user", name, ..] => ChannelRef::User(name.to_string()),
            [handle, ..] if handle.starts_with('@') => ChannelRef::Handle(handle[1..].to_string()),
            _ => return None,
        };

        let identifier = match &channel {
            ChannelRef::Id(s) | ChannelRef::Handle(s) | ChannelRef::Custom(s) | ChannelRef::User(s) => s,
        };
        is_valid_identifier(identifier).then_some(channel)
    }
}

/// Time utilities for the sweep loop
pub mod time {
    use chrono::{DateTime, Duration, Utc};
    use tokio_util::sync::CancellationToken;

    /// Sleep for `duration` unless shutdown is requested first. Returns false
    /// if the caller should stop.
    pub async fn pause(duration: std::time::Duration, shutdown: &CancellationToken) -> bool {
        if duration.is_zero() {
            return !shutdown.is_cancelled();
        }

        tokio::select! {
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Check if enough time has passed since the last run
    pub fn should_run(last_run: Option<DateTime<Utc>>, interval: Duration, now: DateTime<Utc>) -> bool {
        match last_run {
            None => true,
            Some(last) => now.signed_duration_since(last) >= interval,
        }
    }
}
