use crate::types::{ContentSource, FetchConfig, Item, ResolvedChannel, SourceError};
use crate::utils::url::{parse_channel_url, ChannelRef};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// The YouTube API refuses larger pages.
const MAX_PAGE_SIZE: usize = 50;
const LIVE_PAGE_SIZE: usize = 5;

/// [`ContentSource`] backed by the YouTube Data API v3.
pub struct YouTubeSource {
    client: Client,
    api_key: String,
    config: FetchConfig,
}

impl YouTubeSource {
    pub fn new(api_key: impl Into<String>, config: FetchConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()
            .map_err(|e| SourceError::Http(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            config,
        })
    }

    /// GET an API endpoint, retrying transient failures with exponential
    /// backoff.
    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, String)]) -> Result<T, SourceError> {
        let url = format!("{}/{}", self.config.api_base_url.trim_end_matches('/'), endpoint);

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 32),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_delay_seconds * 60)),
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            match self.request(&url, params).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let Some(delay) = backoff.next_backoff() else {
                        return Err(e);
                    };
                    attempt += 1;
                    warn!("Attempt {} failed for {}, retrying in {:?}: {}", attempt, endpoint, delay, e);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request<T: DeserializeOwned>(&self, url: &str, params: &[(&str, String)]) -> Result<T, SourceError> {
        let response = self
            .client
            .get(url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| SourceError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ApiErrorBody>().await {
                Ok(body) => body.error.message,
                Err(_) => status.canonical_reason().unwrap_or("Unknown").to_string(),
            };
            return Err(SourceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<T>().await.map_err(|e| SourceError::Decode(e.to_string()))
    }

    async fn uploads_playlist(&self, channel_id: &str) -> Result<Option<String>, SourceError> {
        let response: ListResponse<ChannelResource> = self
            .get_json(
                "channels",
                &[("part", "contentDetails".to_string()), ("id", channel_id.to_string())],
            )
            .await?;

        Ok(response
            .items
            .into_iter()
            .next()
            .and_then(|channel| channel.content_details)
            .map(|details| details.related_playlists.uploads))
    }

    async fn lookup_channel(&self, filter: (&str, String)) -> Result<Option<ResolvedChannel>, SourceError> {
        let response: ListResponse<ChannelResource> = self
            .get_json("channels", &[("part", "snippet".to_string()), filter])
            .await?;

        Ok(response.items.into_iter().next().map(|channel| ResolvedChannel {
            channel_name: channel.snippet.map(|s| s.title).unwrap_or_else(|| channel.id.clone()),
            channel_id: channel.id,
        }))
    }

    async fn search_channel(&self, query: &str) -> Result<Option<ResolvedChannel>, SourceError> {
        let response: ListResponse<SearchResult> = self
            .get_json(
                "search",
                &[
                    ("part", "snippet".to_string()),
                    ("type", "channel".to_string()),
                    ("q", query.to_string()),
                    ("maxResults", "1".to_string()),
                ],
            )
            .await?;

        Ok(response.items.into_iter().next().and_then(|result| {
            let channel_id = result.id.channel_id?;
            Some(ResolvedChannel {
                channel_name: result.snippet.channel_title,
                channel_id,
            })
        }))
    }
}

#[async_trait]
impl ContentSource for YouTubeSource {
    async fn fetch_latest_items(&self, channel_id: &str, count: usize) -> Result<Vec<Item>, SourceError> {
        let Some(playlist_id) = self.uploads_playlist(channel_id).await? else {
            warn!(channel_id, "Channel not found");
            return Err(SourceError::NotFound(channel_id.to_string()));
        };

        let response: ListResponse<PlaylistItem> = self
            .get_json(
                "playlistItems",
                &[
                    ("part", "snippet".to_string()),
                    ("playlistId", playlist_id),
                    ("maxResults", count.clamp(1, MAX_PAGE_SIZE).to_string()),
                ],
            )
            .await?;

        let items = playlist_items(response);
        debug!(channel_id, "Fetched {} latest items", items.len());
        Ok(items)
    }

    async fn fetch_live_items(&self, channel_id: &str) -> Result<Vec<Item>, SourceError> {
        let response: ListResponse<SearchResult> = self
            .get_json(
                "search",
                &[
                    ("part", "snippet".to_string()),
                    ("channelId", channel_id.to_string()),
                    ("type", "video".to_string()),
                    ("eventType", "live".to_string()),
                    ("maxResults", LIVE_PAGE_SIZE.to_string()),
                ],
            )
            .await?;

        Ok(live_items(response))
    }

    async fn resolve_channel(&self, url: &str) -> Result<ResolvedChannel, SourceError> {
        let reference = parse_channel_url(url).ok_or_else(|| SourceError::InvalidUrl(url.to_string()))?;

        let resolved = match &reference {
            ChannelRef::Id(id) => self.lookup_channel(("id", id.clone())).await?,
            ChannelRef::Handle(handle) => self.lookup_channel(("forHandle", format!("@{}", handle))).await?,
            ChannelRef::User(name) => match self.lookup_channel(("forUsername", name.clone())).await? {
                Some(channel) => Some(channel),
                None => self.search_channel(name).await?,
            },
            ChannelRef::Custom(name) => self.search_channel(name).await?,
        };

        resolved.ok_or_else(|| SourceError::NotFound(url.to_string()))
    }
}

fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

/// Newest first, whatever order the playlist came back in.
fn playlist_items(response: ListResponse<PlaylistItem>) -> Vec<Item> {
    let mut items: Vec<Item> = response
        .items
        .into_iter()
        .map(|entry| {
            let snippet = entry.snippet;
            Item {
                url: watch_url(&snippet.resource_id.video_id),
                item_id: snippet.resource_id.video_id,
                title: snippet.title,
                description: snippet.description,
                published_at: snippet.published_at,
                thumbnail: snippet.thumbnails.preferred(),
                channel_title: snippet.channel_title,
                is_live: false,
            }
        })
        .collect();

    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    items
}

fn live_items(response: ListResponse<SearchResult>) -> Vec<Item> {
    response
        .items
        .into_iter()
        .filter_map(|result| {
            let video_id = result.id.video_id?;
            let snippet = result.snippet;
            Some(Item {
                url: watch_url(&video_id),
                item_id: video_id,
                title: snippet.title,
                description: snippet.description,
                published_at: snippet.published_at,
                thumbnail: snippet.thumbnails.preferred(),
                channel_title: snippet.channel_title,
                is_live: true,
            })
        })
        .collect()
}

// API payloads, reduced to the fields we read

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelResource {
    id: String,
    snippet: Option<ChannelSnippet>,
    content_details: Option<ChannelContentDetails>,
}

#[derive(Debug, Deserialize)]
struct ChannelSnippet {
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    snippet: PlaylistSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistSnippet {
    title: String,
    #[serde(default)]
    description: String,
    published_at: DateTime<Utc>,
    #[serde(default)]
    thumbnails: Thumbnails,
    #[serde(default)]
    channel_title: String,
    resource_id: ResourceId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: String,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: SearchId,
    snippet: SearchSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    video_id: Option<String>,
    channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    published_at: DateTime<Utc>,
    #[serde(default)]
    thumbnails: Thumbnails,
    #[serde(default)]
    channel_title: String,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    medium: Option<Thumbnail>,
    high: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl Thumbnails {
    fn preferred(self) -> Option<String> {
        self.medium.or(self.high).or(self.default).map(|t| t.url)
    }
}
