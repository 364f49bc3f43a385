use async_trait::async_trait;

use crate::defs::ContentSource;
use crate::defs::DeliveryOutcome;
use crate::defs::Item;
use crate::defs::Notifier;
use crate::defs::ResolvedChannel;
use crate::defs::SourceError;

/// A source with no channels and no items.
pub struct EmptySource;

#[async_trait]
impl ContentSource for EmptySource {
    async fn fetch_latest_items(&self, _channel_id: &str, _count: usize) -> Result<Vec<Item>, SourceError> {
        Ok(vec![])
    }

    async fn fetch_live_items(&self, _channel_id: &str) -> Result<Vec<Item>, SourceError> {
        Ok(vec![])
    }

    async fn resolve_channel(&self, url: &str) -> Result<ResolvedChannel, SourceError> {
        // Nothing exists here.
        Err(SourceError::NotFound(url.to_owned()))
    }
}

/// Accepts every delivery and drops it.
pub struct DiscardNotifier;

#[async_trait]
impl Notifier for DiscardNotifier {
    async fn deliver(&self, _subscriber_id: &str, _item: &Item) -> DeliveryOutcome {
        DeliveryOutcome::Delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_source_has_nothing() {
        let source = EmptySource;
        assert!(source.fetch_latest_items("UC123", 5).await.unwrap().is_empty());
        assert!(source.fetch_live_items("UC123").await.unwrap().is_empty());
        assert!(matches!(
            source.resolve_channel("https://www.youtube.com/@nobody").await,
            Err(SourceError::NotFound(_))
        ));
    }

    #[test]
    fn transient_errors() {
        assert!(SourceError::Http("reset".to_owned()).is_transient());
        assert!(SourceError::Api { status: 503, message: String::new() }.is_transient());
        assert!(SourceError::Api { status: 429, message: String::new() }.is_transient());
        assert!(!SourceError::Api { status: 403, message: String::new() }.is_transient());
        assert!(!SourceError::NotFound("x".to_owned()).is_transient());
    }
}
