use async_trait::async_trait;
use nf_core::{ArticleObserver, Result, StateStore, StateStoreExt, StoredArticle};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const LATEST_ARTICLES_KEY: &str = "latest_articles";

/// Warms the `latest_articles` cache entry with the newest articles of each batch.
pub struct CacheObserver {
    store: Arc<dyn StateStore>,
    size: usize,
    ttl: Duration,
}

impl CacheObserver {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            size: 10,
            ttl: Duration::from_secs(3600),
        }
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub async fn cached(&self) -> Result<Option<Vec<StoredArticle>>> {
        self.store.get_json(LATEST_ARTICLES_KEY).await
    }
}

#[async_trait]
impl ArticleObserver for CacheObserver {
    fn name(&self) -> &str {
        "cache"
    }

    async fn on_news_updated(&self, articles: &[StoredArticle]) -> Result<()> {
        let mut latest = articles.to_vec();
        latest.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        latest.truncate(self.size);

        self.store.delete(LATEST_ARTICLES_KEY).await?;
        self.store
            .put_json(LATEST_ARTICLES_KEY, &latest, Some(self.ttl))
            .await?;

        debug!(count = latest.len(), "Latest articles cache warmed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use nf_core::ManualClock;
    use nf_storage::InMemoryStateStore;

    fn article(id: i64, hours_ago: i64) -> StoredArticle {
        let now = Utc::now();
        StoredArticle {
            id,
            url: format!("https://example.com/{id}"),
            title: format!("Article {id}"),
            description: None,
            content: None,
            source: "NewsAPI - Test".to_string(),
            image_url: None,
            published_at: now - ChronoDuration::hours(hours_ago),
            authors: vec![],
            categories: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_caches_newest_articles_with_ttl() {
        let clock = ManualClock::default();
        let store = Arc::new(InMemoryStateStore::with_clock(Arc::new(clock.clone())));
        let observer = CacheObserver::new(store.clone())
            .with_size(2)
            .with_ttl(Duration::from_secs(3600));

        let batch = vec![article(1, 5), article(2, 1), article(3, 3)];
        observer.on_news_updated(&batch).await.unwrap();

        let cached = observer.cached().await.unwrap().unwrap();
        let ids: Vec<i64> = cached.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![2, 3]);

        clock.advance(Duration::from_secs(3600));
        assert!(observer.cached().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_new_batch_replaces_cache() {
        let store = Arc::new(InMemoryStateStore::new());
        let observer = CacheObserver::new(store);

        observer.on_news_updated(&[article(1, 1)]).await.unwrap();
        observer.on_news_updated(&[article(7, 2)]).await.unwrap();

        let cached = observer.cached().await.unwrap().unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].id, 7);
    }
}
