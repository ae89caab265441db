use async_trait::async_trait;

use crate::types::StoredArticle;
use crate::Result;

/// Side-effect consumer of a completed ingestion batch.
#[async_trait]
pub trait ArticleObserver: Send + Sync {
    fn name(&self) -> &str;

    /// Called once per run with every article persisted in that run.
    /// Never called with an empty batch.
    async fn on_news_updated(&self, articles: &[StoredArticle]) -> Result<()>;
}
