use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

use crate::types::{ArticleRecord, StoredArticle};
use crate::Result;

#[async_trait]
pub trait ArticleStorage: Send + Sync {
    /// Create the article for `record.url` or overwrite its scalar fields.
    ///
    /// Non-empty author names replace the author associations, a present
    /// category replaces the category association. The whole operation is
    /// atomic: on error nothing of it is visible.
    async fn upsert_article(&self, record: &ArticleRecord) -> Result<StoredArticle>;

    /// Look up a single article by its URL
    async fn get_article(&self, url: &str) -> Result<Option<StoredArticle>>;

    /// Get all articles carrying a specific source label
    async fn get_by_source(&self, source: &str) -> Result<Vec<StoredArticle>>;

    /// Newest articles first
    async fn latest(&self, limit: usize) -> Result<Vec<StoredArticle>>;

    async fn count(&self) -> Result<usize>;
}

/// Shared keyed state with optional per-key expiry.
///
/// Values are opaque strings; use [`StateStoreExt`] for JSON values.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>>;

    /// Unconditional write. `ttl = None` keeps the value until overwritten.
    async fn put_raw(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;

    /// Returns true if a value was removed.
    async fn delete(&self, key: &str) -> Result<bool>;
}

#[async_trait]
pub trait StateStoreExt: StateStore {
    async fn get_json<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get_raw(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn get_or_default<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: DeserializeOwned + Send,
    {
        Ok(self.get_json(key).await?.unwrap_or(default))
    }

    async fn put_json<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let raw = serde_json::to_string(value)?;
        self.put_raw(key, raw, ttl).await
    }
}

impl<S: StateStore + ?Sized> StateStoreExt for S {}
