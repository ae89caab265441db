use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nf_core::{
    ArticleRecord, ArticleStorage, Author, Category, Result, SharedClock, StateStore, StoredArticle,
    SystemClock,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct ArticleRow {
    id: i64,
    url: String,
    title: String,
    description: Option<String>,
    content: Option<String>,
    source: String,
    image_url: Option<String>,
    published_at: DateTime<Utc>,
    author_ids: Vec<i64>,
    category_ids: Vec<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Name-keyed lookup table for authors and categories.
#[derive(Debug, Default)]
struct NameTable {
    by_name: HashMap<String, i64>,
    by_id: HashMap<i64, String>,
    next_id: i64,
}

impl NameTable {
    fn locate_or_create(&mut self, name: &str) -> i64 {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        self.next_id += 1;
        let id = self.next_id;
        self.by_name.insert(name.to_string(), id);
        self.by_id.insert(id, name.to_string());
        id
    }

    fn name(&self, id: i64) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    articles: HashMap<String, ArticleRow>,
    authors: NameTable,
    categories: NameTable,
    next_article_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs entirely under the caller's write lock, so readers never see a partial sync.
    pub fn upsert_article(&mut self, record: &ArticleRecord) -> StoredArticle {
        let now = Utc::now();

        let author_ids: Vec<i64> = dedup_names(&record.author_names)
            .into_iter()
            .map(|name| self.authors.locate_or_create(name))
            .collect();
        let category_id = record
            .category
            .as_deref()
            .map(|name| self.categories.locate_or_create(name));

        let next_id = self.next_article_id + 1;
        let row = self
            .articles
            .entry(record.url.clone())
            .or_insert_with(|| ArticleRow {
                id: next_id,
                url: record.url.clone(),
                title: String::new(),
                description: None,
                content: None,
                source: String::new(),
                image_url: None,
                published_at: record.published_at,
                author_ids: Vec::new(),
                category_ids: Vec::new(),
                created_at: now,
                updated_at: now,
            });
        if row.id == next_id {
            self.next_article_id = next_id;
        }

        row.title = record.title.clone();
        row.description = record.description.clone();
        row.content = record.content.clone();
        row.source = record.source.clone();
        row.image_url = record.image_url.clone();
        row.published_at = record.published_at;
        row.updated_at = now;
        if !author_ids.is_empty() {
            row.author_ids = author_ids;
        }
        if let Some(category_id) = category_id {
            row.category_ids = vec![category_id];
        }

        let row = row.clone();
        self.to_stored(&row)
    }

    pub fn get_article(&self, url: &str) -> Option<StoredArticle> {
        self.articles.get(url).map(|row| self.to_stored(row))
    }

    pub fn get_by_source(&self, source: &str) -> Vec<StoredArticle> {
        let mut articles: Vec<_> = self
            .articles
            .values()
            .filter(|row| row.source == source)
            .map(|row| self.to_stored(row))
            .collect();
        articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        articles
    }

    pub fn latest(&self, limit: usize) -> Vec<StoredArticle> {
        let mut rows: Vec<&ArticleRow> = self.articles.values().collect();
        rows.sort_by(|a, b| b.published_at.cmp(&a.published_at).then(b.id.cmp(&a.id)));
        rows.into_iter().take(limit).map(|row| self.to_stored(row)).collect()
    }

    pub fn count(&self) -> usize {
        self.articles.len()
    }

    fn to_stored(&self, row: &ArticleRow) -> StoredArticle {
        StoredArticle {
            id: row.id,
            url: row.url.clone(),
            title: row.title.clone(),
            description: row.description.clone(),
            content: row.content.clone(),
            source: row.source.clone(),
            image_url: row.image_url.clone(),
            published_at: row.published_at,
            authors: row
                .author_ids
                .iter()
                .filter_map(|id| {
                    self.authors.name(*id).map(|name| Author {
                        id: *id,
                        name: name.to_string(),
                    })
                })
                .collect(),
            categories: row
                .category_ids
                .iter()
                .filter_map(|id| {
                    self.categories.name(*id).map(|name| Category {
                        id: *id,
                        name: name.to_string(),
                    })
                })
                .collect(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn dedup_names(names: &[String]) -> Vec<&str> {
    let mut seen = Vec::with_capacity(names.len());
    for name in names {
        if !seen.contains(&name.as_str()) {
            seen.push(name.as_str());
        }
    }
    seen
}

pub struct InMemoryStorage {
    store: Arc<RwLock<MemoryStore>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(MemoryStore::new())),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArticleStorage for InMemoryStorage {
    async fn upsert_article(&self, record: &ArticleRecord) -> Result<StoredArticle> {
        let mut store = self.store.write().await;
        Ok(store.upsert_article(record))
    }

    async fn get_article(&self, url: &str) -> Result<Option<StoredArticle>> {
        let store = self.store.read().await;
        Ok(store.get_article(url))
    }

    async fn get_by_source(&self, source: &str) -> Result<Vec<StoredArticle>> {
        let store = self.store.read().await;
        Ok(store.get_by_source(source))
    }

    async fn latest(&self, limit: usize) -> Result<Vec<StoredArticle>> {
        let store = self.store.read().await;
        Ok(store.latest(limit))
    }

    async fn count(&self) -> Result<usize> {
        let store = self.store.read().await;
        Ok(store.count())
    }
}

#[derive(Debug, Clone)]
struct StateEntry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

/// Process-local [`StateStore`]; expiry is evaluated against the injected clock.
pub struct InMemoryStateStore {
    entries: RwLock<HashMap<String, StateEntry>>,
    clock: SharedClock,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries.values().filter(|e| !is_expired(e, now)).count()
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

fn is_expired(entry: &StateEntry, now: DateTime<Utc>) -> bool {
    entry.expires_at.map(|at| at <= now).unwrap_or(false)
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !is_expired(entry, now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        let mut entries = self.entries.write().await;
        if entries.get(key).map(|e| is_expired(e, now)).unwrap_or(false) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn put_raw(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| self.clock.now() + ttl);
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), StateEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        Ok(entries
            .remove(key)
            .map(|entry| !is_expired(&entry, now))
            .unwrap_or(false))
    }
}
