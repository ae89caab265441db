use nf_core::config::{StateConfig, StorageConfig};
use nf_core::{ArticleStorage, Error, Result, SharedClock, StateStore};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

pub mod backends;

pub use backends::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    SQLite,
}

impl Default for StorageKind {
    fn default() -> Self {
        Self::Memory
    }
}

impl FromStr for StorageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "inmemory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::SQLite),
            other => Err(Error::Storage(format!("Unknown storage backend: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Memory,
    Redis,
}

impl Default for StateKind {
    fn default() -> Self {
        Self::Memory
    }
}

impl FromStr for StateKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "inmemory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(Error::State(format!("Unknown state backend: {other}"))),
        }
    }
}

pub async fn create_storage(config: &StorageConfig) -> Result<Arc<dyn ArticleStorage>> {
    match config.backend.parse::<StorageKind>()? {
        StorageKind::Memory => {
            info!("Using in-memory article storage");
            Ok(Arc::new(InMemoryStorage::new()))
        }
        #[cfg(feature = "sqlite")]
        StorageKind::SQLite => {
            info!("Using SQLite article storage at {}", config.path);
            Ok(Arc::new(SQLiteStorage::new_with_path(&config.path).await?))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageKind::SQLite => Err(Error::Storage(
            "SQLite storage requires the `sqlite` feature".to_string(),
        )),
    }
}

pub async fn create_state_store(
    config: &StateConfig,
    clock: SharedClock,
) -> Result<Arc<dyn StateStore>> {
    match config.backend.parse::<StateKind>()? {
        StateKind::Memory => {
            info!("Using in-memory state store");
            Ok(Arc::new(InMemoryStateStore::with_clock(clock)))
        }
        #[cfg(feature = "redis")]
        StateKind::Redis => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| Error::State("Redis state store needs a url".to_string()))?;
            info!("Using Redis state store at {}", url);
            Ok(Arc::new(RedisStateStore::connect(url, config.key_prefix.clone()).await?))
        }
        #[cfg(not(feature = "redis"))]
        StateKind::Redis => Err(Error::State(
            "Redis state store requires the `redis` feature".to_string(),
        )),
    }
}
