//! Layered configuration.
//!
//! Sources, later ones overriding earlier ones:
//! - `config/default`, `config/{NF_ENV}`, `config/local` (any format the `config` crate reads)
//! - an explicit file passed by the caller
//! - environment variables prefixed with `NF__`, e.g. `NF__SOURCES__NEWSAPI__API_KEY`

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::Result;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ingestion: IngestionConfig,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub state: StateConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-source settings keyed by source key (`newsapi`, `guardian`, `new_york_times`)
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionConfig {
    /// Fewer successful sources than this raises a critical alert
    #[serde(default = "default_minimum_sources")]
    pub minimum_sources: usize,

    /// Hard timeout for every outbound call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Sources fetched at once; 1 means strictly sequential
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_latest_cache_size")]
    pub latest_cache_size: usize,

    #[serde(default = "default_latest_cache_ttl")]
    pub latest_cache_ttl_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_reset_timeout")]
    pub reset_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// `memory` or `sqlite`
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Database file for the sqlite backend
    #[serde(default = "default_storage_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateConfig {
    /// `memory` or `redis`
    #[serde(default = "default_state_backend")]
    pub backend: String,

    pub url: Option<String>,

    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SourceConfig {
    pub api_key: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Overrides the provider's built-in base URL
    pub base_url: Option<String>,

    pub rate_limit: Option<RateLimitConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub per_minutes: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.per_minutes * 60)
    }
}

fn default_minimum_sources() -> usize {
    1
}

fn default_request_timeout() -> u64 {
    5
}

fn default_concurrency() -> usize {
    1
}

fn default_latest_cache_size() -> usize {
    10
}

fn default_latest_cache_ttl() -> u64 {
    3600
}

fn default_user_agent() -> String {
    format!("nf/{}", env!("CARGO_PKG_VERSION"))
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_reset_timeout() -> u64 {
    60
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

fn default_storage_path() -> String {
    "articles.db".to_string()
}

fn default_state_backend() -> String {
    "memory".to_string()
}

fn default_key_prefix() -> String {
    "nf".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_enabled() -> bool {
    true
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            minimum_sources: default_minimum_sources(),
            request_timeout_secs: default_request_timeout(),
            concurrency: default_concurrency(),
            latest_cache_size: default_latest_cache_size(),
            latest_cache_ttl_secs: default_latest_cache_ttl(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: default_storage_path(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: default_state_backend(),
            url: None,
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Load from the conventional `config/` files, an optional explicit file, and the environment
    pub fn load(explicit: Option<&str>) -> Result<Self> {
        let env = std::env::var("NF_ENV").unwrap_or_else(|_| "development".to_string());

        let mut builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::with_name(path));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("NF")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn source(&self, key: &str) -> Option<&SourceConfig> {
        self.sources.get(key)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.ingestion.request_timeout_secs)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker.reset_timeout_secs)
    }

    pub fn latest_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.ingestion.latest_cache_ttl_secs)
    }
}
