use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nf_core::{AppConfig, ArticleRecord, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::client::{SourceClient, SourceContext};
use crate::resilience::RateLimit;

pub mod guardian;
pub mod newsapi;
pub mod nytimes;

pub use guardian::GuardianProvider;
pub use newsapi::NewsApiProvider;
pub use nytimes::NewYorkTimesProvider;

/// Anything the aggregator can pull articles from.
#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Returns the name of the news source
    fn name(&self) -> &str;

    /// Fetch and normalize the current batch. Implementations are expected to
    /// absorb their own failures and answer with an empty list.
    async fn fetch_articles(&self) -> Result<Vec<ArticleRecord>>;
}

/// The upstream-specific half of a source: where to call and how to read the answer.
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    fn base_url(&self) -> &str;

    fn endpoint(&self) -> &str;

    /// Query parameter carrying the API key
    fn credential_param(&self) -> &str;

    /// Fixed query parameters, credential excluded
    fn query(&self) -> Vec<(String, String)>;

    /// Map a raw payload to records. Items without a url or title are skipped,
    /// a payload without the expected item list is an error.
    fn normalize(&self, payload: &Value, fetched_at: DateTime<Utc>) -> Result<Vec<ArticleRecord>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    NewsApi,
    Guardian,
    NewYorkTimes,
}

impl ProviderKind {
    pub fn all() -> [ProviderKind; 3] {
        [ProviderKind::NewsApi, ProviderKind::Guardian, ProviderKind::NewYorkTimes]
    }

    /// Key under `sources.` in the configuration
    pub fn config_key(&self) -> &'static str {
        match self {
            ProviderKind::NewsApi => "newsapi",
            ProviderKind::Guardian => "guardian",
            ProviderKind::NewYorkTimes => "new_york_times",
        }
    }

    pub fn provider(&self) -> Box<dyn Provider> {
        match self {
            ProviderKind::NewsApi => Box::new(NewsApiProvider::new()),
            ProviderKind::Guardian => Box::new(GuardianProvider::new()),
            ProviderKind::NewYorkTimes => Box::new(NewYorkTimesProvider::new()),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

impl FromStr for ProviderKind {
    type Err = nf_core::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "newsapi" | "news_api" => Ok(ProviderKind::NewsApi),
            "guardian" | "the_guardian" => Ok(ProviderKind::Guardian),
            "new_york_times" | "nytimes" | "nyt" => Ok(ProviderKind::NewYorkTimes),
            other => Err(nf_core::Error::Source(format!("Unknown source: {other}"))),
        }
    }
}

/// One client per configured, enabled and credentialed provider.
pub fn build_sources(config: &AppConfig, ctx: &SourceContext) -> Vec<SourceClient> {
    let mut clients = Vec::new();

    for kind in ProviderKind::all() {
        let Some(source) = config.source(kind.config_key()) else {
            debug!(source = %kind, "Source not configured");
            continue;
        };
        if !source.enabled {
            debug!(source = %kind, "Source disabled");
            continue;
        }
        let Some(api_key) = source.api_key.clone().filter(|k| !k.trim().is_empty()) else {
            warn!(source = %kind, "Source has no api_key, skipping");
            continue;
        };

        let mut client = SourceClient::new(kind.provider(), ctx).with_credential(api_key);
        if let Some(base_url) = &source.base_url {
            client = client.with_base_url(base_url.clone());
        }
        if let Some(limit) = source.rate_limit {
            client = client.with_rate_limit(RateLimit::from(limit));
        }
        clients.push(client);
    }

    clients
}

/// Decode each element of the array at `pointer`, dropping the ones that do not fit `T`.
pub(crate) fn decode_items<T: DeserializeOwned>(payload: &Value, pointer: &str) -> Result<Vec<T>> {
    let items = payload
        .pointer(pointer)
        .and_then(Value::as_array)
        .ok_or_else(|| nf_core::Error::InvalidPayload(format!("missing item list at {pointer}")))?;

    Ok(items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                debug!("Skipping undecodable item: {}", e);
                None
            }
        })
        .collect())
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// RFC 3339 first, then the `+0000` offset style; `fallback` when absent or unreadable.
pub(crate) fn parse_published(raw: Option<&str>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return fallback;
    };
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|at| at.with_timezone(&Utc))
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_published() {
        let fallback = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 3, 5, 12, 30, 0).unwrap();

        assert_eq!(parse_published(Some("2024-03-05T12:30:00Z"), fallback), expected);
        assert_eq!(parse_published(Some("2024-03-05T12:30:00+0000"), fallback), expected);
        assert_eq!(parse_published(Some("2024-03-05T14:30:00+02:00"), fallback), expected);
        assert_eq!(parse_published(Some("yesterday"), fallback), fallback);
        assert_eq!(parse_published(None, fallback), fallback);
    }

    #[test]
    fn test_provider_kind_keys() {
        assert_eq!("nytimes".parse::<ProviderKind>().unwrap(), ProviderKind::NewYorkTimes);
        assert_eq!(ProviderKind::Guardian.config_key(), "guardian");
        assert!("reuters".parse::<ProviderKind>().is_err());
        assert_eq!(ProviderKind::NewsApi.provider().name(), "NewsAPI");
    }

    #[test]
    fn test_decode_items_requires_list() {
        let payload = serde_json::json!({"articles": [{"a": 1}, 2]});
        let items: Vec<Value> = decode_items(&payload, "/articles").unwrap();
        assert_eq!(items.len(), 2);
        assert!(decode_items::<Value>(&payload, "/response/results").is_err());
    }
}
