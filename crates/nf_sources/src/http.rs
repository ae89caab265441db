//! Outbound HTTP capability.
//!
//! Every failure leaves this module already classified as
//! [`Error::Connectivity`], [`Error::BadResponse`] or [`Error::InvalidPayload`].

use async_trait::async_trait;
use nf_core::{Error, Result};
use serde_json::Value;
use std::time::Duration;
use url::Url;

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// GET `url` with `query` and decode the body as JSON, bounded by `timeout`.
    async fn get_json(
        &self,
        url: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<Value>;
}

#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::connectivity(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

fn classify(err: reqwest::Error) -> Error {
    if err.is_decode() {
        Error::InvalidPayload(err.to_string())
    } else if let Some(status) = err.status() {
        Error::bad_response(status.as_u16(), err.to_string())
    } else {
        // timeouts, refused connections, resets, redirect loops
        Error::connectivity(err.to_string())
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get_json(
        &self,
        url: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<Value> {
        let url = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;

        let response = self
            .client
            .get(url)
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("unexpected status");
            return Err(Error::bad_response(status.as_u16(), reason));
        }

        let body = response.bytes().await.map_err(classify)?;
        serde_json::from_slice(&body).map_err(|e| Error::InvalidPayload(e.to_string()))
    }
}

/// Join a provider base address and an endpoint path.
pub fn join_url(base: &str, endpoint: &str) -> Result<String> {
    let base = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    };
    let base = Url::parse(&base).map_err(|e| Error::InvalidUrl(format!("{base}: {e}")))?;
    let joined = base
        .join(endpoint.trim_start_matches('/'))
        .map_err(|e| Error::InvalidUrl(format!("{endpoint}: {e}")))?;
    Ok(joined.to_string())
}
