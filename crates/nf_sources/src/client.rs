use async_trait::async_trait;
use nf_core::{AppConfig, ArticleRecord, Result, SharedClock, StateStore};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::http::{join_url, HttpClient};
use crate::logging::Logger;
use crate::resilience::circuit_breaker::{DEFAULT_FAILURE_THRESHOLD, DEFAULT_RESET_TIMEOUT};
use crate::resilience::{CircuitBreaker, RateGate, RateLimit, RetryExecutor, RetryTable};
use crate::sources::{NewsSource, Provider};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Collaborators every source client is built from.
#[derive(Clone)]
pub struct SourceContext {
    pub http: Arc<dyn HttpClient>,
    pub state: Arc<dyn StateStore>,
    pub rate_gate: Arc<RateGate>,
    pub clock: SharedClock,
    pub timeout: Duration,
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub retry_table: RetryTable,
}

impl SourceContext {
    pub fn new(http: Arc<dyn HttpClient>, state: Arc<dyn StateStore>, clock: SharedClock) -> Self {
        Self {
            http,
            rate_gate: Arc::new(RateGate::new(state.clone(), clock.clone())),
            state,
            clock,
            timeout: DEFAULT_TIMEOUT,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            retry_table: RetryTable::upstream_default(),
        }
    }

    pub fn from_config(
        config: &AppConfig,
        http: Arc<dyn HttpClient>,
        state: Arc<dyn StateStore>,
        clock: SharedClock,
    ) -> Self {
        let mut ctx = Self::new(http, state, clock);
        ctx.timeout = config.request_timeout();
        ctx.failure_threshold = config.circuit_breaker.failure_threshold;
        ctx.reset_timeout = config.reset_timeout();
        ctx
    }

    pub fn with_retry_table(mut self, retry_table: RetryTable) -> Self {
        self.retry_table = retry_table;
        self
    }

    /// A breaker for `service` over the shared state, e.g. to inspect it
    pub fn breaker(&self, service: &str) -> CircuitBreaker {
        CircuitBreaker::new(service, self.state.clone(), self.clock.clone())
            .with_failure_threshold(self.failure_threshold)
            .with_reset_timeout(self.reset_timeout)
    }
}

/// A provider wrapped in rate limiting, circuit breaking and retries.
///
/// Nothing raised by the upstream escapes [`SourceClient::fetch`]; a failed or
/// skipped call is an empty result.
pub struct SourceClient {
    provider: Box<dyn Provider>,
    base_url: String,
    credential: Option<String>,
    rate_limit: Option<RateLimit>,
    http: Arc<dyn HttpClient>,
    rate_gate: Arc<RateGate>,
    breaker: CircuitBreaker,
    retry: RetryExecutor,
    retry_table: RetryTable,
    timeout: Duration,
    clock: SharedClock,
    logger: Logger,
}

impl SourceClient {
    pub fn new(provider: Box<dyn Provider>, ctx: &SourceContext) -> Self {
        let name = provider.name().to_string();
        Self {
            base_url: provider.base_url().to_string(),
            credential: None,
            rate_limit: None,
            http: ctx.http.clone(),
            rate_gate: ctx.rate_gate.clone(),
            breaker: ctx.breaker(&name),
            retry: RetryExecutor::new(name.clone()),
            retry_table: ctx.retry_table.clone(),
            timeout: ctx.timeout,
            clock: ctx.clock.clone(),
            logger: Logger::new().with_prefix(name),
            provider,
        }
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    pub fn with_retry_table(mut self, retry_table: RetryTable) -> Self {
        self.retry_table = retry_table;
        self
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn rate_limit(&self) -> Option<&RateLimit> {
        self.rate_limit.as_ref()
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    /// One guarded outbound call. `None` means the call was skipped or failed.
    pub async fn fetch(&self, endpoint: &str, params: &[(String, String)]) -> Option<Value> {
        if !self.rate_gate.allow(self.name(), self.rate_limit.as_ref()).await {
            self.logger.warn("Rate limit reached, skipping fetch");
            return None;
        }

        if !self.breaker.is_available().await {
            self.logger.warn("Circuit open, skipping fetch");
            return None;
        }

        match self.call(endpoint, params).await {
            Ok(payload) => {
                self.breaker.record_success().await;
                Some(payload)
            }
            Err(e) => {
                self.breaker.record_failure().await;
                self.logger.error(&format!("Fetch from {} failed: {}", endpoint, e));
                None
            }
        }
    }

    async fn call(&self, endpoint: &str, params: &[(String, String)]) -> Result<Value> {
        let url = join_url(&self.base_url, endpoint)?;
        let mut query = params.to_vec();
        if let Some(credential) = &self.credential {
            query.push((self.provider.credential_param().to_string(), credential.clone()));
        }

        self.logger.debug(&format!("GET {}", url));
        let http = self.http.as_ref();
        let (url, query, timeout) = (url.as_str(), query.as_slice(), self.timeout);
        self.retry
            .execute(&self.retry_table, move || http.get_json(url, query, timeout))
            .await
    }
}

#[async_trait]
impl NewsSource for SourceClient {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn fetch_articles(&self) -> Result<Vec<ArticleRecord>> {
        let fetched_at = self.clock.now();
        let query = self.provider.query();
        let Some(payload) = self.fetch(self.provider.endpoint(), &query).await else {
            return Ok(Vec::new());
        };

        match self.provider.normalize(&payload, fetched_at) {
            Ok(records) => {
                self.logger.info(&format!("📰 Fetched {} articles", records.len()));
                Ok(records)
            }
            Err(e) => {
                self.logger.error(&format!("Failed to read payload: {}", e));
                Ok(Vec::new())
            }
        }
    }
}
