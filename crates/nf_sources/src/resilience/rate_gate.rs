use chrono::{DateTime, Utc};
use nf_core::config::RateLimitConfig;
use nf_core::{Result, SharedClock, StateStore, StateStoreExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::KeyLocks;

const KEY_PREFIX: &str = "rate_limit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimit {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window }
    }

    pub fn per_minutes(max_requests: u32, minutes: u64) -> Self {
        Self::new(max_requests, Duration::from_secs(minutes * 60))
    }
}

impl From<RateLimitConfig> for RateLimit {
    fn from(config: RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindowCounter {
    pub count: u32,
    pub window_expires_at: DateTime<Utc>,
}

/// Fixed-window admission per source, counted in the shared state store.
pub struct RateGate {
    store: Arc<dyn StateStore>,
    clock: SharedClock,
    locks: KeyLocks,
}

impl RateGate {
    pub fn new(store: Arc<dyn StateStore>, clock: SharedClock) -> Self {
        Self {
            store,
            clock,
            locks: KeyLocks::new(),
        }
    }

    pub fn key(source: &str) -> String {
        format!("{KEY_PREFIX}:{source}")
    }

    /// Admit one request for `source`. No limit means unlimited.
    ///
    /// A state store failure admits the request.
    pub async fn allow(&self, source: &str, limit: Option<&RateLimit>) -> bool {
        let Some(limit) = limit else {
            return true;
        };

        match self.try_allow(source, limit).await {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!(source, error = %e, "Rate gate state unavailable, admitting request");
                true
            }
        }
    }

    async fn try_allow(&self, source: &str, limit: &RateLimit) -> Result<bool> {
        let key = Self::key(source);
        let _guard = self.locks.lock(&key).await;
        let now = self.clock.now();

        let window =
            chrono::Duration::from_std(limit.window).unwrap_or_else(|_| chrono::Duration::zero());
        let counter = match self.store.get_json::<RateWindowCounter>(&key).await? {
            Some(counter) if counter.window_expires_at > now => counter,
            _ => RateWindowCounter {
                count: 0,
                window_expires_at: now + window,
            },
        };

        if counter.count >= limit.max_requests {
            debug!(source, count = counter.count, "Rate window exhausted");
            return Ok(false);
        }

        let next = RateWindowCounter {
            count: counter.count + 1,
            window_expires_at: counter.window_expires_at,
        };
        let remaining = (next.window_expires_at - now).to_std().unwrap_or(limit.window);
        self.store.put_json(&key, &next, Some(remaining)).await?;
        Ok(true)
    }
}
