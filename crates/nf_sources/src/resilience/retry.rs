use nf_core::{FailureKind, Result};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryRule {
    /// Total invocations allowed for failures of this kind
    pub max_attempts: u32,
    pub delay: Duration,
    pub exponential_backoff: bool,
}

impl RetryRule {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            exponential_backoff: false,
        }
    }

    pub fn exponential(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            exponential_backoff: true,
        }
    }

    /// Pause after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.exponential_backoff {
            let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
            self.delay.saturating_mul(factor)
        } else {
            self.delay
        }
    }
}

/// Failure kind to retry rule. Kinds without a rule are never retried.
#[derive(Debug, Clone, Default)]
pub struct RetryTable {
    rules: HashMap<FailureKind, RetryRule>,
}

impl RetryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: FailureKind, rule: RetryRule) -> Self {
        self.rules.insert(kind, rule);
        self
    }

    pub fn rule(&self, kind: FailureKind) -> Option<&RetryRule> {
        self.rules.get(&kind)
    }

    /// Connectivity retried 5 times with exponential backoff from 2s,
    /// bad responses 3 times every second.
    pub fn upstream_default() -> Self {
        Self::new()
            .with(
                FailureKind::Connectivity,
                RetryRule::exponential(5, Duration::from_millis(2000)),
            )
            .with(
                FailureKind::BadResponse,
                RetryRule::fixed(3, Duration::from_millis(1000)),
            )
    }
}

/// Runs an operation until it succeeds or its failure kind runs out of attempts.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    service: String,
}

impl RetryExecutor {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Attempt budgets are counted per failure kind within this call.
    /// Backoff sleeps only suspend the calling task.
    pub async fn execute<T, F, Fut>(&self, table: &RetryTable, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts: HashMap<FailureKind, u32> = HashMap::new();

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let Some(kind) = err.failure_kind() else {
                return Err(err);
            };
            let Some(rule) = table.rule(kind) else {
                return Err(err);
            };

            let attempt = attempts.entry(kind).or_insert(0);
            *attempt += 1;
            let attempt = *attempt;
            if attempt >= rule.max_attempts {
                return Err(err);
            }

            let delay = rule.delay_for(attempt);
            let delay_ms = delay.as_millis() as u64;
            let source = self.service.as_str();
            match kind {
                FailureKind::Connectivity => {
                    warn!(source, attempt, %kind, delay_ms, error = %err, "Connection failed, retrying")
                }
                FailureKind::BadResponse => {
                    error!(source, attempt, %kind, delay_ms, error = %err, "Bad response, retrying")
                }
                _ => info!(source, attempt, %kind, delay_ms, error = %err, "Call failed, retrying"),
            }

            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nf_core::Error;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[test]
    fn test_delay_for() {
        let fixed = RetryRule::fixed(3, Duration::from_millis(100));
        assert_eq!(fixed.delay_for(1), Duration::from_millis(100));
        assert_eq!(fixed.delay_for(3), Duration::from_millis(100));

        let exp = RetryRule::exponential(5, Duration::from_millis(2000));
        assert_eq!(exp.delay_for(1), Duration::from_millis(2000));
        assert_eq!(exp.delay_for(2), Duration::from_millis(4000));
        assert_eq!(exp.delay_for(3), Duration::from_millis(8000));
        assert_eq!(RetryRule::exponential(5, Duration::MAX).delay_for(2), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_rule_invokes_exactly_max_attempts() {
        let table = RetryTable::new().with(
            FailureKind::BadResponse,
            RetryRule::fixed(3, Duration::from_millis(100)),
        );
        let calls = &AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<()> = RetryExecutor::new("test")
            .execute(&table, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::bad_response(503, "unavailable"))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(Error::BadResponse { status: 503, .. })));
        assert_eq!(started.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_delays_double() {
        let table = RetryTable::new().with(
            FailureKind::Connectivity,
            RetryRule::exponential(4, Duration::from_millis(2000)),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));

        let result: Result<()> = RetryExecutor::new("test")
            .execute(&table, || {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(Instant::now());
                    Err(Error::connectivity("timed out"))
                }
            })
            .await;
        assert!(result.is_err());

        let seen = seen.lock().unwrap();
        let gaps: Vec<u128> = seen.windows(2).map(|w| (w[1] - w[0]).as_millis()).collect();
        assert_eq!(gaps, vec![2000, 4000, 8000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlisted_kind_is_not_retried() {
        let table = RetryTable::upstream_default();
        let calls = &AtomicU32::new(0);

        let result: Result<()> = RetryExecutor::new("test")
            .execute(&table, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::InvalidPayload("expected value".into()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(Error::InvalidPayload(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budgets_are_per_kind() {
        let table = RetryTable::new()
            .with(FailureKind::Connectivity, RetryRule::fixed(2, Duration::from_millis(10)))
            .with(FailureKind::BadResponse, RetryRule::fixed(2, Duration::from_millis(10)));
        let calls = &AtomicU32::new(0);

        // connectivity, bad response, connectivity: the third call exhausts connectivity
        let result: Result<()> = RetryExecutor::new("test")
            .execute(&table, || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n % 2 == 0 {
                    Err(Error::connectivity("reset"))
                } else {
                    Err(Error::bad_response(500, "boom"))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(Error::Connectivity(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let calls = &AtomicU32::new(0);
        let value = RetryExecutor::new("test")
            .execute(&RetryTable::upstream_default(), || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::connectivity("refused"))
                } else {
                    Ok(42)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
