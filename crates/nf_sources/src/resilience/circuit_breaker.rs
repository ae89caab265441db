use chrono::{DateTime, Utc};
use nf_core::{Result, SharedClock, StateStore, StateStoreExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

const KEY_PREFIX: &str = "circuit_breaker";

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CircuitStatus::Closed => "CLOSED",
            CircuitStatus::Open => "OPEN",
            CircuitStatus::HalfOpen => "HALF_OPEN",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitState {
    pub status: CircuitStatus,
    pub consecutive_failures: u32,
    pub last_transition_at: DateTime<Utc>,
}

impl CircuitState {
    pub fn closed(at: DateTime<Utc>) -> Self {
        Self {
            status: CircuitStatus::Closed,
            consecutive_failures: 0,
            last_transition_at: at,
        }
    }
}

/// Per-source availability gate. State lives in the shared store under
/// `circuit_breaker:{service}` and is never deleted, only overwritten.
///
/// Transitions: CLOSED -> OPEN after `failure_threshold` consecutive failures,
/// OPEN -> HALF_OPEN once `reset_timeout` has passed, HALF_OPEN -> CLOSED on a
/// success and HALF_OPEN -> OPEN when failures reach the threshold again.
pub struct CircuitBreaker {
    service: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    store: Arc<dyn StateStore>,
    clock: SharedClock,
    guard: Mutex<()>,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, store: Arc<dyn StateStore>, clock: SharedClock) -> Self {
        Self {
            service: service.into(),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            store,
            clock,
            guard: Mutex::new(()),
        }
    }

    pub fn with_failure_threshold(mut self, failure_threshold: u32) -> Self {
        self.failure_threshold = failure_threshold.max(1);
        self
    }

    pub fn with_reset_timeout(mut self, reset_timeout: Duration) -> Self {
        self.reset_timeout = reset_timeout;
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn key(service: &str) -> String {
        format!("{KEY_PREFIX}:{service}")
    }

    pub async fn state(&self) -> Result<CircuitState> {
        let default = CircuitState::closed(self.clock.now());
        self.store.get_or_default(&Self::key(&self.service), default).await
    }

    async fn save(&self, state: &CircuitState) -> Result<()> {
        self.store.put_json(&Self::key(&self.service), state, None).await
    }

    /// True when CLOSED or HALF_OPEN. An OPEN breaker whose reset timeout has
    /// strictly passed moves to HALF_OPEN and answers true.
    ///
    /// A state store failure answers true.
    pub async fn is_available(&self) -> bool {
        match self.try_is_available().await {
            Ok(available) => available,
            Err(e) => {
                warn!(source = %self.service, error = %e, "Circuit state unavailable, assuming closed");
                true
            }
        }
    }

    async fn try_is_available(&self) -> Result<bool> {
        let _guard = self.guard.lock().await;
        let mut state = self.state().await?;

        match state.status {
            CircuitStatus::Closed | CircuitStatus::HalfOpen => Ok(true),
            CircuitStatus::Open => {
                let now = self.clock.now();
                let elapsed = (now - state.last_transition_at).to_std().unwrap_or_default();
                if elapsed > self.reset_timeout {
                    state.status = CircuitStatus::HalfOpen;
                    state.consecutive_failures = 0;
                    state.last_transition_at = now;
                    self.save(&state).await?;
                    info!(source = %self.service, "Circuit half-open, probing");
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    pub async fn record_success(&self) {
        if let Err(e) = self.try_record_success().await {
            warn!(source = %self.service, error = %e, "Failed to record circuit success");
        }
    }

    async fn try_record_success(&self) -> Result<()> {
        let _guard = self.guard.lock().await;
        let state = self.state().await?;

        // tripped by a concurrent failure while this call was in flight
        if state.status == CircuitStatus::Open {
            return Ok(());
        }

        if state.status == CircuitStatus::HalfOpen {
            info!(source = %self.service, "Circuit closed");
        }
        self.save(&CircuitState::closed(self.clock.now())).await
    }

    pub async fn record_failure(&self) {
        if let Err(e) = self.try_record_failure().await {
            warn!(source = %self.service, error = %e, "Failed to record circuit failure");
        }
    }

    async fn try_record_failure(&self) -> Result<()> {
        let _guard = self.guard.lock().await;
        let mut state = self.state().await?;

        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_transition_at = self.clock.now();
        if state.consecutive_failures >= self.failure_threshold {
            if state.status != CircuitStatus::Open {
                warn!(
                    source = %self.service,
                    failures = state.consecutive_failures,
                    "Circuit opened"
                );
            }
            state.status = CircuitStatus::Open;
        }
        self.save(&state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nf_core::{Clock, ManualClock};
    use nf_storage::InMemoryStateStore;

    fn breaker() -> (CircuitBreaker, ManualClock) {
        let clock = ManualClock::default();
        let store = Arc::new(InMemoryStateStore::with_clock(Arc::new(clock.clone())));
        let breaker = CircuitBreaker::new("NewsAPI", store, Arc::new(clock.clone()));
        (breaker, clock)
    }

    #[tokio::test]
    async fn test_starts_closed() {
        let (breaker, _) = breaker();
        assert!(breaker.is_available().await);
        let state = breaker.state().await.unwrap();
        assert_eq!(state.status, CircuitStatus::Closed);
        assert_eq!(state.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_opens_at_threshold() {
        let (breaker, _) = breaker();

        breaker.record_failure().await;
        breaker.record_failure().await;
        assert!(breaker.is_available().await);
        assert_eq!(breaker.state().await.unwrap().status, CircuitStatus::Closed);

        breaker.record_failure().await;
        assert!(!breaker.is_available().await);
        assert_eq!(breaker.state().await.unwrap().status, CircuitStatus::Open);
    }

    #[tokio::test]
    async fn test_stays_open_until_reset_timeout_has_passed() {
        let (breaker, clock) = breaker();
        for _ in 0..5 {
            breaker.record_failure().await;
        }

        clock.advance(Duration::from_secs(30));
        assert!(!breaker.is_available().await);

        // exactly the timeout is not enough
        clock.advance(Duration::from_secs(30));
        assert!(!breaker.is_available().await);

        clock.advance(Duration::from_secs(1));
        assert!(breaker.is_available().await);
    }

    #[tokio::test]
    async fn test_single_half_open_transition_then_close() {
        let (breaker, clock) = breaker();
        for _ in 0..3 {
            breaker.record_failure().await;
        }
        clock.advance(Duration::from_secs(61));

        assert!(breaker.is_available().await);
        let probing = breaker.state().await.unwrap();
        assert_eq!(probing.status, CircuitStatus::HalfOpen);
        assert_eq!(probing.consecutive_failures, 0);
        assert_eq!(probing.last_transition_at, clock.now());

        // further checks do not transition again
        clock.advance(Duration::from_secs(5));
        assert!(breaker.is_available().await);
        assert_eq!(breaker.state().await.unwrap(), probing);

        breaker.record_success().await;
        let state = breaker.state().await.unwrap();
        assert_eq!(state.status, CircuitStatus::Closed);
        assert_eq!(state.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_half_open_reopens_after_threshold_failures() {
        let (breaker, clock) = breaker();
        for _ in 0..3 {
            breaker.record_failure().await;
        }
        clock.advance(Duration::from_secs(61));
        assert!(breaker.is_available().await);

        for _ in 0..3 {
            breaker.record_failure().await;
        }
        assert_eq!(breaker.state().await.unwrap().status, CircuitStatus::Open);
        assert!(!breaker.is_available().await);
    }

    #[tokio::test]
    async fn test_late_success_never_closes_open_circuit() {
        let (breaker, _) = breaker();
        for _ in 0..3 {
            breaker.record_failure().await;
        }
        breaker.record_success().await;
        assert_eq!(breaker.state().await.unwrap().status, CircuitStatus::Open);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let (breaker, _) = breaker();
        breaker.record_failure().await;
        breaker.record_failure().await;
        breaker.record_success().await;
        breaker.record_failure().await;
        breaker.record_failure().await;
        assert!(breaker.is_available().await);
        assert_eq!(breaker.state().await.unwrap().consecutive_failures, 2);
    }

    #[tokio::test]
    async fn test_state_is_shared_through_the_store() {
        let clock = ManualClock::default();
        let store: Arc<dyn StateStore> =
            Arc::new(InMemoryStateStore::with_clock(Arc::new(clock.clone())));
        let first = CircuitBreaker::new("Guardian", store.clone(), Arc::new(clock.clone()))
            .with_failure_threshold(1);
        first.record_failure().await;

        let second = CircuitBreaker::new("Guardian", store, Arc::new(clock));
        assert!(!second.is_available().await);
    }
}
