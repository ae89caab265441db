pub mod circuit_breaker;
pub mod rate_gate;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitState, CircuitStatus};
pub use rate_gate::{RateGate, RateLimit, RateWindowCounter};
pub use retry::{RetryExecutor, RetryRule, RetryTable};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard};

/// One async lock per state key, so read-modify-write on a key has a single writer.
#[derive(Debug, Default, Clone)]
pub struct KeyLocks {
    locks: Arc<Mutex<HashMap<String, Arc<TokioMutex<()>>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(TokioMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
