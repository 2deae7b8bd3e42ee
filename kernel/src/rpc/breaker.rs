use kernel_common::model::{CircuitBreakerState, CircuitState};
use kernel_common::traits::{Clock, KVStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const BREAKER_KV_KEY: &str = "rpc.breakers.v1";

/// Three-state per-endpoint circuit breaker (§4.3). Trips on
/// `CB_TRIP_THRESHOLD` consecutive failures, half-opens after
/// `CB_RECOVER_MS`, closes on the next success.
pub struct CircuitBreaker {
    kv: Arc<dyn KVStore>,
    clock: Arc<dyn Clock>,
    trip_threshold: u32,
    recover_ms: i64,
    state: RwLock<HashMap<String, CircuitBreakerState>>,
}

impl CircuitBreaker {
    pub fn new(kv: Arc<dyn KVStore>, clock: Arc<dyn Clock>, trip_threshold: u32, recover_ms: i64) -> Self {
        Self { kv, clock, trip_threshold, recover_ms, state: RwLock::new(HashMap::new()) }
    }

    pub async fn hydrate(&self) {
        if let Some(value) = self.kv.get(BREAKER_KV_KEY).await {
            if let Ok(map) = serde_json::from_value::<HashMap<String, CircuitBreakerState>>(value) {
                *self.state.write().await = map;
            }
        }
    }

    /// Effective state for `base_url`, lazily transitioning `Open -> HalfOpen`
    /// once the cool-down has elapsed. Does not mutate stored state; the
    /// transition is observed, not persisted, until a subsequent call.
    pub async fn effective_state(&self, base_url: &str) -> CircuitState {
        let guard = self.state.read().await;
        let Some(entry) = guard.get(base_url) else {
            return CircuitState::Closed;
        };
        match entry.state {
            CircuitState::Open => {
                let opened_at = entry.opened_at.unwrap_or(0);
                if self.clock.now_ms() - opened_at > self.recover_ms {
                    CircuitState::HalfOpen
                } else {
                    CircuitState::Open
                }
            }
            other => other,
        }
    }

    pub async fn record_success(&self, base_url: &str) {
        {
            let mut guard = self.state.write().await;
            let entry = guard.entry(base_url.to_string()).or_default();
            entry.state = CircuitState::Closed;
            entry.failures = 0;
            entry.opened_at = None;
        }
        self.persist().await;
    }

    pub async fn record_failure(&self, base_url: &str) {
        let now = self.clock.now_ms();
        {
            let mut guard = self.state.write().await;
            let entry = guard.entry(base_url.to_string()).or_default();
            let was_half_open = matches!(self.effective_state_locked(entry), CircuitState::HalfOpen);
            entry.failures += 1;
            if was_half_open || entry.failures >= self.trip_threshold {
                entry.state = CircuitState::Open;
                entry.opened_at = Some(now);
            }
        }
        self.persist().await;
    }

    fn effective_state_locked(&self, entry: &CircuitBreakerState) -> CircuitState {
        match entry.state {
            CircuitState::Open => {
                let opened_at = entry.opened_at.unwrap_or(0);
                if self.clock.now_ms() - opened_at > self.recover_ms {
                    CircuitState::HalfOpen
                } else {
                    CircuitState::Open
                }
            }
            other => other,
        }
    }

    async fn persist(&self) {
        let guard = self.state.read().await;
        if let Ok(value) = serde_json::to_value(&*guard) {
            self.kv.set(BREAKER_KV_KEY, value).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_common::kv_file::FileKvStore;

    struct FakeClock {
        now: std::sync::atomic::AtomicI64,
    }
    impl Clock for FakeClock {
        fn now_ms(&self) -> i64 {
            self.now.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    fn kv() -> Arc<dyn KVStore> {
        Arc::new(FileKvStore::new(tempfile::tempdir().unwrap().keep().join("kv.json")))
    }

    #[tokio::test]
    async fn trips_open_at_threshold() {
        let clock = Arc::new(FakeClock { now: std::sync::atomic::AtomicI64::new(0) });
        let breaker = CircuitBreaker::new(kv(), clock, 4, 30_000);

        for _ in 0..3 {
            breaker.record_failure("https://a").await;
            assert_eq!(breaker.effective_state("https://a").await, CircuitState::Closed);
        }
        breaker.record_failure("https://a").await;
        assert_eq!(breaker.effective_state("https://a").await, CircuitState::Open);
    }

    #[tokio::test]
    async fn half_opens_after_recovery_window_then_closes_on_success() {
        let now = Arc::new(std::sync::atomic::AtomicI64::new(0));
        struct Shared(Arc<std::sync::atomic::AtomicI64>);
        impl Clock for Shared {
            fn now_ms(&self) -> i64 {
                self.0.load(std::sync::atomic::Ordering::SeqCst)
            }
        }
        let clock = Arc::new(Shared(now.clone()));
        let breaker = CircuitBreaker::new(kv(), clock, 1, 30_000);

        breaker.record_failure("https://a").await;
        assert_eq!(breaker.effective_state("https://a").await, CircuitState::Open);

        now.store(30_001, std::sync::atomic::Ordering::SeqCst);
        assert_eq!(breaker.effective_state("https://a").await, CircuitState::HalfOpen);

        breaker.record_success("https://a").await;
        assert_eq!(breaker.effective_state("https://a").await, CircuitState::Closed);
    }
}
