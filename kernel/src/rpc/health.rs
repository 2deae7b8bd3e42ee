use kernel_common::traits::{Clock, KVStore};
use kernel_common::model::EndpointHealth;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const HEALTH_KV_KEY: &str = "rpc.health.v1";

/// Per-endpoint latency/error tracker, persisted to KV so a restart does not
/// lose the prior ranking. Writes are fire-and-forget (§5).
pub struct HealthTracker {
    kv: Arc<dyn KVStore>,
    clock: Arc<dyn Clock>,
    state: RwLock<HashMap<String, EndpointHealth>>,
}

impl HealthTracker {
    pub fn new(kv: Arc<dyn KVStore>, clock: Arc<dyn Clock>) -> Self {
        Self { kv, clock, state: RwLock::new(HashMap::new()) }
    }

    pub async fn hydrate(&self) {
        if let Some(value) = self.kv.get(HEALTH_KV_KEY).await {
            if let Ok(map) = serde_json::from_value::<HashMap<String, EndpointHealth>>(value) {
                *self.state.write().await = map;
            }
        }
    }

    pub async fn snapshot(&self, base_url: &str) -> EndpointHealth {
        self.state.read().await.get(base_url).cloned().unwrap_or_default()
    }

    pub async fn record_success(&self, base_url: &str, latency_ms: u64, status: u16) {
        let now = self.clock.now_ms();
        {
            let mut guard = self.state.write().await;
            let entry = guard.entry(base_url.to_string()).or_default();
            entry.last_ok_at = Some(now);
            entry.consecutive_fails = 0;
            entry.last_latency_ms = Some(latency_ms);
            entry.last_status = Some(status);
            entry.last_error = None;
        }
        self.persist().await;
    }

    pub async fn record_failure(&self, base_url: &str, status: Option<u16>, error: &str) {
        let now = self.clock.now_ms();
        {
            let mut guard = self.state.write().await;
            let entry = guard.entry(base_url.to_string()).or_default();
            entry.last_fail_at = Some(now);
            entry.consecutive_fails += 1;
            entry.last_status = status;
            entry.last_error = Some(error.to_string());
        }
        self.persist().await;
    }

    /// Ranking key for the backend selector: healthier endpoints first.
    /// An endpoint that has never recorded a success sorts last (`i64::MAX`),
    /// not by negating the "never succeeded" sentinel.
    pub async fn rank_key(&self, base_url: &str) -> (i64, u32) {
        let health = self.snapshot(base_url).await;
        (health.last_ok_at.map(|t| -t).unwrap_or(i64::MAX), health.consecutive_fails)
    }

    async fn persist(&self) {
        let guard = self.state.read().await;
        if let Ok(value) = serde_json::to_value(&*guard) {
            self.kv.set(HEALTH_KV_KEY, value).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_common::traits::SystemClock;
    use kernel_common::kv_file::FileKvStore;

    #[tokio::test]
    async fn success_resets_consecutive_fails() {
        let dir = tempfile::tempdir().unwrap();
        let kv: Arc<dyn KVStore> = Arc::new(FileKvStore::new(dir.path().join("kv.json")));
        let tracker = HealthTracker::new(kv, Arc::new(SystemClock));

        tracker.record_failure("https://a", Some(500), "boom").await;
        tracker.record_failure("https://a", Some(500), "boom").await;
        assert_eq!(tracker.snapshot("https://a").await.consecutive_fails, 2);

        tracker.record_success("https://a", 12, 200).await;
        assert_eq!(tracker.snapshot("https://a").await.consecutive_fails, 0);
    }

    #[tokio::test]
    async fn rank_key_of_never_succeeded_endpoint_does_not_panic_and_sorts_last() {
        let dir = tempfile::tempdir().unwrap();
        let kv: Arc<dyn KVStore> = Arc::new(FileKvStore::new(dir.path().join("kv.json")));
        let tracker = HealthTracker::new(kv, Arc::new(SystemClock));

        let fresh = tracker.rank_key("https://never-succeeded").await;
        assert_eq!(fresh, (i64::MAX, 0));

        tracker.record_success("https://ok", 12, 200).await;
        let succeeded = tracker.rank_key("https://ok").await;
        assert!(succeeded < fresh);
    }
}
