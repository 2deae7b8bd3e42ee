use kernel_common::errors::Stage;
use kernel_common::model::{BackendSource, PendingTxState, TelemetryChannel, TelemetryEvent, TelemetryStatus};
use kernel_common::network::Network;
use kernel_common::traits::{Clock, KVStore};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

const AUDIT_KV_KEY: &str = "execution.audit.v1";

/// Append-only telemetry, retained as a bounded ring buffer (§3, default 600
/// events). Writes are best-effort and never affect pipeline success (§4.4).
pub struct TelemetryLog {
    kv: Arc<dyn KVStore>,
    clock: Arc<dyn Clock>,
    max_events: usize,
    events: RwLock<VecDeque<TelemetryEvent>>,
}

#[derive(Default)]
pub struct EventBuilder {
    pub backend_source: Option<BackendSource>,
    pub backend_reason: Option<String>,
    pub backend_endpoint: Option<String>,
    pub error: Option<String>,
    pub context: Option<String>,
}

impl TelemetryLog {
    pub fn new(kv: Arc<dyn KVStore>, clock: Arc<dyn Clock>, max_events: usize) -> Self {
        Self { kv, clock, max_events, events: RwLock::new(VecDeque::new()) }
    }

    pub async fn hydrate(&self) {
        if let Some(value) = self.kv.get(AUDIT_KV_KEY).await {
            if let Ok(events) = serde_json::from_value::<Vec<TelemetryEvent>>(value) {
                *self.events.write().await = events.into();
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn emit(
        &self,
        run_id: Uuid,
        channel: TelemetryChannel,
        stage: Stage,
        status: TelemetryStatus,
        network: Network,
        tx_id: Option<Uuid>,
        tx_state: Option<PendingTxState>,
        extra: EventBuilder,
    ) {
        let event = TelemetryEvent {
            id: Uuid::new_v4(),
            run_id,
            channel,
            stage,
            status,
            ts: self.clock.now_ms(),
            network,
            tx_id,
            tx_state,
            backend_source: extra.backend_source,
            backend_reason: extra.backend_reason,
            backend_endpoint: extra.backend_endpoint,
            error: extra.error,
            context: extra.context,
        };

        let mut guard = self.events.write().await;
        guard.push_back(event);
        while guard.len() > self.max_events {
            guard.pop_front();
        }
        if let Ok(value) = serde_json::to_value(guard.iter().collect::<Vec<_>>()) {
            self.kv.set(AUDIT_KV_KEY, value).await;
        }
    }

    pub async fn recent(&self) -> Vec<TelemetryEvent> {
        self.events.read().await.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_common::kv_file::FileKvStore;
    use kernel_common::traits::SystemClock;

    fn kv() -> Arc<dyn KVStore> {
        Arc::new(FileKvStore::new(tempfile::tempdir().unwrap().keep().join("kv.json")))
    }

    #[tokio::test]
    async fn ring_buffer_drops_oldest_past_capacity() {
        let log = TelemetryLog::new(kv(), Arc::new(SystemClock), 3);
        for _ in 0..5 {
            log.emit(
                Uuid::new_v4(),
                TelemetryChannel::Manual,
                Stage::Build,
                TelemetryStatus::Ok,
                Network::Mainnet,
                None,
                None,
                EventBuilder::default(),
            )
            .await;
        }
        assert_eq!(log.recent().await.len(), 3);
    }
}
