use async_trait::async_trait;
use kernel_common::errors::{ErrorKind, KernelResult};
use kernel_common::model::{OutpointKey, PendingTx, PendingTxState};
use kernel_common::traits::KVStore;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const PENDING_TXS_KV_KEY: &str = "pending.txs.v1";

/// Durable storage of `PendingTx` records, keyed by idempotency id.
/// Implementations must preserve write ordering per id (§5).
#[async_trait]
pub trait PendingTxStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Option<PendingTx>;
    async fn put(&self, tx: PendingTx) -> KernelResult<()>;
    async fn locked_utxo_keys(&self, from_address: &str) -> HashSet<OutpointKey>;
    /// Sum of amounts locked by `from_address`'s in-flight outgoing transactions
    /// (§3 `UtxoSet.pending_outbound`).
    async fn locked_outbound_amount(&self, from_address: &str) -> u64;
    async fn list(&self) -> Vec<PendingTx>;
}

/// `PendingTxStore` over a single JSON document, guarded by a `tokio::sync`
/// mutex — the same whole-document load/rewrite idiom as `FileKvStore`.
pub struct FileBackedPendingTxStore {
    kv: Arc<dyn KVStore>,
    write_lock: Mutex<()>,
}

impl FileBackedPendingTxStore {
    pub fn new(kv: Arc<dyn KVStore>) -> Self {
        Self { kv, write_lock: Mutex::new(()) }
    }

    async fn load_all(&self) -> Vec<PendingTx> {
        match self.kv.get(PENDING_TXS_KV_KEY).await {
            Some(value) => serde_json::from_value(value).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    async fn save_all(&self, txs: &[PendingTx]) -> KernelResult<()> {
        let value = serde_json::to_value(txs).map_err(|e| ErrorKind::Internal(e.to_string()))?;
        self.kv.set(PENDING_TXS_KV_KEY, value).await;
        Ok(())
    }
}

#[async_trait]
impl PendingTxStore for FileBackedPendingTxStore {
    async fn get(&self, id: Uuid) -> Option<PendingTx> {
        self.load_all().await.into_iter().find(|tx| tx.id == id)
    }

    /// Overwrites the durable record only when the existing entry is
    /// pre-`Signed` (Building/DryRunOk/DryRunFail), or there is no existing
    /// entry at all (§4.4 idempotency).
    async fn put(&self, tx: PendingTx) -> KernelResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut all = self.load_all().await;

        if let Some(existing) = all.iter().find(|t| t.id == tx.id) {
            let existing_is_mutable = matches!(
                existing.state,
                PendingTxState::Building | PendingTxState::DryRunOk | PendingTxState::DryRunFail
            );
            if !existing_is_mutable && existing.state != tx.state {
                return Err(ErrorKind::PrecondFailed(format!(
                    "refusing to overwrite tx {} in state {:?} with state {:?}",
                    tx.id, existing.state, tx.state
                )));
            }
        }

        all.retain(|t| t.id != tx.id);
        all.push(tx);
        self.save_all(&all).await
    }

    async fn locked_utxo_keys(&self, from_address: &str) -> HashSet<OutpointKey> {
        self.load_all()
            .await
            .into_iter()
            .filter(|tx| tx.from_address == from_address)
            .flat_map(|tx| tx.locked_keys())
            .collect()
    }

    async fn locked_outbound_amount(&self, from_address: &str) -> u64 {
        self.load_all()
            .await
            .into_iter()
            .filter(|tx| tx.from_address == from_address)
            .map(|tx| tx.locked_input_amount())
            .sum()
    }

    async fn list(&self) -> Vec<PendingTx> {
        self.load_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_common::kv_file::FileKvStore;
    use kernel_common::model::{BackendSource, Utxo, ScriptClass};
    use kernel_common::network::Network;

    fn kv() -> Arc<dyn KVStore> {
        Arc::new(FileKvStore::new(tempfile::tempdir().unwrap().keep().join("kv.json")))
    }

    fn base_tx(state: PendingTxState) -> PendingTx {
        PendingTx {
            id: Uuid::new_v4(),
            state,
            from_address: "kaspa:alice".to_string(),
            network: Network::Mainnet,
            inputs: vec![Utxo {
                txid: "t".to_string(),
                output_index: 0,
                owner_address: "kaspa:alice".to_string(),
                amount: 100,
                script_public_key: String::new(),
                script_version: 0,
                script_class: ScriptClass::Standard,
                block_daa_score: 0,
                is_coinbase: false,
            }],
            outputs: vec![("kaspa:bob".to_string(), 90)],
            change: None,
            fee: 10,
            platform_fee: None,
            built_at: 0,
            signed_at: None,
            broadcast_at: None,
            confirmed_at: None,
            txid: None,
            confirmations: None,
            accepting_block_hash: None,
            receipt_checked_at: None,
            receipt_probe_attempts: 0,
            receipt_source_backend: None::<BackendSource>,
            receipt_source_endpoint: None,
            receipt_reorged: false,
            error: None,
            signed_tx_payload: None,
            agent_job_id: None,
            op_return_hex: None,
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = FileBackedPendingTxStore::new(kv());
        let tx = base_tx(PendingTxState::Building);
        let id = tx.id;
        store.put(tx).await.unwrap();
        let loaded = store.get(id).await.unwrap();
        assert_eq!(loaded.id, id);
    }

    #[tokio::test]
    async fn locked_keys_only_include_lock_holding_states() {
        let store = FileBackedPendingTxStore::new(kv());
        store.put(base_tx(PendingTxState::Signed)).await.unwrap();
        store.put(base_tx(PendingTxState::Confirmed)).await.unwrap();

        let locked = store.locked_utxo_keys("kaspa:alice").await;
        assert_eq!(locked.len(), 1);
    }

    #[tokio::test]
    async fn locked_outbound_amount_sums_only_lock_holding_states() {
        let store = FileBackedPendingTxStore::new(kv());
        store.put(base_tx(PendingTxState::Signed)).await.unwrap();
        store.put(base_tx(PendingTxState::Confirmed)).await.unwrap();
        store.put(base_tx(PendingTxState::Failed)).await.unwrap();

        assert_eq!(store.locked_outbound_amount("kaspa:alice").await, 100);
        assert_eq!(store.locked_outbound_amount("kaspa:someone-else").await, 0);
    }

    #[tokio::test]
    async fn refuses_to_regress_a_post_signed_record() {
        let store = FileBackedPendingTxStore::new(kv());
        let mut tx = base_tx(PendingTxState::Broadcasting);
        tx.txid = Some("abc".to_string());
        let id = tx.id;
        store.put(tx.clone()).await.unwrap();

        let mut regressed = tx;
        regressed.state = PendingTxState::Building;
        let err = store.put(regressed).await.unwrap_err();
        assert!(matches!(err, ErrorKind::PrecondFailed(_)));

        assert_eq!(store.get(id).await.unwrap().state, PendingTxState::Broadcasting);
    }
}
