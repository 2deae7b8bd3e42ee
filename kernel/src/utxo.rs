use crate::pending_tx_store::PendingTxStore;
use crate::rpc::RpcClient;
use crate::rpc::types::UtxoEntryDto;
use kernel_common::errors::{ErrorKind, KernelResult};
use kernel_common::model::{ScriptClass, Utxo, UtxoSet};
use kernel_common::network::Network;
use kernel_common::traits::Clock;
use kaspa_addresses::Address;
use kaspa_consensus_core::tx::ScriptPublicKey;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Produces an authoritative spendable view of an address's UTXOs, caching
/// the last synced set for `cache_ttl_ms` (§4.1). Mirrors the reference
/// wallet's snapshot-by-`Arc` pattern, scoped to one address at a time since
/// this kernel executes one intent's owner address per call.
pub struct UtxoSync {
    rpc: Arc<dyn RpcClient>,
    pending_tx_store: Arc<dyn PendingTxStore>,
    clock: Arc<dyn Clock>,
    cache_ttl_ms: i64,
    cache: RwLock<HashMap<String, Arc<UtxoSet>>>,
}

impl UtxoSync {
    pub fn new(rpc: Arc<dyn RpcClient>, pending_tx_store: Arc<dyn PendingTxStore>, clock: Arc<dyn Clock>, cache_ttl_ms: i64) -> Self {
        Self { rpc, pending_tx_store, clock, cache_ttl_ms, cache: RwLock::new(HashMap::new()) }
    }

    /// Forces a fresh fetch, overwriting the cache entry for `address`.
    pub async fn sync_utxos(&self, address: &str, network: Network) -> KernelResult<Arc<UtxoSet>> {
        let (dtos, _provenance) = self.rpc.fetch_utxos(address, network).await?;
        let utxos = dtos.into_iter().map(|dto| to_utxo(dto, network)).collect::<KernelResult<Vec<_>>>()?;
        let mut set = UtxoSet::new(address.to_string(), utxos, self.clock.now_ms());
        set.pending_outbound = self.pending_tx_store.locked_outbound_amount(address).await;
        let set = Arc::new(set);
        self.cache.write().await.insert(address.to_string(), set.clone());
        Ok(set)
    }

    /// Returns the cached set if fresh, else forces a sync.
    pub async fn get_or_sync_utxos(&self, address: &str, network: Network) -> KernelResult<Arc<UtxoSet>> {
        if let Some(cached) = self.cache.read().await.get(address) {
            if self.clock.now_ms() - cached.last_sync_at < self.cache_ttl_ms {
                return Ok(cached.clone());
            }
        }
        self.sync_utxos(address, network).await
    }

    /// Drops the cache entry for `address`, or the whole cache when `None`.
    /// Called after a successful broadcast (§4.4 invariant 8).
    pub async fn invalidate_utxo_cache(&self, address: Option<&str>) {
        match address {
            Some(address) => {
                self.cache.write().await.remove(address);
            }
            None => self.cache.write().await.clear(),
        }
    }
}

fn to_utxo(dto: UtxoEntryDto, network: Network) -> KernelResult<Utxo> {
    let amount: u64 = dto
        .utxo_entry
        .amount
        .trim()
        .parse()
        .map_err(|_| ErrorKind::Internal(format!("non-numeric utxo amount: {}", dto.utxo_entry.amount)))?;
    let block_daa_score: u64 = dto
        .utxo_entry
        .block_daa_score
        .trim()
        .parse()
        .map_err(|_| ErrorKind::Internal(format!("non-numeric daa score: {}", dto.utxo_entry.block_daa_score)))?;
    let script_bytes = hex::decode(&dto.utxo_entry.script_public_key.script_public_key)
        .map_err(|e| ErrorKind::Internal(format!("invalid script hex: {e}")))?;

    Ok(Utxo {
        txid: dto.outpoint.transaction_id,
        output_index: dto.outpoint.index,
        owner_address: dto.address.unwrap_or_default(),
        amount,
        script_public_key: dto.utxo_entry.script_public_key.script_public_key.clone(),
        script_version: dto.utxo_entry.script_public_key.version,
        script_class: classify_script(&script_bytes, dto.utxo_entry.script_public_key.version, network),
        block_daa_score,
        is_coinbase: dto.utxo_entry.is_coinbase,
    })
}

/// `Standard` iff `kaspa_txscript::extract_script_pub_key_address` recovers a
/// standard P2PK/P2SH address under the network prefix; anything the
/// extractor rejects is `Covenant` (Open Question (a), DESIGN.md).
pub fn classify_script(script_bytes: &[u8], version: u16, network: Network) -> ScriptClass {
    let spk = ScriptPublicKey::from_vec(version, script_bytes.to_vec());
    match kaspa_txscript::extract_script_pub_key_address(&spk, network.kaspa_addresses_prefix()) {
        Ok(address) => {
            let _: Address = address;
            ScriptClass::Standard
        }
        Err(_) => ScriptClass::Covenant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pending_tx_store::FileBackedPendingTxStore;
    use crate::rpc::client::Provenance;
    use crate::rpc::pool::BackendSource;
    use crate::rpc::types::{BalanceDto, BlockDagInfoDto, FeeEstimateDto, OutpointDto, ScriptPublicKeyDto, TransactionDto, UtxoEntryBodyDto};
    use async_trait::async_trait;
    use kernel_common::kv_file::FileKvStore;
    use kernel_common::traits::{KVStore, SystemClock};

    fn fake_provenance() -> Provenance {
        Provenance { endpoint: "https://fake".to_string(), backend_source: BackendSource::Remote, backend_reason: "test" }
    }

    fn pending_tx_store() -> Arc<dyn PendingTxStore> {
        Arc::new(FileBackedPendingTxStore::new(Arc::new(FileKvStore::new(tempfile::tempdir().unwrap().keep().join("kv.json")))
            as Arc<dyn KVStore>))
    }

    struct FakeRpc {
        utxos: Vec<UtxoEntryDto>,
    }

    #[async_trait]
    impl RpcClient for FakeRpc {
        async fn fetch_utxos(&self, _address: &str, _network: Network) -> KernelResult<(Vec<UtxoEntryDto>, Provenance)> {
            Ok((self.utxos.clone(), fake_provenance()))
        }
        async fn fetch_balance(&self, _address: &str, _network: Network) -> KernelResult<(BalanceDto, Provenance)> {
            unimplemented!()
        }
        async fn fetch_fee_estimate(&self, _network: Network) -> KernelResult<(FeeEstimateDto, Provenance)> {
            unimplemented!()
        }
        async fn fetch_dag_info(&self, _network: Network) -> KernelResult<(BlockDagInfoDto, Provenance)> {
            unimplemented!()
        }
        async fn broadcast_tx(&self, _network: Network, _transaction: serde_json::Value) -> KernelResult<(String, Provenance)> {
            unimplemented!()
        }
        async fn fetch_transaction(&self, _txid: &str, _network: Network) -> KernelResult<(TransactionDto, Provenance)> {
            unimplemented!()
        }
    }

    fn fake_entry(index: u32, amount: u64) -> UtxoEntryDto {
        UtxoEntryDto {
            address: Some("kaspa:test".to_string()),
            outpoint: OutpointDto { transaction_id: format!("tx{index}"), index },
            utxo_entry: UtxoEntryBodyDto {
                amount: amount.to_string(),
                script_public_key: ScriptPublicKeyDto { version: 0, script_public_key: String::new() },
                block_daa_score: "0".to_string(),
                is_coinbase: false,
            },
        }
    }

    #[tokio::test]
    async fn sync_then_get_or_sync_hits_cache_within_ttl() {
        let rpc: Arc<dyn RpcClient> = Arc::new(FakeRpc { utxos: vec![fake_entry(0, 100)] });
        let sync = UtxoSync::new(rpc, pending_tx_store(), Arc::new(SystemClock), 5_000);

        let first = sync.sync_utxos("kaspa:test", Network::Mainnet).await.unwrap();
        assert_eq!(first.utxos.len(), 1);

        let cached = sync.get_or_sync_utxos("kaspa:test", Network::Mainnet).await.unwrap();
        assert_eq!(Arc::ptr_eq(&first, &cached), true);
    }

    #[tokio::test]
    async fn invalidate_forces_a_fresh_sync() {
        let rpc: Arc<dyn RpcClient> = Arc::new(FakeRpc { utxos: vec![fake_entry(0, 100)] });
        let sync = UtxoSync::new(rpc, pending_tx_store(), Arc::new(SystemClock), 5_000);

        let first = sync.sync_utxos("kaspa:test", Network::Mainnet).await.unwrap();
        sync.invalidate_utxo_cache(Some("kaspa:test")).await;
        let second = sync.sync_utxos("kaspa:test", Network::Mainnet).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn pending_outbound_reflects_locked_amount_for_the_address() {
        use kernel_common::model::{PendingTx, PendingTxState};

        let rpc: Arc<dyn RpcClient> = Arc::new(FakeRpc { utxos: vec![fake_entry(0, 100)] });
        let store = pending_tx_store();
        let locking_tx = PendingTx {
            id: uuid::Uuid::new_v4(),
            state: PendingTxState::Signed,
            from_address: "kaspa:test".to_string(),
            network: Network::Mainnet,
            inputs: vec![Utxo {
                txid: "locked-tx".to_string(),
                output_index: 0,
                owner_address: "kaspa:test".to_string(),
                amount: 42,
                script_public_key: String::new(),
                script_version: 0,
                script_class: ScriptClass::Standard,
                block_daa_score: 0,
                is_coinbase: false,
            }],
            outputs: vec![("kaspa:bob".to_string(), 32)],
            change: None,
            fee: 10,
            platform_fee: None,
            built_at: 0,
            signed_at: Some(0),
            broadcast_at: None,
            confirmed_at: None,
            txid: None,
            confirmations: None,
            accepting_block_hash: None,
            receipt_checked_at: None,
            receipt_probe_attempts: 0,
            receipt_source_backend: None,
            receipt_source_endpoint: None,
            receipt_reorged: false,
            error: None,
            signed_tx_payload: Some("payload".to_string()),
            agent_job_id: None,
            op_return_hex: None,
        };
        store.put(locking_tx).await.unwrap();

        let sync = UtxoSync::new(rpc, store, Arc::new(SystemClock), 5_000);
        let set = sync.sync_utxos("kaspa:test", Network::Mainnet).await.unwrap();
        assert_eq!(set.pending_outbound, 42);
    }
}
