use crate::rpc::RpcClient;
use kernel_common::errors::{ErrorKind, KernelResult};
use kernel_common::model::{PendingTx, PendingTxState};
use kernel_common::traits::Clock;
use log::{debug, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct ReconcileOptions {
    pub timeout_ms: i64,
    pub poll_interval_ms: i64,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self { timeout_ms: 300_000, poll_interval_ms: 1_000 }
    }
}

impl ReconcileOptions {
    pub fn clamped(mut self) -> Self {
        self.timeout_ms = self.timeout_ms.max(1_000);
        self.poll_interval_ms = self.poll_interval_ms.max(250);
        self
    }
}

/// Deadline-bounded polling loop for transaction inclusion (§4.5). Never
/// mutates financial fields; only annotates provenance and terminal state.
pub struct ReceiptReconciler {
    rpc: Arc<dyn RpcClient>,
    clock: Arc<dyn Clock>,
}

impl ReceiptReconciler {
    pub fn new(rpc: Arc<dyn RpcClient>, clock: Arc<dyn Clock>) -> Self {
        Self { rpc, clock }
    }

    pub async fn wait_for_confirmation(
        &self,
        mut tx: PendingTx,
        opts: ReconcileOptions,
        cancel: &CancellationToken,
    ) -> KernelResult<PendingTx> {
        let Some(txid) = tx.txid.clone() else {
            return Err(ErrorKind::PrecondFailed("reconcile called without a txid".to_string()));
        };
        let opts = opts.clamped();
        let deadline = self.clock.now_ms() + opts.timeout_ms;

        while self.clock.now_ms() < deadline {
            if cancel.is_cancelled() {
                debug!("reconcile cancelled for tx {}; returning latest snapshot in Confirming", tx.id);
                return Ok(tx);
            }

            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_millis(opts.poll_interval_ms as u64)) => {}
                _ = cancel.cancelled() => {
                    return Ok(tx);
                }
            }

            let probe = self.rpc.fetch_transaction(&txid, tx.network).await;
            let checked_at = self.clock.now_ms();
            tx.receipt_checked_at = Some(checked_at);
            tx.receipt_probe_attempts += 1;

            match probe {
                Ok((dto, provenance)) => {
                    let previous_hash = tx.accepting_block_hash.clone();
                    tx.accepting_block_hash = dto.accepting_block_hash.clone();
                    tx.receipt_reorged = match (&previous_hash, &dto.accepting_block_hash) {
                        (Some(prev), Some(curr)) => prev != curr,
                        _ => false,
                    };
                    tx.receipt_source_backend = Some(provenance.backend_source.into());
                    tx.receipt_source_endpoint = Some(provenance.endpoint);

                    if dto.accepting_block_hash.is_some() {
                        tx.state = PendingTxState::Confirmed;
                        tx.confirmations = Some(1);
                        tx.confirmed_at = Some(checked_at);
                        tx.signed_tx_payload = None;
                        return Ok(tx);
                    }
                }
                Err(e) => {
                    warn!("receipt probe failed for tx {}: {e}", tx.id);
                }
            }
        }

        tx.state = PendingTxState::Failed;
        tx.error = Some(ErrorKind::ConfirmTimeout.to_string());
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::client::Provenance;
    use crate::rpc::pool::BackendSource as PoolBackendSource;
    use crate::rpc::types::{BalanceDto, BlockDagInfoDto, FeeEstimateDto, TransactionDto, UtxoEntryDto};
    use async_trait::async_trait;
    use kernel_common::model::{BackendSource as Bs, ScriptClass, Utxo};
    use kernel_common::network::Network;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    fn fake_provenance() -> Provenance {
        Provenance { endpoint: "https://fake-receipt-endpoint".to_string(), backend_source: PoolBackendSource::Remote, backend_reason: "test" }
    }

    struct FakeClock(AtomicI64);
    impl Clock for FakeClock {
        fn now_ms(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct FakeRpc {
        attempts: AtomicUsize,
        confirms_after: usize,
    }

    #[async_trait]
    impl RpcClient for FakeRpc {
        async fn fetch_utxos(&self, _: &str, _: Network) -> KernelResult<(Vec<UtxoEntryDto>, Provenance)> {
            unimplemented!()
        }
        async fn fetch_balance(&self, _: &str, _: Network) -> KernelResult<(BalanceDto, Provenance)> {
            unimplemented!()
        }
        async fn fetch_fee_estimate(&self, _: Network) -> KernelResult<(FeeEstimateDto, Provenance)> {
            unimplemented!()
        }
        async fn fetch_dag_info(&self, _: Network) -> KernelResult<(BlockDagInfoDto, Provenance)> {
            unimplemented!()
        }
        async fn broadcast_tx(&self, _: Network, _: serde_json::Value) -> KernelResult<(String, Provenance)> {
            unimplemented!()
        }
        async fn fetch_transaction(&self, txid: &str, _: Network) -> KernelResult<(TransactionDto, Provenance)> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let accepting_block_hash = if attempt >= self.confirms_after { Some("block-1".to_string()) } else { None };
            Ok((TransactionDto { transaction_id: txid.to_string(), accepting_block_hash }, fake_provenance()))
        }
    }

    fn sample_tx(txid: &str) -> PendingTx {
        PendingTx {
            id: uuid::Uuid::new_v4(),
            state: PendingTxState::Confirming,
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
            signed_at: Some(0),
            broadcast_at: Some(0),
            confirmed_at: None,
            txid: Some(txid.to_string()),
            confirmations: None,
            accepting_block_hash: None,
            receipt_checked_at: None,
            receipt_probe_attempts: 0,
            receipt_source_backend: None::<Bs>,
            receipt_source_endpoint: None,
            receipt_reorged: false,
            error: None,
            signed_tx_payload: Some("payload".to_string()),
            agent_job_id: None,
            op_return_hex: None,
        }
    }

    #[tokio::test]
    async fn confirms_once_accepting_block_hash_appears() {
        let clock = Arc::new(FakeClock(AtomicI64::new(0)));
        let rpc: Arc<dyn RpcClient> = Arc::new(FakeRpc { attempts: AtomicUsize::new(0), confirms_after: 2 });
        let reconciler = ReceiptReconciler::new(rpc, clock);

        let opts = ReconcileOptions { timeout_ms: 300_000, poll_interval_ms: 1 };
        let result = reconciler.wait_for_confirmation(sample_tx("abc"), opts, &CancellationToken::new()).await.unwrap();

        assert_eq!(result.state, PendingTxState::Confirmed);
        assert_eq!(result.confirmations, Some(1));
        assert!(result.signed_tx_payload.is_none());
        assert_eq!(result.receipt_source_backend, Some(Bs::Remote));
        assert_eq!(result.receipt_source_endpoint.as_deref(), Some("https://fake-receipt-endpoint"));
    }

    #[tokio::test]
    async fn precondition_fails_without_a_txid() {
        let clock = Arc::new(FakeClock(AtomicI64::new(0)));
        let rpc: Arc<dyn RpcClient> = Arc::new(FakeRpc { attempts: AtomicUsize::new(0), confirms_after: 1 });
        let reconciler = ReceiptReconciler::new(rpc, clock);

        let mut tx = sample_tx("abc");
        tx.txid = None;
        let err = reconciler.wait_for_confirmation(tx, ReconcileOptions::default(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ErrorKind::PrecondFailed(_)));
    }

    #[tokio::test]
    async fn cancellation_returns_latest_snapshot_without_waiting_further() {
        let clock = Arc::new(FakeClock(AtomicI64::new(0)));
        let rpc: Arc<dyn RpcClient> = Arc::new(FakeRpc { attempts: AtomicUsize::new(0), confirms_after: 1000 });
        let reconciler = ReceiptReconciler::new(rpc, clock);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = reconciler.wait_for_confirmation(sample_tx("abc"), ReconcileOptions::default(), &cancel).await.unwrap();
        assert_eq!(result.state, PendingTxState::Confirming);
    }
}
