use crate::pending_tx_store::PendingTxStore;
use crate::reconciler::{ReceiptReconciler, ReconcileOptions};
use crate::rpc::client::Provenance;
use crate::rpc::RpcClient;
use crate::signer::Signer;
use crate::telemetry::{EventBuilder, TelemetryLog};
use crate::tx_builder::{Recipient, TxBuilder};
use crate::utxo::UtxoSync;
use kernel_common::errors::{ErrorKind, ExecutionError, Stage};
use kernel_common::model::{BackendSource, PendingTx, PendingTxState};
use kernel_common::network::Network;
use kernel_common::traits::Clock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use kernel_common::model::TelemetryChannel;

/// One execution request: a source address plus one or more payments (§4.4).
#[derive(Debug, Clone)]
pub struct Intent {
    pub from_address: String,
    pub network: Network,
    pub recipients: Vec<Recipient>,
    pub agent_job_id: Option<String>,
    pub op_return_hex: Option<String>,
}

pub struct ExecuteOptions {
    pub await_confirmation: bool,
    pub confirm_timeout_ms: i64,
    pub poll_interval_ms: i64,
    pub telemetry_channel: TelemetryChannel,
    pub run_id: Option<Uuid>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            await_confirmation: true,
            confirm_timeout_ms: 300_000,
            poll_interval_ms: 1_000,
            telemetry_channel: TelemetryChannel::Manual,
            run_id: None,
        }
    }
}

/// Drives one intent through `build -> validate -> sign -> broadcast ->
/// reconcile` (§4.4), updating the pending-tx store and emitting telemetry
/// at every stage.
pub struct ExecutionKernel {
    tx_builder: Arc<TxBuilder>,
    utxo_sync: Arc<UtxoSync>,
    signer: Arc<dyn Signer>,
    rpc: Arc<dyn RpcClient>,
    pending_tx_store: Arc<dyn PendingTxStore>,
    reconciler: Arc<ReceiptReconciler>,
    telemetry: Arc<TelemetryLog>,
    clock: Arc<dyn Clock>,
}

impl ExecutionKernel {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tx_builder: Arc<TxBuilder>,
        utxo_sync: Arc<UtxoSync>,
        signer: Arc<dyn Signer>,
        rpc: Arc<dyn RpcClient>,
        pending_tx_store: Arc<dyn PendingTxStore>,
        reconciler: Arc<ReceiptReconciler>,
        telemetry: Arc<TelemetryLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { tx_builder, utxo_sync, signer, rpc, pending_tx_store, reconciler, telemetry, clock }
    }

    pub async fn execute_intent(
        &self,
        intent: Intent,
        options: ExecuteOptions,
        cancel: CancellationToken,
    ) -> Result<PendingTx, ExecutionError> {
        let run_id = options.run_id.unwrap_or_else(Uuid::new_v4);

        if intent.recipients.is_empty() {
            return Err(ExecutionError::new(Stage::Build, ErrorKind::IntentEmpty));
        }
        if cancel.is_cancelled() {
            return Err(ExecutionError::new(Stage::Build, ErrorKind::PrecondFailed("cancelled before build".to_string())));
        }

        // 1. Build.
        let mut tx = self
            .tx_builder
            .build(&intent.from_address, intent.network, &intent.recipients)
            .await
            .map_err(|kind| ExecutionError::new(Stage::Build, kind))?;
        tx.agent_job_id = intent.agent_job_id.clone();
        tx.op_return_hex = intent.op_return_hex.clone();
        self.pending_tx_store.put(tx.clone()).await.map_err(|kind| ExecutionError::new(Stage::Build, kind).with_tx_id(tx.id))?;
        self.emit(run_id, &options, Stage::Build, Ok(()), &tx, None).await;

        if cancel.is_cancelled() {
            return self.cancel_tx(tx).await;
        }

        // 2. Validate.
        let dry_run = self.tx_builder.dry_run_validate(&tx).await.map_err(|kind| ExecutionError::new(Stage::Validate, kind).with_tx_id(tx.id))?;
        if !dry_run.valid {
            tx.state = PendingTxState::DryRunFail;
            tx.error = Some(dry_run.errors.join(";"));
            let _ = self.pending_tx_store.put(tx.clone()).await;
            let kind = ErrorKind::BalanceMismatch(tx.error.clone().unwrap_or_default());
            self.emit(run_id, &options, Stage::Validate, Err(kind.to_string()), &tx, None).await;
            return Err(ExecutionError::new(Stage::Validate, kind).with_tx_id(tx.id));
        }
        tx.state = PendingTxState::DryRunOk;
        tx.fee = dry_run.estimated_fee;
        self.pending_tx_store.put(tx.clone()).await.map_err(|kind| ExecutionError::new(Stage::Validate, kind).with_tx_id(tx.id))?;
        self.emit(run_id, &options, Stage::Validate, Ok(()), &tx, None).await;

        if cancel.is_cancelled() {
            return self.cancel_tx(tx).await;
        }

        // 3. Sign.
        let signed = match self.signer.sign(&tx).await {
            Ok(signed) => signed,
            Err(kind) => {
                tx.state = PendingTxState::Failed;
                tx.error = Some(kind.to_string());
                let _ = self.pending_tx_store.put(tx.clone()).await;
                self.emit(run_id, &options, Stage::Sign, Err(kind.to_string()), &tx, None).await;
                return Err(ExecutionError::new(Stage::Sign, kind).with_tx_id(tx.id));
            }
        };
        tx.state = PendingTxState::Signed;
        tx.signed_at = Some(self.clock.now_ms());
        tx.signed_tx_payload = Some(signed.serialized_hex.clone());
        tx.txid = signed.precomputed_txid.clone();
        self.pending_tx_store.put(tx.clone()).await.map_err(|kind| ExecutionError::new(Stage::Sign, kind).with_tx_id(tx.id))?;
        self.emit(run_id, &options, Stage::Sign, Ok(()), &tx, None).await;

        // Cancellation after the HTTP broadcast call has been accepted must not roll back (§5).
        // 4. Broadcast.
        let mut broadcast_provenance: Option<Provenance> = None;
        if tx.txid.is_none() || tx.broadcast_at.is_none() {
            let payload = tx.signed_tx_payload.clone().unwrap_or_default();
            let body: serde_json::Value = serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null);
            match self.rpc.broadcast_tx(tx.network, body).await {
                Ok((txid, provenance)) => {
                    tx.txid = Some(txid);
                    broadcast_provenance = Some(provenance);
                }
                Err(kind) => {
                    tx.state = PendingTxState::Failed;
                    tx.error = Some(kind.to_string());
                    let _ = self.pending_tx_store.put(tx.clone()).await;
                    self.emit(run_id, &options, Stage::Broadcast, Err(kind.to_string()), &tx, None).await;
                    return Err(ExecutionError::new(Stage::Broadcast, kind).with_tx_id(tx.id));
                }
            }
        }
        tx.state = PendingTxState::Confirming;
        tx.broadcast_at = Some(self.clock.now_ms());
        self.pending_tx_store.put(tx.clone()).await.map_err(|kind| ExecutionError::new(Stage::Broadcast, kind).with_tx_id(tx.id))?;
        self.utxo_sync.invalidate_utxo_cache(Some(&tx.from_address)).await;
        self.emit(run_id, &options, Stage::Broadcast, Ok(()), &tx, broadcast_provenance.as_ref()).await;

        // 5. Reconcile.
        if !options.await_confirmation {
            return Ok(tx);
        }

        let reconcile_opts = ReconcileOptions { timeout_ms: options.confirm_timeout_ms, poll_interval_ms: options.poll_interval_ms };
        let reconciled = self
            .reconciler
            .wait_for_confirmation(tx, reconcile_opts, &cancel)
            .await
            .map_err(|kind| ExecutionError::new(Stage::Reconcile, kind))?;
        let _ = self.pending_tx_store.put(reconciled.clone()).await;
        let status = if reconciled.state == PendingTxState::Confirmed { Ok(()) } else { Err(ErrorKind::ConfirmTimeout.to_string()) };
        let reconcile_provenance = reconciled.receipt_source_backend.map(|source| Provenance {
            endpoint: reconciled.receipt_source_endpoint.clone().unwrap_or_default(),
            backend_source: match source {
                BackendSource::Local => crate::rpc::pool::BackendSource::Local,
                BackendSource::Remote => crate::rpc::pool::BackendSource::Remote,
            },
            backend_reason: "receipt_probe",
        });
        self.emit(run_id, &options, Stage::Reconcile, status, &reconciled, reconcile_provenance.as_ref()).await;

        Ok(reconciled)
    }

    async fn cancel_tx(&self, mut tx: PendingTx) -> Result<PendingTx, ExecutionError> {
        tx.state = PendingTxState::Cancelled;
        let _ = self.pending_tx_store.put(tx.clone()).await;
        Err(ExecutionError::new(Stage::Build, ErrorKind::PrecondFailed("cancelled".to_string())).with_tx_id(tx.id))
    }

    async fn emit(
        &self,
        run_id: Uuid,
        options: &ExecuteOptions,
        stage: Stage,
        result: Result<(), String>,
        tx: &PendingTx,
        provenance: Option<&Provenance>,
    ) {
        let status = if result.is_ok() { kernel_common::model::TelemetryStatus::Ok } else { kernel_common::model::TelemetryStatus::Failed };
        let error = result.err();
        let (backend_source, backend_reason, backend_endpoint) = match provenance {
            Some(p) => (Some(p.backend_source.into()), Some(p.backend_reason.to_string()), Some(p.endpoint.clone())),
            None => (None, None, None),
        };
        self.telemetry
            .emit(
                run_id,
                options.telemetry_channel,
                stage,
                status,
                tx.network,
                Some(tx.id),
                Some(tx.state),
                EventBuilder { backend_source, backend_reason, backend_endpoint, error, ..Default::default() },
            )
            .await;
    }
}
