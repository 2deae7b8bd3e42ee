use crate::coin_selector::select_utxos;
use crate::fee::{estimate_mass, network_fee, platform_fee};
use crate::pending_tx_store::PendingTxStore;
use crate::rpc::RpcClient;
use crate::utxo::UtxoSync;
use kernel_common::address::parse_address;
use kernel_common::errors::{ErrorKind, KernelResult};
use kernel_common::model::{PendingTx, PendingTxState};
use kernel_common::network::Network;
use kernel_common::traits::Clock;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Recipient {
    pub address: String,
    pub amount_sompi: u64,
}

#[derive(Debug, Clone)]
pub struct FeePolicy {
    pub treasury_address: Option<String>,
    pub platform_fee_bps: u64,
    pub min_platform_fee: u64,
    pub max_platform_fee: u64,
    pub fee_safety_bps: u64,
    pub fee_floor: u64,
    pub fee_ceiling: u64,
}

pub struct DryRunResult {
    pub valid: bool,
    pub estimated_fee: u64,
    pub change_amount: u64,
    pub errors: Vec<String>,
}

pub struct TxBuilder {
    utxo_sync: Arc<UtxoSync>,
    rpc: Arc<dyn RpcClient>,
    pending_tx_store: Arc<dyn PendingTxStore>,
    clock: Arc<dyn Clock>,
    policy: FeePolicy,
}

impl TxBuilder {
    pub fn new(
        utxo_sync: Arc<UtxoSync>,
        rpc: Arc<dyn RpcClient>,
        pending_tx_store: Arc<dyn PendingTxStore>,
        clock: Arc<dyn Clock>,
        policy: FeePolicy,
    ) -> Self {
        Self { utxo_sync, rpc, pending_tx_store, clock, policy }
    }

    async fn feerate(&self, network: Network) -> f64 {
        match self.rpc.fetch_fee_estimate(network).await {
            Ok((estimate, _provenance)) => estimate.priority_bucket.feerate,
            Err(_) => 1.0,
        }
    }

    fn network_fee_for(&self, mass: u64, feerate: f64) -> u64 {
        network_fee(mass, feerate, self.policy.fee_safety_bps, self.policy.fee_floor, self.policy.fee_ceiling)
    }

    /// Builds and persists a `Building` `PendingTx` for one or more
    /// recipients (§4.2, multi-recipient generalization).
    pub async fn build(&self, from_address: &str, network: Network, recipients: &[Recipient]) -> KernelResult<PendingTx> {
        if recipients.is_empty() {
            return Err(ErrorKind::IntentEmpty);
        }
        for recipient in recipients {
            if recipient.amount_sompi == 0 {
                return Err(ErrorKind::AmountTooSmall);
            }
            parse_address(&recipient.address, network)?;
        }
        parse_address(from_address, network)?;

        let amount_sompi: u64 = recipients.iter().map(|r| r.amount_sompi).sum();
        let treasury_configured = self.policy.treasury_address.is_some();
        let fee_to_treasury = platform_fee(
            amount_sompi,
            self.policy.platform_fee_bps,
            self.policy.min_platform_fee,
            self.policy.max_platform_fee,
            treasury_configured,
        );
        let spend = amount_sompi.saturating_add(fee_to_treasury.unwrap_or(0));
        let n_outputs = recipients.len() + 1 + if fee_to_treasury.is_some() { 1 } else { 0 };

        let locked_keys = self.pending_tx_store.locked_utxo_keys(from_address).await;
        let utxo_set = self.utxo_sync.get_or_sync_utxos(from_address, network).await?;
        let feerate = self.feerate(network).await;

        // First pass: estimate with a single input.
        let first_mass = estimate_mass(1, n_outputs);
        let first_fee = self.network_fee_for(first_mass, feerate);
        let (mut selected, mut running_total) = select_utxos(&utxo_set.utxos, spend, first_fee, &locked_keys)?;

        // Second pass: re-estimate with the actual input count.
        let second_mass = estimate_mass(selected.len(), n_outputs);
        let second_fee = self.network_fee_for(second_mass, feerate);
        if spend.saturating_add(second_fee) > running_total {
            let reselected = select_utxos(&utxo_set.utxos, spend, second_fee, &locked_keys)?;
            selected = reselected.0;
            running_total = reselected.1;
        }

        let fee = second_fee;
        if running_total < spend.saturating_add(fee) {
            return Err(ErrorKind::InsufficientFunds(format!(
                "have {running_total} sompi, need {} sompi",
                spend.saturating_add(fee)
            )));
        }
        let change_amount = running_total - spend - fee;
        let change = if change_amount > 0 { Some((from_address.to_string(), change_amount)) } else { None };

        let mut outputs: Vec<(String, u64)> = recipients.iter().map(|r| (r.address.clone(), r.amount_sompi)).collect();
        if let (Some(treasury), Some(fee_amount)) = (&self.policy.treasury_address, fee_to_treasury) {
            outputs.push((treasury.clone(), fee_amount));
        }

        let tx = PendingTx {
            id: Uuid::new_v4(),
            state: PendingTxState::Building,
            from_address: from_address.to_string(),
            network,
            inputs: selected,
            outputs,
            change,
            fee,
            platform_fee: fee_to_treasury,
            built_at: self.clock.now_ms(),
            signed_at: None,
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
            signed_tx_payload: None,
            agent_job_id: None,
            op_return_hex: None,
        };

        self.pending_tx_store.put(tx.clone()).await?;
        Ok(tx)
    }

    /// Pre-broadcast sanity pass (§4.2). Always fetches a fresh UTXO set and
    /// never mutates `tx` (§8 invariant 9).
    pub async fn dry_run_validate(&self, tx: &PendingTx) -> KernelResult<DryRunResult> {
        let mut errors = Vec::new();

        let fresh_set = self.utxo_sync.sync_utxos(&tx.from_address, tx.network).await?;
        for input in &tx.inputs {
            let still_present = fresh_set.utxos.iter().any(|u| u.txid == input.txid && u.output_index == input.output_index);
            if !still_present {
                errors.push(ErrorKind::UtxoSpent(input.outpoint().to_string()).to_string());
            }
        }

        let feerate = self.feerate(tx.network).await;
        let n_outputs = tx.outputs.len() + if tx.change.is_some() { 1 } else { 0 };
        let mass = estimate_mass(tx.inputs.len(), n_outputs);
        let estimated_fee = self.network_fee_for(mass, feerate);

        let input_total: u128 = tx.inputs.iter().map(|u| u.amount as u128).sum();
        let output_total: u128 = tx.outputs.iter().map(|(_, a)| *a as u128).sum();
        let change_total: u128 = tx.change.as_ref().map(|(_, a)| *a as u128).unwrap_or(0);
        if input_total != output_total + change_total + estimated_fee as u128 {
            errors.push(format!(
                "{}",
                ErrorKind::BalanceMismatch(format!(
                    "inputs={input_total} outputs={output_total} change={change_total} fee={estimated_fee}"
                ))
            ));
        }

        for (address, _) in tx.outputs.iter().chain(tx.change.iter()) {
            if parse_address(address, tx.network).is_err() {
                errors.push(ErrorKind::NetworkMismatch(address.clone()).to_string());
            }
        }

        if let Some(treasury) = &self.policy.treasury_address {
            let treasury_tagged_index = if tx.platform_fee.is_some() { tx.outputs.len().checked_sub(1) } else { None };
            for (index, (address, _)) in tx.outputs.iter().enumerate() {
                let is_tagged_fee_output = treasury_tagged_index == Some(index);
                if address == treasury && !is_tagged_fee_output {
                    errors.push(ErrorKind::PrincipalToTreasury.to_string());
                }
            }
        }

        let change_amount = tx.change.as_ref().map(|(_, a)| *a).unwrap_or(0);
        Ok(DryRunResult { valid: errors.is_empty(), estimated_fee, change_amount, errors })
    }
}
