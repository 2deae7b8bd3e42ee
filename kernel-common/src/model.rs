use crate::errors::Stage;
use crate::network::Network;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Whether a UTXO's locking script is spendable by the kernel's own signer
/// path. Only `Standard` outputs are selectable — see Open Question (a) in
/// DESIGN.md for how this is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptClass {
    Standard,
    Covenant,
}

/// Identity key of a UTXO: `(txid, output_index)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutpointKey {
    pub txid: String,
    pub index: u32,
}

impl OutpointKey {
    pub fn new(txid: impl Into<String>, index: u32) -> Self {
        Self { txid: txid.into(), index }
    }
}

impl std::fmt::Display for OutpointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: String,
    pub output_index: u32,
    pub owner_address: String,
    pub amount: u64,
    pub script_public_key: String, // hex
    pub script_version: u16,
    pub script_class: ScriptClass,
    pub block_daa_score: u64,
    pub is_coinbase: bool,
}

impl Utxo {
    pub fn outpoint(&self) -> OutpointKey {
        OutpointKey::new(self.txid.clone(), self.output_index)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtxoSet {
    pub owner_address: String,
    pub utxos: Vec<Utxo>,
    pub confirmed_balance: u64,
    pub pending_outbound: u64,
    pub last_sync_at: i64,
}

impl UtxoSet {
    pub fn new(owner_address: String, utxos: Vec<Utxo>, last_sync_at: i64) -> Self {
        let confirmed_balance = utxos.iter().map(|u| u.amount).sum();
        Self { owner_address, utxos, confirmed_balance, pending_outbound: 0, last_sync_at }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingTxState {
    Building,
    DryRunOk,
    DryRunFail,
    Signed,
    Broadcasting,
    Confirming,
    Confirmed,
    Failed,
    Cancelled,
}

impl PendingTxState {
    /// States in which an input is considered locked against concurrent
    /// selection (§4.1 "Locked keys").
    pub fn locks_inputs(self) -> bool {
        matches!(
            self,
            PendingTxState::Building
                | PendingTxState::DryRunOk
                | PendingTxState::Signed
                | PendingTxState::Broadcasting
                | PendingTxState::Confirming
        )
    }

    /// True iff `self -> next` is a legal transition per the §4.4 state
    /// machine diagram.
    pub fn can_transition_to(self, next: PendingTxState) -> bool {
        use PendingTxState::*;
        match (self, next) {
            (Building, DryRunOk) | (Building, Failed) | (Building, Cancelled) => true,
            (DryRunOk, Signed) | (DryRunOk, Failed) | (DryRunOk, Cancelled) => true,
            (Building, DryRunFail) => true,
            (Signed, Broadcasting) | (Signed, Failed) | (Signed, Cancelled) => true,
            (Broadcasting, Confirming) | (Broadcasting, Failed) => true,
            (Confirming, Confirmed) | (Confirming, Failed) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendSource {
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTx {
    pub id: Uuid,
    pub state: PendingTxState,
    pub from_address: String,
    pub network: Network,
    pub inputs: Vec<Utxo>,
    pub outputs: Vec<(String, u64)>,
    pub change: Option<(String, u64)>,
    pub fee: u64,
    pub platform_fee: Option<u64>,

    pub built_at: i64,
    pub signed_at: Option<i64>,
    pub broadcast_at: Option<i64>,
    pub confirmed_at: Option<i64>,

    pub txid: Option<String>,
    pub confirmations: Option<u64>,
    pub accepting_block_hash: Option<String>,

    pub receipt_checked_at: Option<i64>,
    pub receipt_probe_attempts: u32,
    pub receipt_source_backend: Option<BackendSource>,
    pub receipt_source_endpoint: Option<String>,
    pub receipt_reorged: bool,

    pub error: Option<String>,
    pub signed_tx_payload: Option<String>,

    pub agent_job_id: Option<String>,
    pub op_return_hex: Option<String>,
}

impl PendingTx {
    /// `Σ inputs.amount == Σ outputs.amount + (change or 0) + fee` (§8 invariant 1).
    pub fn balance_invariant_holds(&self) -> bool {
        let input_total: u128 = self.inputs.iter().map(|u| u.amount as u128).sum();
        let output_total: u128 = self.outputs.iter().map(|(_, a)| *a as u128).sum();
        let change_total: u128 = self.change.as_ref().map(|(_, a)| *a as u128).unwrap_or(0);
        input_total == output_total + change_total + self.fee as u128
    }

    pub fn locked_keys(&self) -> HashSet<OutpointKey> {
        if self.state.locks_inputs() {
            self.inputs.iter().map(Utxo::outpoint).collect()
        } else {
            HashSet::new()
        }
    }

    /// Total input amount this record has locked away from selection, or 0
    /// once it is no longer in a lock-holding state (§3 `pending_outbound`).
    pub fn locked_input_amount(&self) -> u64 {
        if self.state.locks_inputs() {
            self.inputs.iter().map(|u| u.amount).sum()
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointHealth {
    pub last_ok_at: Option<i64>,
    pub last_fail_at: Option<i64>,
    pub consecutive_fails: u32,
    pub last_latency_ms: Option<u64>,
    pub last_status: Option<u16>,
    pub last_error: Option<String>,
}

impl Default for EndpointHealth {
    fn default() -> Self {
        Self {
            last_ok_at: None,
            last_fail_at: None,
            consecutive_fails: 0,
            last_latency_ms: None,
            last_status: None,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub state: CircuitState,
    pub failures: u32,
    pub opened_at: Option<i64>,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self { state: CircuitState::Closed, failures: 0, opened_at: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelemetryChannel {
    Manual,
    Swap,
    Agent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelemetryStatus {
    Ok,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub id: Uuid,
    pub run_id: Uuid,
    pub channel: TelemetryChannel,
    pub stage: Stage,
    pub status: TelemetryStatus,
    pub ts: i64,
    pub network: Network,
    pub tx_id: Option<Uuid>,
    pub tx_state: Option<PendingTxState>,
    pub backend_source: Option<BackendSource>,
    pub backend_reason: Option<String>,
    pub backend_endpoint: Option<String>,
    pub error: Option<String>,
    pub context: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_are_monotonic() {
        use PendingTxState::*;
        let happy_path = [Building, DryRunOk, Signed, Broadcasting, Confirming, Confirmed];
        for window in happy_path.windows(2) {
            assert!(window[0].can_transition_to(window[1]));
        }
        // no state may precede its predecessor
        assert!(!Confirming.can_transition_to(Building));
        assert!(!Signed.can_transition_to(DryRunOk));
    }

    #[test]
    fn dry_run_fail_is_terminal_for_the_id() {
        assert!(PendingTxState::Building.can_transition_to(PendingTxState::DryRunFail));
        assert!(!PendingTxState::DryRunFail.can_transition_to(PendingTxState::Signed));
    }

    #[test]
    fn locked_states_match_spec_set() {
        use PendingTxState::*;
        for s in [Building, DryRunOk, Signed, Broadcasting, Confirming] {
            assert!(s.locks_inputs());
        }
        for s in [DryRunFail, Confirmed, Failed, Cancelled] {
            assert!(!s.locks_inputs());
        }
    }
}
