use log::error;
use std::error::Error as StdError;
use thiserror::Error;

/// The kernel's error taxonomy. Variant names are kinds, not type names, per
/// the spec's error taxonomy table.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ErrorKind {
    #[error("requested amount must be positive")]
    AmountTooSmall,
    #[error("intent has no recipients")]
    IntentEmpty,
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("network mismatch: {0}")]
    NetworkMismatch(String),
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("only covenant (non-standard) UTXOs available")]
    CovenantOnlyFunds,
    #[error("utxo {0} no longer present")]
    UtxoSpent(String),
    #[error("dry-run balance invariant violated: {0}")]
    BalanceMismatch(String),
    #[error("output routed to treasury address without fee tag")]
    PrincipalToTreasury,
    #[error("no RPC endpoint available: {0}")]
    EndpointUnavailable(String),
    #[error("circuit open for endpoint {0}")]
    CircuitOpen(String),
    #[error("credential store is locked")]
    WalletLocked,
    #[error("signer rejected the transaction: {0}")]
    SignFailed(String),
    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),
    #[error("confirmation deadline reached")]
    ConfirmTimeout,
    #[error("precondition failed: {0}")]
    PrecondFailed(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type KernelResult<T> = Result<T, ErrorKind>;

/// Lifts foreign errors into the taxonomy at the boundary where they occur,
/// mirroring the reference wallet's `ResultExt` (`to_wallet_result_*`).
pub trait ResultExt<T> {
    fn to_kernel_internal(self) -> KernelResult<T>;
    fn to_kernel_endpoint_unavailable(self, context: &str) -> KernelResult<T>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: StdError,
{
    fn to_kernel_internal(self) -> KernelResult<T> {
        self.map_err(|e| {
            error!("internal error: {e}");
            ErrorKind::Internal(e.to_string())
        })
    }

    fn to_kernel_endpoint_unavailable(self, context: &str) -> KernelResult<T> {
        self.map_err(|e| ErrorKind::EndpointUnavailable(format!("{context}: {e}")))
    }
}

/// A pipeline `Stage` paired with the `ErrorKind` that failed it, plus enough
/// context (tx id, last known txid/endpoint) to render a short user message.
#[derive(Debug, Error, Clone)]
#[error("{stage:?} failed: {kind}")]
pub struct ExecutionError {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub tx_id: Option<uuid::Uuid>,
    pub txid: Option<String>,
    pub endpoint: Option<String>,
}

impl ExecutionError {
    pub fn new(stage: Stage, kind: ErrorKind) -> Self {
        Self { stage, kind, tx_id: None, txid: None, endpoint: None }
    }

    pub fn with_tx_id(mut self, tx_id: uuid::Uuid) -> Self {
        self.tx_id = Some(tx_id);
        self
    }

    pub fn with_txid(mut self, txid: impl Into<String>) -> Self {
        self.txid = Some(txid.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

/// The five kernel pipeline stages, also used as the telemetry stage tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Stage {
    Build,
    Validate,
    Sign,
    Broadcast,
    Reconcile,
}
