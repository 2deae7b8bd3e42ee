use crate::network::Network;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Injectable wall clock, so tests can control time deterministically
/// (cache TTLs, breaker recovery, reconciler deadlines).
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Durable key-value storage, namespaced per concern (§6 KV namespaces).
/// Writes are last-writer-wins; callers fire-and-forget health/breaker
/// writes to avoid serialising the RPC fast path (§5).
#[async_trait]
pub trait KVStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;
    async fn set(&self, key: &str, value: Value);
    async fn remove(&self, key: &str);
}

/// An unlocked signing session: the mnemonic, optional passphrase,
/// derivation metadata, and the address it derives to. The kernel's signer
/// obtains this from a `CredentialStore` and must never log or persist it.
#[derive(Clone)]
pub struct Session {
    pub mnemonic: String,
    pub passphrase: Option<String>,
    pub derivation_path: String,
    pub address: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("mnemonic", &"<redacted>")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("derivation_path", &self.derivation_path)
            .field("address", &self.address)
            .finish()
    }
}

/// Opaque external credential store: `Locked` or `Unlocked{mnemonic}`.
/// Storage of user credentials is out of scope for the kernel (§1); it only
/// consumes this interface.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_session(&self) -> Option<Session>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub synced: bool,
}

/// Status of an optional local (caller-run) Kaspa node, consumed only by the
/// RPC backend selector's local-node injection (§4.3). The kernel does not
/// operate a node itself (non-goal, §1); the default provider reports disabled.
#[async_trait]
pub trait LocalNodeStatus: Send + Sync {
    async fn ok(&self) -> bool;
    async fn running(&self) -> bool;
    async fn rpc_base_url(&self) -> Option<String>;
    async fn rpc_healthy(&self) -> bool;
    async fn sync(&self) -> SyncStatus;
    async fn network_profile(&self) -> Option<Network>;
}

/// Default provider: local-node support disabled. `local_node_disabled` is
/// always the resolved reason when this is used.
pub struct NoLocalNode;

#[async_trait]
impl LocalNodeStatus for NoLocalNode {
    async fn ok(&self) -> bool {
        false
    }
    async fn running(&self) -> bool {
        false
    }
    async fn rpc_base_url(&self) -> Option<String> {
        None
    }
    async fn rpc_healthy(&self) -> bool {
        false
    }
    async fn sync(&self) -> SyncStatus {
        SyncStatus { synced: false }
    }
    async fn network_profile(&self) -> Option<Network> {
        None
    }
}
