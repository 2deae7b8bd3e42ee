use kernel_common::network::Network;
use kernel_common::traits::{Clock, KVStore, LocalNodeStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const PROVIDER_PRESET_KV_KEY: &str = "kaspa.rpc-provider.v1";
const CUSTOM_RPC_KV_KEY: &str = "kaspa.custom-rpc.v1";

/// A named REST provider preset, analogous to how the reference wallet
/// resolves a node endpoint from a configured server or a network default.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ProviderPreset {
    Official,
    Igra,
    Kasplex,
    Custom(String),
    Local,
}

impl ProviderPreset {
    fn base_url(&self, network: Network) -> Option<String> {
        match self {
            ProviderPreset::Official => Some(network.default_endpoint().to_string()),
            ProviderPreset::Igra => Some(format!("https://api.igra.kaspa.org/{}", network.as_str())),
            ProviderPreset::Kasplex => Some(format!("https://api.kasplex.org/{}", network.as_str())),
            ProviderPreset::Custom(url) => Some(url.clone()),
            ProviderPreset::Local => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendSource {
    Local,
    Remote,
}

impl From<BackendSource> for kernel_common::model::BackendSource {
    fn from(source: BackendSource) -> Self {
        match source {
            BackendSource::Local => kernel_common::model::BackendSource::Local,
            BackendSource::Remote => kernel_common::model::BackendSource::Remote,
        }
    }
}

pub const REASON_LOCAL_ENABLED_AND_HEALTHY: &str = "local_node_enabled_and_healthy";
pub const REASON_LOCAL_DISABLED: &str = "local_node_disabled";
pub const REASON_LOCAL_UNHEALTHY: &str = "local_node_unhealthy";
pub const REASON_LOCAL_SYNCING: &str = "local_node_syncing";
pub const REASON_LOCAL_PROFILE_MISMATCH: &str = "local_profile_mismatch";
pub const REASON_LOCAL_ENDPOINT_MISSING: &str = "local_endpoint_missing";

#[derive(Debug, Clone)]
pub struct ResolvedPool {
    pub pool: Vec<String>,
    pub source: BackendSource,
    pub reason: &'static str,
}

struct CachedPool {
    resolved_at: i64,
    pool: ResolvedPool,
}

/// Resolves the ordered endpoint pool for a network: provider preset, runtime
/// override, and local-node injection (§4.3), memoised for `pool_cache_ttl_ms`.
pub struct BackendPool {
    kv: Arc<dyn KVStore>,
    clock: Arc<dyn Clock>,
    local_node: Arc<dyn LocalNodeStatus>,
    require_local_synced: bool,
    pool_cache_ttl_ms: i64,
    cache: RwLock<Option<CachedPool>>,
}

impl BackendPool {
    pub fn new(
        kv: Arc<dyn KVStore>,
        clock: Arc<dyn Clock>,
        local_node: Arc<dyn LocalNodeStatus>,
        require_local_synced: bool,
        pool_cache_ttl_ms: i64,
    ) -> Self {
        Self { kv, clock, local_node, require_local_synced, pool_cache_ttl_ms, cache: RwLock::new(None) }
    }

    /// Resolves the pool for `network`, honoring a persisted operator
    /// preference over `default_preset`/`default_custom_override` when one
    /// has been set via [`Self::set_provider_preset`] / [`Self::set_custom_override`].
    pub async fn resolve(&self, network: Network, default_preset: &ProviderPreset, default_custom_override: Option<&str>) -> ResolvedPool {
        if let Some(cached) = self.cache.read().await.as_ref() {
            if self.clock.now_ms() - cached.resolved_at < self.pool_cache_ttl_ms {
                return cached.pool.clone();
            }
        }

        let resolved = self.resolve_uncached(network, default_preset, default_custom_override).await;
        *self.cache.write().await = Some(CachedPool { resolved_at: self.clock.now_ms(), pool: resolved.clone() });
        resolved
    }

    /// Persists the operator-selected provider preset for `network` (§4.3,
    /// `kaspa.rpc-provider.v1`), taking precedence over whatever preset a
    /// caller passes to [`Self::resolve`] from here on.
    pub async fn set_provider_preset(&self, network: Network, preset: ProviderPreset) {
        let mut presets = self.load_presets().await;
        presets.insert(network.as_str().to_string(), preset);
        if let Ok(value) = serde_json::to_value(&presets) {
            self.kv.set(PROVIDER_PRESET_KV_KEY, value).await;
        }
        *self.cache.write().await = None;
    }

    /// Persists (or clears, with `None`) the operator-selected custom RPC URL
    /// for `network` (§4.3, `kaspa.custom-rpc.v1`).
    pub async fn set_custom_override(&self, network: Network, url: Option<String>) {
        let mut overrides = self.load_custom_overrides().await;
        match url {
            Some(url) => {
                overrides.insert(network.as_str().to_string(), url);
            }
            None => {
                overrides.remove(network.as_str());
            }
        }
        if let Ok(value) = serde_json::to_value(&overrides) {
            self.kv.set(CUSTOM_RPC_KV_KEY, value).await;
        }
        *self.cache.write().await = None;
    }

    async fn load_presets(&self) -> HashMap<String, ProviderPreset> {
        match self.kv.get(PROVIDER_PRESET_KV_KEY).await {
            Some(value) => serde_json::from_value(value).unwrap_or_default(),
            None => HashMap::new(),
        }
    }

    async fn load_custom_overrides(&self) -> HashMap<String, String> {
        match self.kv.get(CUSTOM_RPC_KV_KEY).await {
            Some(value) => serde_json::from_value(value).unwrap_or_default(),
            None => HashMap::new(),
        }
    }

    async fn resolve_uncached(&self, network: Network, default_preset: &ProviderPreset, default_custom_override: Option<&str>) -> ResolvedPool {
        let persisted_presets = self.load_presets().await;
        let preset = persisted_presets.get(network.as_str()).unwrap_or(default_preset);

        let persisted_overrides = self.load_custom_overrides().await;
        let persisted_override = persisted_overrides.get(network.as_str()).map(String::as_str);
        let custom_override = persisted_override.or(default_custom_override);

        let mut remote_pool = Vec::new();
        if let Some(url) = custom_override {
            remote_pool.push(url.to_string());
        } else if let Some(url) = preset.base_url(network) {
            remote_pool.push(url);
        }
        dedupe_preserving_order(&mut remote_pool);

        let (source, reason) = self.classify_local(network).await;
        if source == BackendSource::Local {
            if let Some(local_url) = self.local_node.rpc_base_url().await {
                let mut pool = vec![local_url];
                pool.extend(remote_pool);
                dedupe_preserving_order(&mut pool);
                return ResolvedPool { pool, source, reason };
            }
        }

        ResolvedPool { pool: remote_pool, source: BackendSource::Remote, reason }
    }

    async fn classify_local(&self, target_network: Network) -> (BackendSource, &'static str) {
        if !self.local_node.ok().await || !self.local_node.running().await {
            return (BackendSource::Remote, REASON_LOCAL_DISABLED);
        }
        if !self.local_node.rpc_healthy().await {
            return (BackendSource::Remote, REASON_LOCAL_UNHEALTHY);
        }
        let sync = self.local_node.sync().await;
        if self.require_local_synced && !sync.synced {
            return (BackendSource::Remote, REASON_LOCAL_SYNCING);
        }
        let Some(profile) = self.local_node.network_profile().await else {
            return (BackendSource::Remote, REASON_LOCAL_PROFILE_MISMATCH);
        };
        if profile != target_network {
            return (BackendSource::Remote, REASON_LOCAL_PROFILE_MISMATCH);
        }
        if self.local_node.rpc_base_url().await.is_none() {
            return (BackendSource::Remote, REASON_LOCAL_ENDPOINT_MISSING);
        }
        (BackendSource::Local, REASON_LOCAL_ENABLED_AND_HEALTHY)
    }
}

fn dedupe_preserving_order(pool: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    pool.retain(|url| seen.insert(url.clone()));
}
