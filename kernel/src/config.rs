/// Environment-driven tunables (§6), overlaid on top of the binding
/// defaults. Mirrors the reference wallet CLI's argument-then-environment
/// precedence: `kernel-runner`'s CLI args win over `KASPA_KERNEL_*` vars.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_base_ms: u64,
    pub cb_trip_threshold: u32,
    pub cb_recover_ms: i64,
    pub pool_cache_ttl_ms: i64,
    pub utxo_cache_ttl_ms: i64,
    pub tx_fee_safety_bps: u64,
    pub tx_fee_min_sompi: u64,
    pub tx_fee_max_sompi: u64,
    pub platform_fee_bps: u64,
    pub min_platform_fee: u64,
    pub max_platform_fee: u64,
    pub confirm_poll_ms: i64,
    pub confirm_timeout_ms: i64,
    pub require_local_synced: bool,
    pub audit_max_events: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 12_000,
            max_retries: 2,
            retry_delay_base_ms: 600,
            cb_trip_threshold: 4,
            cb_recover_ms: 30_000,
            pool_cache_ttl_ms: 5_000,
            utxo_cache_ttl_ms: 5_000,
            tx_fee_safety_bps: 11_500,
            tx_fee_min_sompi: 1_000,
            tx_fee_max_sompi: 200_000_000,
            platform_fee_bps: 30,
            min_platform_fee: 100_000,
            max_platform_fee: 100_000_000,
            confirm_poll_ms: 1_000,
            confirm_timeout_ms: 300_000,
            require_local_synced: true,
            audit_max_events: 600,
        }
    }
}

impl KernelConfig {
    /// Overlays `KASPA_KERNEL_*`-prefixed environment variables on top of
    /// [`Default`], e.g. `KASPA_KERNEL_CB_TRIP_THRESHOLD=6`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        macro_rules! overlay {
            ($field:ident, $name:literal, $parse:expr) => {
                if let Ok(raw) = std::env::var(concat!("KASPA_KERNEL_", $name)) {
                    if let Some(parsed) = $parse(raw.trim()) {
                        config.$field = parsed;
                    }
                }
            };
        }

        overlay!(request_timeout_ms, "REQUEST_TIMEOUT_MS", |s: &str| s.parse().ok());
        overlay!(max_retries, "MAX_RETRIES", |s: &str| s.parse().ok());
        overlay!(retry_delay_base_ms, "RETRY_DELAY_BASE_MS", |s: &str| s.parse().ok());
        overlay!(cb_trip_threshold, "CB_TRIP_THRESHOLD", |s: &str| s.parse().ok());
        overlay!(cb_recover_ms, "CB_RECOVER_MS", |s: &str| s.parse().ok());
        overlay!(pool_cache_ttl_ms, "POOL_CACHE_TTL_MS", |s: &str| s.parse().ok());
        overlay!(utxo_cache_ttl_ms, "UTXO_CACHE_TTL_MS", |s: &str| s.parse().ok());
        overlay!(tx_fee_safety_bps, "TX_FEE_SAFETY_BPS", |s: &str| s.parse().ok());
        overlay!(tx_fee_min_sompi, "TX_FEE_MIN_SOMPI", |s: &str| s.parse().ok());
        overlay!(tx_fee_max_sompi, "TX_FEE_MAX_SOMPI", |s: &str| s.parse().ok());
        overlay!(platform_fee_bps, "PLATFORM_FEE_BPS", |s: &str| s.parse().ok());
        overlay!(min_platform_fee, "MIN_PLATFORM_FEE", |s: &str| s.parse().ok());
        overlay!(max_platform_fee, "MAX_PLATFORM_FEE", |s: &str| s.parse().ok());
        overlay!(confirm_poll_ms, "CONFIRM_POLL_MS", |s: &str| s.parse().ok());
        overlay!(confirm_timeout_ms, "CONFIRM_TIMEOUT_MS", |s: &str| s.parse().ok());
        overlay!(require_local_synced, "REQUIRE_LOCAL_SYNCED", |s: &str| s.parse().ok());
        overlay!(audit_max_events, "AUDIT_MAX_EVENTS", |s: &str| s.parse().ok());

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_tunables_table() {
        let config = KernelConfig::default();
        assert_eq!(config.cb_trip_threshold, 4);
        assert_eq!(config.cb_recover_ms, 30_000);
        assert_eq!(config.platform_fee_bps, 30);
        assert_eq!(config.audit_max_events, 600);
    }

    #[test]
    fn from_env_overlays_a_set_variable() {
        // SAFETY: single-threaded test process variable, scoped to this test.
        unsafe { std::env::set_var("KASPA_KERNEL_CB_TRIP_THRESHOLD", "9") };
        let config = KernelConfig::from_env();
        assert_eq!(config.cb_trip_threshold, 9);
        unsafe { std::env::remove_var("KASPA_KERNEL_CB_TRIP_THRESHOLD") };
    }
}
