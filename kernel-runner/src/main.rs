mod args;
mod credential_store;
mod log;

use args::Args;
use clap::Parser;
use credential_store::FileCredentialStore;
use kernel::pending_tx_store::{FileBackedPendingTxStore, PendingTxStore};
use kernel::reconciler::ReceiptReconciler;
use kernel::rpc::{BackendPool, CircuitBreaker, HealthTracker, HttpRpcClient, ProviderPreset, RpcClient};
use kernel::signer::{KaspaSigner, Signer};
use kernel::telemetry::TelemetryLog;
use kernel::tx_builder::{FeePolicy, Recipient, TxBuilder};
use kernel::utxo::UtxoSync;
use kernel::{ExecuteOptions, ExecutionKernel, Intent, KernelConfig};
use kernel_common::kv_file::FileKvStore;
use kernel_common::traits::{Clock, CredentialStore, KVStore, NoLocalNode, SystemClock};
use std::io::Write as _;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let logs_path = args::expand_path(&args.logs_path);
    if let Err(e) = log::init_log(&logs_path, args.logs_level) {
        eprintln!("failed to initialize logger: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(args).await {
        ::log::error!("kernel-runner failed: {e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), String> {
    let network = args.network.to_network();
    let recipients: Vec<Recipient> =
        args.recipients()?.into_iter().map(|(address, amount_sompi)| Recipient { address, amount_sompi }).collect();

    let keys_file = args::expand_path(&args.keys_file);
    let credential_store = Arc::new(FileCredentialStore::load(&keys_file).await.map_err(|e| format!("keys file: {e}"))?);
    let password = match &args.password {
        Some(password) => password.clone(),
        None => prompt_password()?,
    };
    credential_store.unlock(&password).await.map_err(|e| format!("unlock failed: {e}"))?;
    let from_address =
        credential_store.get_session().await.ok_or("keys file unlocked but produced no session")?.address;

    let config = KernelConfig::from_env();
    let kv_path = std::path::Path::new(&keys_file).with_file_name("kernel-state.json");
    let kv: Arc<dyn KVStore> = Arc::new(FileKvStore::new(kv_path));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let health = Arc::new(HealthTracker::new(kv.clone(), clock.clone()));
    health.hydrate().await;
    let breaker = Arc::new(CircuitBreaker::new(kv.clone(), clock.clone(), config.cb_trip_threshold, config.cb_recover_ms));
    breaker.hydrate().await;
    let pool = BackendPool::new(kv.clone(), clock.clone(), Arc::new(NoLocalNode), config.require_local_synced, config.pool_cache_ttl_ms);
    let rpc: Arc<dyn RpcClient> = Arc::new(HttpRpcClient::new(
        pool,
        health,
        breaker,
        ProviderPreset::Official,
        None,
        std::time::Duration::from_millis(config.request_timeout_ms),
        config.max_retries,
        config.retry_delay_base_ms,
    ));

    let pending_tx_store: Arc<dyn PendingTxStore> = Arc::new(FileBackedPendingTxStore::new(kv.clone()));
    let utxo_sync = Arc::new(UtxoSync::new(rpc.clone(), pending_tx_store.clone(), clock.clone(), config.utxo_cache_ttl_ms));

    let policy = FeePolicy {
        treasury_address: args.treasury_address.clone(),
        platform_fee_bps: config.platform_fee_bps,
        min_platform_fee: config.min_platform_fee,
        max_platform_fee: config.max_platform_fee,
        fee_safety_bps: config.tx_fee_safety_bps,
        fee_floor: config.tx_fee_min_sompi,
        fee_ceiling: config.tx_fee_max_sompi,
    };
    let tx_builder = Arc::new(TxBuilder::new(utxo_sync.clone(), rpc.clone(), pending_tx_store.clone(), clock.clone(), policy));

    let signer: Arc<dyn Signer> = Arc::new(KaspaSigner::new(credential_store.clone()));
    let reconciler = Arc::new(ReceiptReconciler::new(rpc.clone(), clock.clone()));
    let telemetry = Arc::new(TelemetryLog::new(kv.clone(), clock.clone(), config.audit_max_events));
    telemetry.hydrate().await;

    let execution_kernel =
        ExecutionKernel::new(tx_builder, utxo_sync, signer, rpc, pending_tx_store, reconciler, telemetry, clock);

    let intent = Intent {
        from_address,
        network,
        recipients,
        agent_job_id: args.agent_job_id.clone(),
        op_return_hex: args.op_return_hex.clone(),
    };
    let options = ExecuteOptions {
        await_confirmation: !args.no_wait,
        confirm_timeout_ms: args.confirm_timeout_ms,
        poll_interval_ms: args.poll_interval_ms,
        ..ExecuteOptions::default()
    };

    let tx = execution_kernel.execute_intent(intent, options, CancellationToken::new()).await.map_err(|e| e.to_string())?;

    println!("{}", serde_json::to_string_pretty(&tx).map_err(|e| e.to_string())?);
    Ok(())
}

fn prompt_password() -> Result<String, String> {
    print!("keys file password: ");
    std::io::stdout().flush().map_err(|e| e.to_string())?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).map_err(|e| e.to_string())?;
    Ok(line.trim_end_matches(['\n', '\r']).to_string())
}
