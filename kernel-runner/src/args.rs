use clap::{Parser, ValueEnum};
use kernel_common::network::Network;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkArg {
    Mainnet,
    Testnet10,
    Testnet11,
    Testnet12,
}

impl NetworkArg {
    pub fn to_network(self) -> Network {
        match self {
            NetworkArg::Mainnet => Network::Mainnet,
            NetworkArg::Testnet10 => Network::Testnet10,
            NetworkArg::Testnet11 => Network::Testnet11,
            NetworkArg::Testnet12 => Network::Testnet12,
        }
    }
}

/// One-shot CLI driver: build, sign, broadcast, and (by default) reconcile a
/// single payment intent against the REST API of the chosen network.
#[derive(Parser, Debug)]
#[command(name = "kernel-runner")]
pub struct Args {
    #[arg(long, value_enum, default_value = "mainnet", help = "Kaspa network profile to target")]
    pub network: NetworkArg,

    /// Path to the encrypted keys file (default: ~/.kaspa-kernel/keys.json)
    #[arg(long, short = 'k', default_value = default_keys_path())]
    pub keys_file: String,

    #[arg(long, short = 'p', help = "Password to unlock the keys file (prompted if omitted)")]
    pub password: Option<String>,

    #[arg(long, help = "Recipient address", action = clap::ArgAction::Append, required = true)]
    pub to: Vec<String>,

    #[arg(long, help = "Amount in sompi for the matching --to entry", action = clap::ArgAction::Append, required = true)]
    pub amount_sompi: Vec<u64>,

    #[arg(long, help = "Treasury address to route the platform fee to, if any")]
    pub treasury_address: Option<String>,

    #[arg(long, help = "Correlation id for an upstream agent job")]
    pub agent_job_id: Option<String>,

    #[arg(long, help = "Hex-encoded OP_RETURN payload")]
    pub op_return_hex: Option<String>,

    #[arg(long, help = "Return immediately after broadcast instead of polling for confirmation")]
    pub no_wait: bool,

    #[arg(long, default_value = "300000", help = "Reconciliation deadline in milliseconds")]
    pub confirm_timeout_ms: i64,

    #[arg(long, default_value = "1000", help = "Reconciliation poll interval in milliseconds")]
    pub poll_interval_ms: i64,

    /// Directory log4rs writes rolling log files into (default: ~/.kaspa-kernel/logs)
    #[arg(long, default_value = default_logs_path())]
    pub logs_path: String,

    #[arg(long, default_value = "info", help = "Log level: trace|debug|info|warn|error")]
    pub logs_level: log::LevelFilter,
}

impl Args {
    pub fn recipients(&self) -> Result<Vec<(String, u64)>, String> {
        if self.to.len() != self.amount_sompi.len() {
            return Err(format!("{} --to values but {} --amount-sompi values", self.to.len(), self.amount_sompi.len()));
        }
        Ok(self.to.iter().cloned().zip(self.amount_sompi.iter().copied()).collect())
    }
}

fn default_keys_path() -> &'static str {
    if cfg!(target_os = "windows") { "%USERPROFILE%\\AppData\\Local\\KaspaKernel\\keys.json" } else { "~/.kaspa-kernel/keys.json" }
}

fn default_logs_path() -> &'static str {
    if cfg!(target_os = "windows") { "%USERPROFILE%\\AppData\\Local\\KaspaKernel\\logs" } else { "~/.kaspa-kernel/logs" }
}

pub fn expand_path(path: &str) -> String {
    shellexpand::tilde(path).to_string()
}
