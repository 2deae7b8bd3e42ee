pub mod coin_selector;
pub mod config;
pub mod fee;
pub mod kernel;
pub mod pending_tx_store;
pub mod reconciler;
pub mod rpc;
pub mod signer;
pub mod telemetry;
pub mod tx_builder;
pub mod utxo;

pub use config::KernelConfig;
pub use kernel::{ExecuteOptions, ExecutionKernel, Intent};
pub use tx_builder::Recipient;
