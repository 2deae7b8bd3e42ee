pub mod breaker;
pub mod client;
pub mod health;
pub mod pool;
pub mod types;

pub use breaker::CircuitBreaker;
pub use client::{HttpRpcClient, Provenance, RpcClient};
pub use health::HealthTracker;
pub use pool::{BackendPool, BackendSource, ProviderPreset, ResolvedPool};
