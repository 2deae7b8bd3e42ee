use super::breaker::CircuitBreaker;
use super::health::HealthTracker;
use super::pool::{BackendPool, BackendSource, ProviderPreset};
use super::types::{BalanceDto, BlockDagInfoDto, BroadcastRequestDto, BroadcastResponseDto, FeeEstimateDto, TransactionDto, UtxoEntryDto};
use async_trait::async_trait;
use kernel_common::errors::{ErrorKind, KernelResult};
use kernel_common::model::CircuitState;
use kernel_common::network::Network;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

/// Which endpoint actually served a call and why the pool picked it (§4.3,
/// §4.5 "provenance tracking") — carried alongside every successful result so
/// callers can attribute telemetry/receipts to the real backend instead of a
/// guess.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub endpoint: String,
    pub backend_source: BackendSource,
    pub backend_reason: &'static str,
}

/// The REST method surface the builder and reconciler require (§4.3). Trait
/// abstracted so tests substitute a fake implementation. Every call returns
/// the endpoint/backend that actually served it alongside the payload.
#[async_trait]
pub trait RpcClient: Send + Sync {
    async fn fetch_utxos(&self, address: &str, network: Network) -> KernelResult<(Vec<UtxoEntryDto>, Provenance)>;
    async fn fetch_balance(&self, address: &str, network: Network) -> KernelResult<(BalanceDto, Provenance)>;
    async fn fetch_fee_estimate(&self, network: Network) -> KernelResult<(FeeEstimateDto, Provenance)>;
    async fn fetch_dag_info(&self, network: Network) -> KernelResult<(BlockDagInfoDto, Provenance)>;
    async fn broadcast_tx(&self, network: Network, transaction: serde_json::Value) -> KernelResult<(String, Provenance)>;
    async fn fetch_transaction(&self, txid: &str, network: Network) -> KernelResult<(TransactionDto, Provenance)>;
}

pub struct HttpRpcClient {
    http: reqwest::Client,
    pool: BackendPool,
    health: Arc<HealthTracker>,
    breaker: Arc<CircuitBreaker>,
    preset: ProviderPreset,
    custom_override: Option<String>,
    max_retries: u32,
    retry_delay_base_ms: u64,
}

impl HttpRpcClient {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: BackendPool,
        health: Arc<HealthTracker>,
        breaker: Arc<CircuitBreaker>,
        preset: ProviderPreset,
        custom_override: Option<String>,
        request_timeout: Duration,
        max_retries: u32,
        retry_delay_base_ms: u64,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("reqwest client config is static and always valid");
        Self { http, pool, health, breaker, preset, custom_override, max_retries, retry_delay_base_ms }
    }

    /// Ranks the resolved pool by health, tagging each URL with the backend
    /// source/reason the pool resolved it under (only the primary endpoint
    /// can be `Local`; every other pool member is a remote fallback).
    async fn ranked_pool(&self, network: Network) -> Vec<(String, BackendSource, &'static str)> {
        let resolved = self.pool.resolve(network, &self.preset, self.custom_override.as_deref()).await;
        let mut tagged: Vec<(String, BackendSource, &'static str)> = resolved
            .pool
            .iter()
            .enumerate()
            .map(|(i, url)| {
                let source = if i == 0 { resolved.source } else { BackendSource::Remote };
                (url.clone(), source, resolved.reason)
            })
            .collect();

        let mut open = Vec::new();
        let mut rest = Vec::new();
        for entry in tagged.drain(..) {
            if self.breaker.effective_state(&entry.0).await == CircuitState::Open {
                open.push(entry);
            } else {
                rest.push(entry);
            }
        }
        let mut keyed: Vec<((i64, u32), (String, BackendSource, &'static str))> = Vec::with_capacity(rest.len());
        for entry in rest {
            keyed.push((self.health.rank_key(&entry.0).await, entry));
        }
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        let mut ranked: Vec<(String, BackendSource, &'static str)> = keyed.into_iter().map(|(_, entry)| entry).collect();
        ranked.extend(open);
        ranked
    }

    /// Executes `op` against each endpoint in rank order, retrying
    /// transient failures within an endpoint before moving to the next one.
    async fn for_each_endpoint<T, F, Fut>(&self, network: Network, op: F) -> KernelResult<(T, Provenance)>
    where
        F: Fn(reqwest::Client, String) -> Fut,
        Fut: std::future::Future<Output = Result<T, EndpointError>>,
    {
        let endpoints = self.ranked_pool(network).await;
        if endpoints.is_empty() {
            return Err(ErrorKind::EndpointUnavailable("no endpoints configured".into()));
        }

        let mut last_error = String::new();
        for (base_url, backend_source, backend_reason) in endpoints {
            if self.breaker.effective_state(&base_url).await == CircuitState::Open {
                last_error = format!("circuit open for {base_url}");
                continue;
            }

            match self.with_retries(&op, &base_url).await {
                Ok(value) => {
                    self.breaker.record_success(&base_url).await;
                    return Ok((value, Provenance { endpoint: base_url, backend_source, backend_reason }));
                }
                Err(e) => {
                    warn!("endpoint {base_url} failed: {e}");
                    self.health.record_failure(&base_url, e.status, &e.message).await;
                    self.breaker.record_failure(&base_url).await;
                    last_error = e.message;
                }
            }
        }
        Err(ErrorKind::EndpointUnavailable(last_error))
    }

    async fn with_retries<T, F, Fut>(&self, op: &F, base_url: &str) -> Result<T, EndpointError>
    where
        F: Fn(reqwest::Client, String) -> Fut,
        Fut: std::future::Future<Output = Result<T, EndpointError>>,
    {
        let mut attempt = 0u32;
        loop {
            let started = std::time::Instant::now();
            match op(self.http.clone(), base_url.to_string()).await {
                Ok(value) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    self.health.record_success(base_url, latency_ms, 200).await;
                    return Ok(value);
                }
                Err(e) if attempt < self.max_retries && e.retryable => {
                    attempt += 1;
                    let delay = self.retry_delay_base_ms * 2u64.saturating_pow(attempt - 1);
                    debug!("retrying {base_url} (attempt {attempt}) after {delay}ms: {}", e.message);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

pub(crate) struct EndpointError {
    pub message: String,
    pub status: Option<u16>,
    pub retryable: bool,
}

impl EndpointError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        Self { message: e.to_string(), status: e.status().map(|s| s.as_u16()), retryable: true }
    }

    fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        let retryable = status.as_u16() == 408 || status.as_u16() == 429 || status.is_server_error();
        Self { message: format!("http {status}: {body}"), status: Some(status.as_u16()), retryable }
    }
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, EndpointError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EndpointError::from_status(status, body));
    }
    response.json::<T>().await.map_err(EndpointError::from_reqwest)
}

#[async_trait]
impl RpcClient for HttpRpcClient {
    async fn fetch_utxos(&self, address: &str, network: Network) -> KernelResult<(Vec<UtxoEntryDto>, Provenance)> {
        let address = address.to_string();
        self.for_each_endpoint(network, move |http, base_url| {
            let address = address.clone();
            async move {
                let url = format!("{base_url}/addresses/{address}/utxos");
                let response = http.get(url).send().await.map_err(EndpointError::from_reqwest)?;
                parse_json(response).await
            }
        })
        .await
    }

    async fn fetch_balance(&self, address: &str, network: Network) -> KernelResult<(BalanceDto, Provenance)> {
        let address = address.to_string();
        self.for_each_endpoint(network, move |http, base_url| {
            let address = address.clone();
            async move {
                let url = format!("{base_url}/addresses/{address}/balance");
                let response = http.get(url).send().await.map_err(EndpointError::from_reqwest)?;
                parse_json(response).await
            }
        })
        .await
    }

    async fn fetch_fee_estimate(&self, network: Network) -> KernelResult<(FeeEstimateDto, Provenance)> {
        self.for_each_endpoint(network, move |http, base_url| async move {
            let url = format!("{base_url}/info/fee-estimate");
            let response = http.get(url).send().await.map_err(EndpointError::from_reqwest)?;
            parse_json(response).await
        })
        .await
    }

    async fn fetch_dag_info(&self, network: Network) -> KernelResult<(BlockDagInfoDto, Provenance)> {
        self.for_each_endpoint(network, move |http, base_url| async move {
            let url = format!("{base_url}/info/blockdag");
            let response = http.get(url).send().await.map_err(EndpointError::from_reqwest)?;
            parse_json(response).await
        })
        .await
    }

    async fn broadcast_tx(&self, network: Network, transaction: serde_json::Value) -> KernelResult<(String, Provenance)> {
        let body = BroadcastRequestDto { transaction };
        self.for_each_endpoint(network, move |http, base_url| {
            let body = serde_json::to_value(&body).expect("BroadcastRequestDto always serializes");
            async move {
                let url = format!("{base_url}/transactions");
                let response = http.post(url).json(&body).send().await.map_err(EndpointError::from_reqwest)?;
                let parsed: BroadcastResponseDto = parse_json(response).await?;
                match parsed.txid() {
                    Some(txid) => Ok(txid.to_string()),
                    None => Err(EndpointError { message: "broadcast accepted without a txid".into(), status: None, retryable: false }),
                }
            }
        })
        .await
        .map_err(|e| match e {
            ErrorKind::EndpointUnavailable(msg) => ErrorKind::BroadcastFailed(msg),
            other => other,
        })
    }

    async fn fetch_transaction(&self, txid: &str, network: Network) -> KernelResult<(TransactionDto, Provenance)> {
        let txid = txid.to_string();
        self.for_each_endpoint(network, move |http, base_url| {
            let txid = txid.clone();
            async move {
                let url = format!("{base_url}/transactions/{txid}");
                let response = http.get(url).send().await.map_err(EndpointError::from_reqwest)?;
                parse_json(response).await
            }
        })
        .await
    }
}
