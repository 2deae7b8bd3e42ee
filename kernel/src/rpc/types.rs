use serde::{Deserialize, Serialize};

/// `GET /addresses/{addr}/utxos` element.
#[derive(Debug, Clone, Deserialize)]
pub struct UtxoEntryDto {
    pub address: Option<String>,
    pub outpoint: OutpointDto,
    #[serde(rename = "utxoEntry")]
    pub utxo_entry: UtxoEntryBodyDto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutpointDto {
    #[serde(rename = "transactionId")]
    pub transaction_id: String,
    pub index: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UtxoEntryBodyDto {
    pub amount: String,
    #[serde(rename = "scriptPublicKey")]
    pub script_public_key: ScriptPublicKeyDto,
    #[serde(rename = "blockDaaScore")]
    pub block_daa_score: String,
    #[serde(rename = "isCoinbase")]
    pub is_coinbase: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptPublicKeyDto {
    pub version: u16,
    #[serde(rename = "scriptPublicKey")]
    pub script_public_key: String,
}

/// `GET /addresses/{addr}/balance`.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceDto {
    pub balance: serde_json::Value,
}

/// `GET /info/fee-estimate`.
#[derive(Debug, Clone, Deserialize)]
pub struct FeeEstimateDto {
    #[serde(rename = "priorityBucket")]
    pub priority_bucket: FeeBucketDto,
    #[serde(rename = "normalBuckets", default)]
    pub normal_buckets: Vec<FeeBucketDto>,
    #[serde(rename = "lowBuckets", default)]
    pub low_buckets: Vec<FeeBucketDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeBucketDto {
    pub feerate: f64,
}

/// `GET /info/blockdag`.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockDagInfoDto {
    #[serde(rename = "networkName")]
    pub network_name: String,
    #[serde(rename = "blockCount")]
    pub block_count: String,
    #[serde(rename = "headerCount")]
    pub header_count: String,
    #[serde(rename = "virtualDaaScore")]
    pub virtual_daa_score: String,
    pub difficulty: f64,
}

/// `POST /transactions` request body.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastRequestDto {
    pub transaction: serde_json::Value,
}

/// `POST /transactions` response. The upstream API is documented to return
/// either key; both are accepted, neither is fabricated when absent.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastResponseDto {
    #[serde(rename = "transactionId")]
    pub transaction_id: Option<String>,
    pub txid: Option<String>,
}

impl BroadcastResponseDto {
    pub fn txid(&self) -> Option<&str> {
        self.transaction_id.as_deref().or(self.txid.as_deref())
    }
}

/// `GET /transactions/{txid}`.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionDto {
    #[serde(rename = "transactionId")]
    pub transaction_id: String,
    #[serde(rename = "acceptingBlockHash")]
    pub accepting_block_hash: Option<String>,
}
