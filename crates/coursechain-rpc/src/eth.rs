//! Typed `eth_*` calls over any [`RpcTransport`].
//!
//! Quantities stay as hex strings on the wire types (the node's native
//! encoding) with parse helpers; hashes, addresses and byte payloads use
//! the alloy primitive types.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::TransportError;
use crate::transport::{RpcTransport, RpcTransportExt};

/// A raw EVM log as returned by `eth_getLogs`, receipts and `logs` subscriptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub block_number: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<B256>,
    #[serde(default)]
    pub log_index: Option<String>,
    #[serde(default)]
    pub removed: bool,
}

impl RawLog {
    /// Block number, or 0 for pending logs.
    pub fn block_number_u64(&self) -> u64 {
        self.block_number.as_deref().map(parse_hex_u64).unwrap_or(0)
    }

    /// Log index within the block, or 0 if absent.
    pub fn log_index_u64(&self) -> u64 {
        self.log_index.as_deref().map(parse_hex_u64).unwrap_or(0)
    }
}

/// The subset of a transaction receipt the service consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    #[serde(default)]
    pub block_hash: Option<B256>,
    #[serde(default)]
    pub block_number: Option<String>,
    /// `0x1` on success, `0x0` when the EVM reverted.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub gas_used: Option<String>,
    #[serde(default)]
    pub effective_gas_price: Option<String>,
    #[serde(default)]
    pub logs: Vec<RawLog>,
}

impl TransactionReceipt {
    /// Returns `true` when the transaction executed without reverting.
    ///
    /// Pre-Byzantium receipts carry no status field; they are treated as successful.
    pub fn succeeded(&self) -> bool {
        self.status.as_deref().map(|s| parse_hex_u64(s) == 1).unwrap_or(true)
    }

    pub fn block_number_u64(&self) -> u64 {
        self.block_number.as_deref().map(parse_hex_u64).unwrap_or(0)
    }

    pub fn gas_used_u64(&self) -> u64 {
        self.gas_used.as_deref().map(parse_hex_u64).unwrap_or(0)
    }

    pub fn effective_gas_price_u128(&self) -> u128 {
        self.effective_gas_price
            .as_deref()
            .map(parse_hex_u128)
            .unwrap_or(0)
    }
}

/// A call object for `eth_call` / `eth_estimateGas`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    pub to: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    pub data: Bytes,
}

impl CallRequest {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }
}

/// Block selector for state reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Pending,
    Number(u64),
}

impl BlockTag {
    fn to_param(self) -> Value {
        match self {
            Self::Latest => json!("latest"),
            Self::Pending => json!("pending"),
            Self::Number(n) => json!(format!("{n:#x}")),
        }
    }
}

/// Log filter for `eth_getLogs` and `eth_subscribe("logs")`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFilter {
    pub address: Option<Address>,
    /// Accepted values for topic0 (OR-ed). Empty = any.
    pub topic0: Vec<B256>,
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
}

impl LogFilter {
    pub fn for_address(address: Address) -> Self {
        Self {
            address: Some(address),
            ..Default::default()
        }
    }

    pub fn with_topic0(mut self, topics: impl IntoIterator<Item = B256>) -> Self {
        self.topic0.extend(topics);
        self
    }

    pub fn range(mut self, from: u64, to: u64) -> Self {
        self.from_block = Some(from);
        self.to_block = Some(to);
        self
    }

    /// The JSON filter object understood by nodes.
    pub fn to_json(&self) -> Value {
        let mut obj = serde_json::Map::new();
        if let Some(address) = self.address {
            obj.insert("address".into(), json!(address));
        }
        if !self.topic0.is_empty() {
            obj.insert("topics".into(), json!([self.topic0]));
        }
        if let Some(from) = self.from_block {
            obj.insert("fromBlock".into(), json!(format!("{from:#x}")));
        }
        if let Some(to) = self.to_block {
            obj.insert("toBlock".into(), json!(format!("{to:#x}")));
        }
        Value::Object(obj)
    }
}

/// Typed `eth_*` client over a shared transport.
#[derive(Clone)]
pub struct EthClient {
    transport: Arc<dyn RpcTransport>,
    next_id: Arc<AtomicU64>,
}

impl EthClient {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            transport,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<dyn RpcTransport> {
        &self.transport
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(id, method, "rpc request");
        self.transport.call(id, method, params).await
    }

    pub async fn chain_id(&self) -> Result<u64, TransportError> {
        let hex: String = self.request("eth_chainId", vec![]).await?;
        parse_quantity_u64(&hex)
    }

    pub async fn block_number(&self) -> Result<u64, TransportError> {
        let hex: String = self.request("eth_blockNumber", vec![]).await?;
        parse_quantity_u64(&hex)
    }

    pub async fn gas_price(&self) -> Result<u128, TransportError> {
        let hex: String = self.request("eth_gasPrice", vec![]).await?;
        parse_quantity_u128(&hex)
    }

    pub async fn transaction_count(
        &self,
        address: Address,
        block: BlockTag,
    ) -> Result<u64, TransportError> {
        let hex: String = self
            .request("eth_getTransactionCount", vec![json!(address), block.to_param()])
            .await?;
        parse_quantity_u64(&hex)
    }

    pub async fn balance(&self, address: Address) -> Result<U256, TransportError> {
        self.request("eth_getBalance", vec![json!(address), BlockTag::Latest.to_param()])
            .await
    }

    pub async fn call(&self, req: &CallRequest, block: BlockTag) -> Result<Bytes, TransportError> {
        self.request("eth_call", vec![json!(req), block.to_param()])
            .await
    }

    pub async fn estimate_gas(&self, req: &CallRequest) -> Result<u64, TransportError> {
        let hex: String = self.request("eth_estimateGas", vec![json!(req)]).await?;
        parse_quantity_u64(&hex)
    }

    /// Submit a signed, 2718-encoded transaction. Returns the node-reported hash.
    pub async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, TransportError> {
        self.request("eth_sendRawTransaction", vec![json!(raw)])
            .await
    }

    /// `None` until the transaction is included in a block.
    pub async fn transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionReceipt>, TransportError> {
        self.request("eth_getTransactionReceipt", vec![json!(hash)])
            .await
    }

    pub async fn logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, TransportError> {
        self.request("eth_getLogs", vec![filter.to_json()]).await
    }
}

/// Parse a hex-encoded string (with or without `0x`) to u64; malformed input yields 0.
pub fn parse_hex_u64(s: &str) -> u64 {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).unwrap_or(0)
}

fn parse_hex_u128(s: &str) -> u128 {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u128::from_str_radix(s, 16).unwrap_or(0)
}

fn parse_quantity_u64(s: &str) -> Result<u64, TransportError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16)
        .map_err(|e| TransportError::Other(format!("bad quantity '{s}': {e}")))
}

fn parse_quantity_u128(s: &str) -> Result<u128, TransportError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u128::from_str_radix(digits, 16)
        .map_err(|e| TransportError::Other(format!("bad quantity '{s}': {e}")))
}
