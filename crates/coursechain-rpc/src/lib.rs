//! coursechain-rpc: JSON-RPC plumbing for the course market client.
//!
//! # Overview
//!
//! - [`RpcTransport`]: the async trait every transport implements
//! - [`HttpRpcClient`]: reqwest transport with retry for idempotent reads
//! - [`WsRpcClient`]: tokio-tungstenite transport with subscriptions
//! - [`EthClient`]: typed `eth_*` helpers over any transport
//! - [`JsonRpcRequest`] / [`JsonRpcResponse`]: wire types

pub mod error;
pub mod eth;
pub mod http;
pub mod request;
pub mod retry;
pub mod transport;
pub mod ws;

pub use error::TransportError;
pub use eth::{BlockTag, CallRequest, EthClient, LogFilter, RawLog, TransactionReceipt};
pub use http::{HttpClientConfig, HttpRpcClient};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use retry::{RetryConfig, RetryPolicy};
pub use transport::{HealthStatus, RpcTransport, RpcTransportExt};
pub use ws::{SubscriptionId, SubscriptionKey, WsClientConfig, WsRpcClient};
