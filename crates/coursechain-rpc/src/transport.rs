//! The seam between typed `eth_*` helpers and a concrete connection.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// Last observed state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// The most recent request hit a transient fault.
    Degraded,
    /// Socket down; a WebSocket client is reconnecting.
    Unhealthy,
    /// Nothing sent yet.
    Unknown,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        })
    }
}

/// One JSON-RPC connection to an Ethereum node.
///
/// The service holds transports as `Arc<dyn RpcTransport>`, so the HTTP and
/// WebSocket clients and the in-process test node are interchangeable.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Round-trip one request. Node-side errors come back inside the
    /// response; `Err` is reserved for the transport itself failing.
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    fn health(&self) -> HealthStatus {
        HealthStatus::Unknown
    }

    /// Endpoint, for logs.
    fn url(&self) -> &str;
}

/// Typed calls, available on every transport including `dyn RpcTransport`.
#[async_trait]
pub trait RpcTransportExt: RpcTransport {
    /// Send `method` and deserialize its `result`; node errors become
    /// [`TransportError::Rpc`].
    async fn call<T: DeserializeOwned>(
        &self,
        id: u64,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, TransportError> {
        let resp = self.send(JsonRpcRequest::new(id, method, params)).await?;
        let result = resp.into_result().map_err(TransportError::Rpc)?;
        serde_json::from_value(result).map_err(TransportError::Deserialization)
    }
}

impl<T: RpcTransport + ?Sized> RpcTransportExt for T {}
