//! JSON-RPC 2.0 wire types.

use alloy_primitives::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC request ID: string, number, or null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Number(u64),
    String(String),
    Null,
}

impl RpcId {
    /// Numeric id, if this is one.
    pub fn as_number(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl std::fmt::Display for RpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: RpcId,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC 2.0 request.
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id: RpcId::Number(id),
        }
    }
}

/// Node error code used by geth/anvil/hardhat for `execution reverted`.
pub const EXECUTION_REVERTED_CODE: i64 = 3;

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Returns `true` if the node reports that the EVM reverted the call.
    pub fn is_execution_reverted(&self) -> bool {
        self.code == EXECUTION_REVERTED_CODE || self.message.to_ascii_lowercase().contains("revert")
    }

    /// Raw revert payload carried in `data`.
    ///
    /// Nodes disagree on the shape: geth and anvil send a hex string,
    /// hardhat nests it as `{ "data": "0x..." }`.
    pub fn revert_data(&self) -> Option<Bytes> {
        let data = self.data.as_ref()?;
        let hex = match data {
            Value::String(s) => s.as_str(),
            Value::Object(map) => map.get("data")?.as_str()?,
            _ => return None,
        };
        hex.parse::<Bytes>().ok()
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RpcId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Build a successful response.
    pub fn success(id: RpcId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn failure(id: RpcId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Returns `true` if this is a successful response (has result, no error).
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.result.is_some()
    }

    /// Unwrap the result value or return an error.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        if let Some(err) = self.error {
            Err(err)
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization() {
        let req = JsonRpcRequest::new(1, "eth_blockNumber", vec![]);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"eth_blockNumber\""));
    }

    #[test]
    fn response_into_result_error() {
        let resp = JsonRpcResponse::failure(
            RpcId::Number(1),
            JsonRpcError {
                code: -32000,
                message: "nonce too low".into(),
                data: None,
            },
        );
        assert!(!resp.is_ok());
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.code, -32000);
        assert!(!err.is_execution_reverted());
    }

    #[test]
    fn revert_data_flat_and_nested() {
        let flat = JsonRpcError {
            code: 3,
            message: "execution reverted".into(),
            data: Some(Value::String("0x08c379a0".into())),
        };
        assert!(flat.is_execution_reverted());
        assert_eq!(flat.revert_data().unwrap().as_ref(), &[0x08, 0xc3, 0x79, 0xa0]);

        let nested = JsonRpcError {
            code: -32603,
            message: "Error: VM Exception while processing transaction: reverted".into(),
            data: Some(serde_json::json!({ "data": "0xdead" })),
        };
        assert!(nested.is_execution_reverted());
        assert_eq!(nested.revert_data().unwrap().as_ref(), &[0xde, 0xad]);
    }
}
