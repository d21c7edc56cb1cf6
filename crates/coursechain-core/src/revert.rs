//! Revert reason extraction.
//!
//! `require(cond, "message")` reverts with `0x08c379a0 ++ abi.encode(string)`.
//! Nodes return that payload in the JSON-RPC error `data`; some only put the
//! text in the message as `execution reverted: <reason>`.

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use coursechain_rpc::JsonRpcError;

/// The 4-byte selector for `Error(string)`.
pub const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

const REVERT_PREFIX: &str = "execution reverted";

/// Decode an `Error(string)` payload. `None` for any other shape.
pub fn decode_error_string(data: &[u8]) -> Option<String> {
    let payload = data.strip_prefix(&ERROR_STRING_SELECTOR)?;
    match DynSolType::String.abi_decode(payload) {
        Ok(DynSolValue::String(s)) => Some(s),
        _ => None,
    }
}

/// Best-effort reason for a node-reported revert.
///
/// Prefers the ABI payload, then falls back to the text after
/// `execution reverted:` in the message.
pub fn revert_reason(err: &JsonRpcError) -> Option<String> {
    if let Some(reason) = err.revert_data().and_then(|d| decode_error_string(&d)) {
        return Some(reason);
    }
    let rest = err.message.strip_prefix(REVERT_PREFIX)?;
    let reason = rest.trim_start_matches(':').trim();
    (!reason.is_empty()).then(|| reason.to_string())
}
