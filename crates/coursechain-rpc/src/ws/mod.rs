//! WebSocket JSON-RPC transport.
//!
//! - Auto-reconnect on disconnect (exponential backoff)
//! - `eth_subscribe` / `eth_unsubscribe` with per-subscription channels
//! - Re-subscribe after reconnect under the same client-side key
//! - Request multiplexing over a single connection

pub mod client;
pub mod subscriptions;

pub use client::{WsClientConfig, WsRpcClient};
pub use subscriptions::{SubscriptionId, SubscriptionKey, SubscriptionRegistry};
