//! WebSocket JSON-RPC client with auto-reconnect and subscription management.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tokio_tungstenite::tungstenite::Message;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::transport::{HealthStatus, RpcTransport, RpcTransportExt};

use super::subscriptions::{SubscriptionId, SubscriptionKey, SubscriptionRegistry};

type Reply = oneshot::Sender<Result<JsonRpcResponse, TransportError>>;
type PendingMap = Arc<Mutex<HashMap<u64, Reply>>>;
/// `eth_subscribe` request id -> subscription waiting for its node id.
type Binding = HashMap<u64, SubscriptionKey>;

/// Request ids at or above this value are reserved for requests issued by
/// the background task itself (re-subscribe, orphan cleanup).
const INTERNAL_ID_BASE: u64 = 1 << 62;

/// Configuration for the WebSocket client.
#[derive(Debug, Clone)]
pub struct WsClientConfig {
    /// Reconnect backoff starting duration.
    pub reconnect_initial: Duration,
    /// Maximum reconnect backoff.
    pub reconnect_max: Duration,
}

impl Default for WsClientConfig {
    fn default() -> Self {
        Self {
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(60),
        }
    }
}

/// Command sent from callers to the background WS task.
enum WsCommand {
    Send {
        req: JsonRpcRequest,
        tx: Reply,
    },
    /// `eth_subscribe` whose node id is bound to `key` before `tx` is answered.
    Subscribe {
        req: JsonRpcRequest,
        key: SubscriptionKey,
        tx: Reply,
    },
    Close,
}

/// WebSocket JSON-RPC client.
///
/// A background task owns the connection, multiplexes requests over it,
/// and transparently reconnects and re-subscribes.
pub struct WsRpcClient {
    url: String,
    cmd_tx: mpsc::UnboundedSender<WsCommand>,
    subscriptions: SubscriptionRegistry,
    connected: Arc<AtomicBool>,
    next_id: AtomicU64,
}

impl WsRpcClient {
    /// Start the background connection task for `url`.
    ///
    /// Returns immediately; requests issued before the socket is up are
    /// queued until the first connection succeeds.
    pub async fn connect(
        url: impl Into<String>,
        config: WsClientConfig,
    ) -> Result<Self, TransportError> {
        let url = url.into();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(TransportError::Config(format!(
                "not a WebSocket URL: {url}"
            )));
        }
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<WsCommand>();
        let subscriptions = SubscriptionRegistry::new();
        let connected = Arc::new(AtomicBool::new(false));

        tokio::spawn(ws_task(
            url.clone(),
            cmd_rx,
            subscriptions.clone(),
            Arc::clone(&connected),
            config,
        ));

        Ok(Self {
            url,
            cmd_tx,
            subscriptions,
            connected,
            next_id: AtomicU64::new(1),
        })
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Subscribe to a node event stream.
    ///
    /// `kind` is the subscription type (e.g. `"newHeads"`, `"logs"`). The
    /// returned key stays valid across reconnects; notifications that arrive
    /// right behind the confirmation are already routed to the receiver.
    pub async fn subscribe(
        &self,
        kind: &str,
        params: Vec<Value>,
    ) -> Result<(SubscriptionKey, mpsc::UnboundedReceiver<Value>), TransportError> {
        let (key, rx) = self.subscriptions.register(kind.to_string(), params.clone());
        let req = JsonRpcRequest::new(
            self.next_id(),
            "eth_subscribe",
            std::iter::once(Value::String(kind.to_string()))
                .chain(params)
                .collect(),
        );
        match self.request_subscription(req, key).await {
            Ok(node_id) => {
                tracing::debug!(subscription = %key, node_id = %node_id, kind, "subscribed");
                Ok((key, rx))
            }
            Err(e) => {
                self.subscriptions.remove(key);
                Err(e)
            }
        }
    }

    async fn request_subscription(
        &self,
        req: JsonRpcRequest,
        key: SubscriptionKey,
    ) -> Result<SubscriptionId, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(WsCommand::Subscribe { req, key, tx })
            .map_err(|_| TransportError::WebSocket("WS task closed".into()))?;
        let resp = rx
            .await
            .map_err(|_| TransportError::WebSocket("WS response dropped".into()))??;
        match resp.into_result().map_err(TransportError::Rpc)? {
            Value::String(id) => Ok(SubscriptionId(id)),
            other => Err(TransportError::Other(format!(
                "unexpected eth_subscribe result: {other}"
            ))),
        }
    }

    /// Cancel a subscription. Unknown keys are a no-op.
    pub async fn unsubscribe(&self, key: SubscriptionKey) -> Result<(), TransportError> {
        let Some(node_id) = self.subscriptions.remove(key) else {
            return Ok(());
        };
        let _: Value = self
            .call(
                self.next_id(),
                "eth_unsubscribe",
                vec![Value::String(node_id.0)],
            )
            .await?;
        Ok(())
    }

    /// Number of live subscriptions on this connection.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

impl Drop for WsRpcClient {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(WsCommand::Close);
    }
}

#[async_trait]
impl RpcTransport for WsRpcClient {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(WsCommand::Send { req, tx })
            .map_err(|_| TransportError::WebSocket("WS task closed".into()))?;
        rx.await
            .map_err(|_| TransportError::WebSocket("WS response dropped".into()))?
    }

    fn health(&self) -> HealthStatus {
        if self.connected.load(Ordering::Relaxed) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }

    fn url(&self) -> &str {
        &self.url
    }
}

/// Background task that owns the WebSocket connection.
async fn ws_task(
    url: String,
    mut cmd_rx: mpsc::UnboundedReceiver<WsCommand>,
    subscriptions: SubscriptionRegistry,
    connected: Arc<AtomicBool>,
    config: WsClientConfig,
) {
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let mut binding = Binding::new();
    let mut internal_seq = INTERNAL_ID_BASE;
    let mut backoff = config.reconnect_initial;

    loop {
        tracing::info!(url = %url, "connecting via WebSocket");

        let ws_stream = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    backoff_ms = backoff.as_millis() as u64,
                    "WS connect failed"
                );
                time::sleep(backoff).await;
                backoff = (backoff * 2).min(config.reconnect_max);
                continue;
            }
        };

        backoff = config.reconnect_initial;
        connected.store(true, Ordering::Relaxed);
        let (mut sink, mut stream) = ws_stream.split();

        for sub in subscriptions.active_subscriptions() {
            internal_seq += 1;
            let req = JsonRpcRequest::new(
                internal_seq,
                "eth_subscribe",
                std::iter::once(Value::String(sub.kind))
                    .chain(sub.params)
                    .collect(),
            );
            if let Ok(msg) = serde_json::to_string(&req) {
                if sink.send(Message::Text(msg)).await.is_ok() {
                    binding.insert(internal_seq, sub.key);
                }
            }
        }

        let closed_by_caller = loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let (req, tx) = match cmd {
                        None | Some(WsCommand::Close) => break true,
                        Some(WsCommand::Send { req, tx }) => (req, tx),
                        Some(WsCommand::Subscribe { req, key, tx }) => {
                            if let Some(id) = req.id.as_number() {
                                binding.insert(id, key);
                            }
                            (req, tx)
                        }
                    };
                    let id = req.id.as_number().unwrap_or(0);
                    let msg = match serde_json::to_string(&req) {
                        Ok(msg) => msg,
                        Err(e) => {
                            binding.remove(&id);
                            let _ = tx.send(Err(TransportError::Deserialization(e)));
                            continue;
                        }
                    };
                    lock_pending(&pending).insert(id, tx);
                    if let Err(e) = sink.send(Message::Text(msg)).await {
                        if let Some(tx) = lock_pending(&pending).remove(&id) {
                            let _ = tx.send(Err(TransportError::WebSocket(e.to_string())));
                        }
                        break false;
                    }
                }
                msg = stream.next() => {
                    match msg {
                        None => break false,
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "WS receive error");
                            break false;
                        }
                        Some(Ok(Message::Text(text))) => {
                            let orphan =
                                handle_message(&text, &pending, &subscriptions, &mut binding);
                            if let Some(node_id) = orphan {
                                internal_seq += 1;
                                let req = JsonRpcRequest::new(
                                    internal_seq,
                                    "eth_unsubscribe",
                                    vec![Value::String(node_id.0)],
                                );
                                if let Ok(msg) = serde_json::to_string(&req) {
                                    let _ = sink.send(Message::Text(msg)).await;
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = sink.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => break false,
                        Some(Ok(_)) => {}
                    }
                }
            }
        };

        connected.store(false, Ordering::Relaxed);
        fail_pending(&pending, "connection lost");
        binding.clear();

        if closed_by_caller {
            let _ = sink.close().await;
            tracing::debug!(url = %url, "WS client closed");
            return;
        }

        tracing::warn!(
            url = %url,
            backoff_ms = backoff.as_millis() as u64,
            "WS disconnected, reconnecting"
        );
        time::sleep(backoff).await;
        backoff = (backoff * 2).min(config.reconnect_max);
    }
}

fn lock_pending(pending: &PendingMap) -> std::sync::MutexGuard<'_, HashMap<u64, Reply>> {
    pending.lock().unwrap_or_else(|p| p.into_inner())
}

/// In-flight requests cannot be answered once their connection is gone.
fn fail_pending(pending: &PendingMap, reason: &str) {
    for (_, tx) in lock_pending(pending).drain() {
        let _ = tx.send(Err(TransportError::WebSocket(reason.to_string())));
    }
}

/// Route one incoming frame.
///
/// An `eth_subscribe` reply binds the node id to its key before the caller
/// sees the reply, so a notification in the same read is not lost. Returns
/// a node id to cancel when the subscription was dropped while the
/// `eth_subscribe` was in flight.
fn handle_message(
    text: &str,
    pending: &PendingMap,
    subscriptions: &SubscriptionRegistry,
    binding: &mut Binding,
) -> Option<SubscriptionId> {
    let Ok(val) = serde_json::from_str::<Value>(text) else {
        tracing::debug!("failed to parse WS message as JSON");
        return None;
    };

    if val.get("method").and_then(|m| m.as_str()) == Some("eth_subscription") {
        if let Some(params) = val.get("params") {
            if let Some(id) = params["subscription"].as_str() {
                let id = SubscriptionId(id.to_string());
                if !subscriptions.dispatch(&id, params["result"].clone()) {
                    tracing::trace!(subscription = %id, "notification for unknown subscription");
                }
            }
        }
        return None;
    }

    let resp = serde_json::from_value::<JsonRpcResponse>(val).ok()?;
    let id = resp.id.as_number()?;

    let mut orphan = None;
    if let Some(key) = binding.remove(&id) {
        match (&resp.result, &resp.error) {
            (Some(Value::String(node_id)), None) => {
                let node_id = SubscriptionId(node_id.clone());
                if subscriptions.bind(key, node_id.clone()) {
                    tracing::debug!(subscription = %key, node_id = %node_id, "subscription bound");
                } else {
                    orphan = Some(node_id);
                }
            }
            (_, Some(e)) => {
                tracing::warn!(subscription = %key, error = %e.message, "eth_subscribe failed");
            }
            (other, None) => {
                tracing::warn!(
                    subscription = %key,
                    result = ?other,
                    "unexpected eth_subscribe result"
                );
            }
        }
    }

    if let Some(tx) = lock_pending(pending).remove(&id) {
        let _ = tx.send(Ok(resp));
    }
    orphan
}
