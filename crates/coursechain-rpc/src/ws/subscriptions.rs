//! WebSocket subscription bookkeeping.
//!
//! Each subscription is stored under a [`SubscriptionKey`] chosen by the
//! client, which the caller keeps for its whole life. The node assigns a new
//! [`SubscriptionId`] on every `eth_subscribe`, including the re-subscribe
//! after a reconnect, so node ids are only an index onto the key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::mpsc;

/// Node-assigned id from `eth_subscribe`. Changes after every reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub String);

impl From<String> for SubscriptionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client-side handle of one subscription, stable across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionKey(u64);

impl std::fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

struct SubscriptionEntry {
    /// `None` until the node confirms the subscription.
    node_id: Option<SubscriptionId>,
    kind: String,
    params: Vec<Value>,
    sender: mpsc::UnboundedSender<Value>,
}

#[derive(Default)]
struct Entries {
    by_key: HashMap<SubscriptionKey, SubscriptionEntry>,
    by_node_id: HashMap<SubscriptionId, SubscriptionKey>,
    next_key: u64,
}

impl Entries {
    fn drop_entry(&mut self, key: SubscriptionKey) -> Option<SubscriptionEntry> {
        let entry = self.by_key.remove(&key)?;
        if let Some(id) = &entry.node_id {
            self.by_node_id.remove(id);
        }
        Some(entry)
    }
}

/// A confirmed subscription to re-issue after reconnect.
#[derive(Debug, Clone)]
pub struct ActiveSubscription {
    pub key: SubscriptionKey,
    pub kind: String,
    pub params: Vec<Value>,
}

/// Shared registry of WebSocket subscriptions.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    entries: Arc<Mutex<Entries>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Add an unconfirmed subscription and return its key and feed.
    pub fn register(
        &self,
        kind: String,
        params: Vec<Value>,
    ) -> (SubscriptionKey, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut entries = self.lock();
        entries.next_key += 1;
        let key = SubscriptionKey(entries.next_key);
        entries.by_key.insert(
            key,
            SubscriptionEntry {
                node_id: None,
                kind,
                params,
                sender: tx,
            },
        );
        (key, rx)
    }

    /// Point `key` at the id the node just assigned, replacing any earlier
    /// one. Returns `false` when the key was removed in the meantime.
    pub fn bind(&self, key: SubscriptionKey, node_id: SubscriptionId) -> bool {
        let mut guard = self.lock();
        let entries = &mut *guard;
        let Some(entry) = entries.by_key.get_mut(&key) else {
            return false;
        };
        if let Some(previous) = entry.node_id.replace(node_id.clone()) {
            entries.by_node_id.remove(&previous);
        }
        entries.by_node_id.insert(node_id, key);
        true
    }

    /// Forward a notification to the subscription the node id belongs to.
    ///
    /// Entries whose receiver has been dropped are pruned; returns `false`
    /// when the notification had nowhere to go.
    pub fn dispatch(&self, node_id: &SubscriptionId, message: Value) -> bool {
        let mut entries = self.lock();
        let Some(&key) = entries.by_node_id.get(node_id) else {
            return false;
        };
        let delivered = entries
            .by_key
            .get(&key)
            .is_some_and(|e| e.sender.send(message).is_ok());
        if !delivered {
            entries.drop_entry(key);
        }
        delivered
    }

    /// Remove a subscription. Returns the node id to cancel, if the node
    /// had confirmed it.
    pub fn remove(&self, key: SubscriptionKey) -> Option<SubscriptionId> {
        self.lock().drop_entry(key)?.node_id
    }

    /// Current node id of `key`.
    pub fn node_id(&self, key: SubscriptionKey) -> Option<SubscriptionId> {
        self.lock().by_key.get(&key)?.node_id.clone()
    }

    /// Confirmed subscriptions, used to re-subscribe after reconnect.
    pub fn active_subscriptions(&self) -> Vec<ActiveSubscription> {
        self.lock()
            .by_key
            .iter()
            .filter(|(_, e)| e.node_id.is_some())
            .map(|(key, e)| ActiveSubscription {
                key: *key,
                kind: e.kind.clone(),
                params: e.params.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
