//! Live course events.
//!
//! One background listener task reads raw logs from a [`LogSource`], decodes
//! them and fans each event out to per-handler queues. Every handler runs on
//! its own task, so a slow handler only delays itself.
//!
//! ```text
//! LogSource ──► listener task ──► decode ──► handler queue ──► handler task
//!                                       └──► handler queue ──► handler task
//! ```

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use coursechain_core::{CourseError, CourseEvent, EventDecoder, EventKind};
use coursechain_rpc::{
    EthClient, LogFilter, RawLog, SubscriptionKey, TransportError, WsClientConfig, WsRpcClient,
};
use futures::stream::{self, Stream, StreamExt};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::queries::CourseReader;

/// Raw logs in node delivery order. Errors are transient; the stream goes on.
pub type LogStream = Pin<Box<dyn Stream<Item = Result<RawLog, TransportError>> + Send>>;

type ListenerSlot = Option<JoinHandle<()>>;

/// Where live logs come from.
#[async_trait]
pub trait LogSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start delivering logs matching `filter` that appear from now on.
    async fn open(&self, filter: LogFilter) -> Result<LogStream, TransportError>;
}

/// `eth_getLogs` polling from the head observed at `open`.
pub struct PollingLogSource {
    eth: EthClient,
    interval: Duration,
}

impl PollingLogSource {
    pub fn new(eth: EthClient, interval: Duration) -> Self {
        Self { eth, interval }
    }
}

struct PollState {
    eth: EthClient,
    filter: LogFilter,
    next_block: u64,
    interval: Duration,
    ready: std::collections::VecDeque<RawLog>,
}

impl PollState {
    async fn poll_once(&mut self) -> Result<(), TransportError> {
        let head = self.eth.block_number().await?;
        if head < self.next_block {
            return Ok(());
        }
        let logs = self
            .eth
            .logs(&self.filter.clone().range(self.next_block, head))
            .await?;
        tracing::trace!(
            from = self.next_block,
            to = head,
            logs = logs.len(),
            "polled logs"
        );
        self.next_block = head + 1;
        self.ready.extend(logs);
        Ok(())
    }
}

#[async_trait]
impl LogSource for PollingLogSource {
    fn name(&self) -> &'static str {
        "eth_getLogs polling"
    }

    async fn open(&self, filter: LogFilter) -> Result<LogStream, TransportError> {
        let head = self.eth.block_number().await?;
        let state = PollState {
            eth: self.eth.clone(),
            filter,
            next_block: head + 1,
            interval: self.interval,
            ready: Default::default(),
        };
        let stream = stream::unfold(state, |mut st| async move {
            loop {
                if let Some(log) = st.ready.pop_front() {
                    return Some((Ok(log), st));
                }
                tokio::time::sleep(st.interval).await;
                if let Err(e) = st.poll_once().await {
                    return Some((Err(e), st));
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

/// `eth_subscribe("logs")` over a WebSocket connection.
pub struct WsLogSource {
    client: Arc<WsRpcClient>,
}

impl WsLogSource {
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let client = WsRpcClient::connect(url, WsClientConfig::default()).await?;
        Ok(Self {
            client: Arc::new(client),
        })
    }
}

/// Cancels the node-side subscription when the stream is dropped. Holds the
/// client-side key, so the cancel targets whatever id the node assigned last.
struct WsSubscriptionGuard {
    client: Arc<WsRpcClient>,
    key: SubscriptionKey,
}

impl Drop for WsSubscriptionGuard {
    fn drop(&mut self) {
        let client = Arc::clone(&self.client);
        let key = self.key;
        if let Ok(rt) = tokio::runtime::Handle::try_current() {
            rt.spawn(async move {
                if let Err(e) = client.unsubscribe(key).await {
                    tracing::debug!(subscription = %key, error = %e, "eth_unsubscribe failed");
                }
            });
        }
    }
}

#[async_trait]
impl LogSource for WsLogSource {
    fn name(&self) -> &'static str {
        "eth_subscribe"
    }

    async fn open(&self, filter: LogFilter) -> Result<LogStream, TransportError> {
        let (key, rx) = self.client.subscribe("logs", vec![filter.to_json()]).await?;
        let guard = WsSubscriptionGuard {
            client: Arc::clone(&self.client),
            key,
        };
        let stream = stream::unfold((rx, guard), |(mut rx, guard)| async move {
            let value = rx.recv().await?;
            let item = serde_json::from_value::<RawLog>(value).map_err(TransportError::from);
            Some((item, (rx, guard)))
        });
        Ok(Box::pin(stream))
    }
}

/// Identifies one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    kind: EventKind,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

struct HandlerSlot {
    kind: EventKind,
    queue: mpsc::UnboundedSender<CourseEvent>,
}

/// Registered handlers. The lock is never held across an `.await`.
#[derive(Clone, Default)]
struct HandlerRegistry {
    slots: Arc<Mutex<HashMap<u64, HandlerSlot>>>,
    next_id: Arc<AtomicU64>,
}

impl HandlerRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, HandlerSlot>> {
        self.slots.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Spawns the handler's task; must run inside a Tokio runtime.
    fn register<F>(&self, kind: EventKind, mut handler: F) -> SubscriptionHandle
    where
        F: FnMut(CourseEvent) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (queue, mut rx) = mpsc::unbounded_channel::<CourseEvent>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handler(event);
            }
            tracing::trace!(handler = id, "handler task finished");
        });
        self.lock().insert(id, HandlerSlot { kind, queue });
        SubscriptionHandle { id, kind }
    }

    /// Queue `event` for every handler of its kind. Returns how many got it.
    fn dispatch(&self, event: &CourseEvent) -> usize {
        let mut slots = self.lock();
        let mut delivered = 0;
        slots.retain(|id, slot| {
            if slot.kind != event.kind {
                return true;
            }
            match slot.queue.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => {
                    tracing::debug!(handler = id, "handler task gone, dropping it");
                    false
                }
            }
        });
        delivered
    }

    fn remove(&self, id: u64) -> bool {
        self.lock().remove(&id).is_some()
    }

    fn clear(&self) -> usize {
        let mut slots = self.lock();
        let n = slots.len();
        slots.clear();
        n
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Registers handlers for course events and owns the listener task.
///
/// Handler registration, removal and the listener start/stop decision all
/// happen under the `listener` lock, so a handler is never left registered
/// without a running listener.
pub struct SubscriptionManager {
    source: Arc<dyn LogSource>,
    decoder: EventDecoder,
    reader: CourseReader,
    handlers: HandlerRegistry,
    listener: AsyncMutex<ListenerSlot>,
    reopen_delay: Duration,
}

impl SubscriptionManager {
    pub fn new(
        source: Arc<dyn LogSource>,
        decoder: EventDecoder,
        reader: CourseReader,
        reopen_delay: Duration,
    ) -> Self {
        Self {
            source,
            decoder,
            reader,
            handlers: HandlerRegistry::default(),
            listener: AsyncMutex::new(None),
            reopen_delay,
        }
    }

    /// Register `handler` for `kind`. The first registration opens the log
    /// source and starts the listener; the call returns once it is running.
    pub async fn subscribe<F>(
        &self,
        kind: EventKind,
        handler: F,
    ) -> Result<SubscriptionHandle, CourseError>
    where
        F: FnMut(CourseEvent) + Send + 'static,
    {
        let mut listener = self.listener.lock().await;
        let handle = self.handlers.register(kind, handler);
        if let Err(e) = self.ensure_listener(&mut listener).await {
            self.handlers.remove(handle.id);
            return Err(e);
        }
        tracing::info!(handler = handle.id, kind = %kind, "subscribed");
        Ok(handle)
    }

    /// Remove one handler. Stops the listener once none are left.
    pub async fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut listener = self.listener.lock().await;
        let removed = self.handlers.remove(handle.id);
        if removed {
            tracing::info!(handler = handle.id, kind = %handle.kind, "unsubscribed");
        }
        if self.handlers.is_empty() {
            stop_listener(&mut listener);
        }
        removed
    }

    /// Remove every handler and stop the listener. Safe to call repeatedly.
    pub async fn unsubscribe_all(&self) -> usize {
        let mut listener = self.listener.lock().await;
        let removed = self.handlers.clear();
        stop_listener(&mut listener);
        if removed > 0 {
            tracing::info!(removed, "all subscriptions stopped");
        }
        removed
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub async fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    async fn ensure_listener(&self, slot: &mut ListenerSlot) -> Result<(), CourseError> {
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }
        let filter = self.decoder.filter(&EventKind::ALL);
        let stream = self.source.open(filter.clone()).await?;
        tracing::info!(
            source = self.source.name(),
            contract = %self.decoder.contract(),
            "listening for course events"
        );

        let listener = Listener {
            source: Arc::clone(&self.source),
            filter,
            decoder: self.decoder,
            reader: self.reader.clone(),
            handlers: self.handlers.clone(),
            reopen_delay: self.reopen_delay,
        };
        *slot = Some(tokio::spawn(listener.run(stream)));
        Ok(())
    }
}

fn stop_listener(slot: &mut ListenerSlot) {
    if let Some(task) = slot.take() {
        task.abort();
        tracing::debug!("event listener stopped");
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        if let Some(task) = self.listener.get_mut().take() {
            task.abort();
        }
    }
}

struct Listener {
    source: Arc<dyn LogSource>,
    filter: LogFilter,
    decoder: EventDecoder,
    reader: CourseReader,
    handlers: HandlerRegistry,
    reopen_delay: Duration,
}

impl Listener {
    async fn run(self, mut stream: LogStream) {
        // Highest course count seen so far; events past it trigger one refresh.
        let mut known_count = 0u64;
        loop {
            while let Some(item) = stream.next().await {
                let log = match item {
                    Ok(log) => log,
                    Err(e) => {
                        tracing::warn!(
                            source = self.source.name(),
                            error = %e,
                            "log source error"
                        );
                        continue;
                    }
                };
                let Some(event) = self.decoder.decode(&log, &EventKind::ALL) else {
                    continue;
                };
                if event.course_id > known_count {
                    match self.reader.course_count().await {
                        Ok(count) => known_count = count,
                        Err(e) => tracing::warn!(error = %e, "course count refresh failed"),
                    }
                    if event.course_id > known_count {
                        tracing::warn!(
                            course_id = event.course_id,
                            known_count,
                            "dropping event for a course not yet visible"
                        );
                        continue;
                    }
                }
                let delivered = self.handlers.dispatch(&event);
                tracing::debug!(
                    kind = %event.kind,
                    course_id = event.course_id,
                    delivered,
                    "event dispatched"
                );
            }

            tracing::warn!(source = self.source.name(), "log stream ended, reopening");
            stream = loop {
                tokio::time::sleep(self.reopen_delay).await;
                match self.source.open(self.filter.clone()).await {
                    Ok(s) => break s,
                    Err(e) => tracing::warn!(error = %e, "reopening log source failed"),
                }
            };
        }
    }
}
