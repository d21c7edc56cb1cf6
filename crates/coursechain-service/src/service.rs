//! `CourseService`: the single entry point collaborators call.

use std::sync::Arc;

use alloy_primitives::Address;
use coursechain_core::{
    Balance, CourseError, CourseEvent, CoursePage, CourseRecord, EventDecoder, EventKind,
    PageRequest, TransactionOutcome,
};
use coursechain_rpc::{EthClient, HttpRpcClient, RpcTransport};

use crate::config::ServiceConfig;
use crate::lifecycle::TxManager;
use crate::pagination;
use crate::queries::CourseReader;
use crate::signer::{LocalSigner, TransactionSigner};
use crate::subscriptions::{
    LogSource, PollingLogSource, SubscriptionHandle, SubscriptionManager, WsLogSource,
};

/// Client for one deployed course market, acting as at most one account.
///
/// Reads need no credential. Writes use the signer given at construction and
/// fail with [`coursechain_core::ErrorKind::Signing`] when there is none.
pub struct CourseService {
    config: ServiceConfig,
    reader: CourseReader,
    tx: TxManager,
    subscriptions: SubscriptionManager,
}

impl CourseService {
    /// Build the HTTP transport, the signer from `private_key`, and a
    /// WebSocket log source when `ws_url` is set.
    pub async fn connect(config: ServiceConfig) -> Result<Self, CourseError> {
        config
            .validate()
            .map_err(|e| CourseError::invalid(format!("invalid configuration: {e}")))?;

        let http = HttpRpcClient::new(config.rpc_url.clone(), config.http_client_config())
            .map_err(|e| CourseError::invalid(format!("invalid configuration: {e}")))?;
        let transport: Arc<dyn RpcTransport> = Arc::new(http);
        let eth = EthClient::new(transport);

        let signer = match config.private_key.as_deref() {
            Some(key) => Some(Arc::new(LocalSigner::from_hex(key)?) as Arc<dyn TransactionSigner>),
            None => None,
        };

        let source: Arc<dyn LogSource> = match config.ws_url.as_deref() {
            Some(url) => Arc::new(WsLogSource::connect(url).await?),
            None => Arc::new(PollingLogSource::new(eth.clone(), config.log_poll_interval())),
        };

        tracing::info!(
            rpc = %config.rpc_url,
            contract = %config.contract_address,
            signer = ?signer.as_ref().map(|s| s.address()),
            events = source.name(),
            "course service ready"
        );
        Ok(Self::from_parts(config, eth, signer, source))
    }

    /// Assemble over an existing transport. Live events poll `eth_getLogs`.
    pub fn with_transport(
        config: ServiceConfig,
        transport: Arc<dyn RpcTransport>,
        signer: Option<Arc<dyn TransactionSigner>>,
    ) -> Self {
        let eth = EthClient::new(transport);
        let source = Arc::new(PollingLogSource::new(eth.clone(), config.log_poll_interval()));
        Self::from_parts(config, eth, signer, source)
    }

    fn from_parts(
        config: ServiceConfig,
        eth: EthClient,
        signer: Option<Arc<dyn TransactionSigner>>,
        source: Arc<dyn LogSource>,
    ) -> Self {
        let contract = config.contract_address;
        let reader = CourseReader::new(eth.clone(), contract);
        let tx = TxManager::new(
            eth,
            contract,
            signer,
            config.chain_id,
            config.receipt_poll_interval(),
        );
        let subscriptions = SubscriptionManager::new(
            source,
            EventDecoder::new(contract),
            reader.clone(),
            config.log_poll_interval(),
        );
        Self {
            config,
            reader,
            tx,
            subscriptions,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn contract_address(&self) -> Address {
        self.config.contract_address
    }

    /// Account writes are sent from, if a credential is configured.
    pub fn signer_address(&self) -> Option<Address> {
        self.tx.signer_address()
    }

    // ─── Writes ──────────────────────────────────────────────────────────────

    /// Create a course. On success `course_id` holds the assigned id.
    pub async fn create_course(
        &self,
        title: &str,
        description: &str,
        price: &str,
    ) -> TransactionOutcome {
        self.tx.submit_create(title, description, price).await
    }

    /// Buy `course_id`, sending `payment` ether with the call.
    pub async fn purchase_course(&self, course_id: u64, payment: &str) -> TransactionOutcome {
        self.tx.submit_purchase(course_id, payment).await
    }

    // ─── Reads ───────────────────────────────────────────────────────────────

    pub async fn course(&self, id: u64) -> Result<CourseRecord, CourseError> {
        self.reader.course(id).await
    }

    pub async fn course_buyers(&self, id: u64) -> Result<Vec<Address>, CourseError> {
        self.reader.course_buyers(id).await
    }

    pub async fn purchased_courses(&self, account: Address) -> Result<Vec<u64>, CourseError> {
        self.reader.purchased_courses(account).await
    }

    pub async fn has_purchased(&self, id: u64, account: Address) -> Result<bool, CourseError> {
        self.reader.has_purchased(id, account).await
    }

    pub async fn course_count(&self) -> Result<u64, CourseError> {
        self.reader.course_count().await
    }

    /// Balance of `account`, or of the signer when `None`.
    pub async fn balance(&self, account: Option<Address>) -> Result<Balance, CourseError> {
        let account = account.or_else(|| self.signer_address()).ok_or_else(|| {
            CourseError::invalid("no account given and no signer configured")
        })?;
        self.reader.balance(account).await
    }

    /// One page of courses; lookups that fail are left out.
    pub async fn list_courses(&self, page: PageRequest) -> Result<CoursePage, CourseError> {
        pagination::list_courses(&self.reader, page, self.config.max_concurrent_reads).await
    }

    // ─── Live events ─────────────────────────────────────────────────────────

    pub async fn on_course_created<F>(&self, handler: F) -> Result<SubscriptionHandle, CourseError>
    where
        F: FnMut(CourseEvent) + Send + 'static,
    {
        self.subscriptions.subscribe(EventKind::Created, handler).await
    }

    pub async fn on_course_purchased<F>(
        &self,
        handler: F,
    ) -> Result<SubscriptionHandle, CourseError>
    where
        F: FnMut(CourseEvent) + Send + 'static,
    {
        self.subscriptions.subscribe(EventKind::Purchased, handler).await
    }

    pub async fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.subscriptions.unsubscribe(handle).await
    }

    /// Remove every handler. Safe to call any number of times.
    pub async fn stop_all_subscriptions(&self) -> usize {
        self.subscriptions.unsubscribe_all().await
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.handler_count()
    }
}
