//! HTTP JSON-RPC client backed by `reqwest`.
//!
//! Transient failures (connection errors, non-2xx status, timeouts) are
//! retried with exponential backoff for idempotent methods. State-changing
//! methods are sent once.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::retry::{is_idempotent, RetryConfig, RetryPolicy};
use crate::transport::{HealthStatus, RpcTransport};

/// Configuration for `HttpRpcClient`.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub retry: RetryConfig,
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

const HEALTH_UNKNOWN: u8 = 0;
const HEALTH_OK: u8 = 1;
const HEALTH_DEGRADED: u8 = 2;

/// HTTP JSON-RPC client.
pub struct HttpRpcClient {
    url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    request_timeout: Duration,
    health: AtomicU8,
}

impl HttpRpcClient {
    /// Create a new client for the given JSON-RPC endpoint URL.
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Config(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            http,
            retry: RetryPolicy::new(config.retry),
            request_timeout: config.request_timeout,
            health: AtomicU8::new(HEALTH_UNKNOWN),
        })
    }

    async fn send_once(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let resp = self
            .http
            .post(&self.url)
            .json(req)
            .send()
            .await
            .map_err(|e| self.map_reqwest(e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        resp.json::<JsonRpcResponse>()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))
    }

    fn map_reqwest(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }
        } else {
            TransportError::Http(e.to_string())
        }
    }
}

#[async_trait]
impl RpcTransport for HttpRpcClient {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let retryable_method = is_idempotent(&req.method);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_once(&req).await {
                Ok(resp) => {
                    self.health.store(HEALTH_OK, Ordering::Relaxed);
                    return Ok(resp);
                }
                Err(e) if e.is_retryable() && retryable_method => {
                    self.health.store(HEALTH_DEGRADED, Ordering::Relaxed);
                    match self.retry.next_delay(attempt) {
                        Some(delay) => {
                            tracing::warn!(
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                method = %req.method,
                                error = %e,
                                url = %self.url,
                                "retrying request"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            tracing::error!(
                                attempt,
                                method = %req.method,
                                error = %e,
                                url = %self.url,
                                "max retries exceeded"
                            );
                            return Err(e);
                        }
                    }
                }
                Err(e) => {
                    if e.is_retryable() {
                        self.health.store(HEALTH_DEGRADED, Ordering::Relaxed);
                    }
                    return Err(e);
                }
            }
        }
    }

    fn health(&self) -> HealthStatus {
        match self.health.load(Ordering::Relaxed) {
            HEALTH_OK => HealthStatus::Healthy,
            HEALTH_DEGRADED => HealthStatus::Degraded,
            _ => HealthStatus::Unknown,
        }
    }

    fn url(&self) -> &str {
        &self.url
    }
}
