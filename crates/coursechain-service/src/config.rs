//! Service configuration.

use std::path::Path;
use std::time::Duration;

use alloy_primitives::Address;
use coursechain_rpc::{HttpClientConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Endpoint used when `RPC_URL` is unset (a local hardhat/anvil node).
pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";

/// File the deployment script writes the market address into.
pub const DEFAULT_DEPLOYMENT_FILE: &str = "deployment.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing setting: {0}")]
    Missing(&'static str),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything a [`crate::CourseService`] needs to talk to one deployment.
#[derive(Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// HTTP JSON-RPC endpoint used for reads and submissions.
    pub rpc_url: String,
    /// Optional WebSocket endpoint; live events poll over HTTP without it.
    #[serde(default)]
    pub ws_url: Option<String>,
    pub contract_address: Address,
    /// Hex secp256k1 key. Never serialized; without it the service is read-only.
    #[serde(default, skip_serializing)]
    pub private_key: Option<String>,
    /// Overrides `eth_chainId` for transaction signing.
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,
    #[serde(default = "default_log_poll_ms")]
    pub log_poll_ms: u64,
    /// Ceiling on in-flight reads when listing a page of courses.
    #[serde(default = "default_max_concurrent_reads")]
    pub max_concurrent_reads: usize,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub http: RetryConfig,
}

fn default_receipt_poll_ms() -> u64 {
    1_000
}

fn default_log_poll_ms() -> u64 {
    2_000
}

fn default_max_concurrent_reads() -> usize {
    100
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("rpc_url", &self.rpc_url)
            .field("ws_url", &self.ws_url)
            .field("contract_address", &self.contract_address)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("chain_id", &self.chain_id)
            .field("receipt_poll_ms", &self.receipt_poll_ms)
            .field("log_poll_ms", &self.log_poll_ms)
            .field("max_concurrent_reads", &self.max_concurrent_reads)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("http", &self.http)
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentInfo {
    contract_address: Address,
}

impl ServiceConfig {
    pub fn new(rpc_url: impl Into<String>, contract_address: Address) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            ws_url: None,
            contract_address,
            private_key: None,
            chain_id: None,
            receipt_poll_ms: default_receipt_poll_ms(),
            log_poll_ms: default_log_poll_ms(),
            max_concurrent_reads: default_max_concurrent_reads(),
            request_timeout_ms: default_request_timeout_ms(),
            http: RetryConfig::default(),
        }
    }

    pub fn with_private_key(mut self, key: impl Into<String>) -> Self {
        self.private_key = Some(key.into());
        self
    }

    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }

    /// Build from `RPC_URL`, `WS_URL`, `CONTRACT_ADDRESS`, `PRIVATE_KEY` and
    /// `CHAIN_ID`, reading the address from `deployment.json` when
    /// `CONTRACT_ADDRESS` is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), Path::new(DEFAULT_DEPLOYMENT_FILE))
    }

    /// Like [`Self::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F, deployment_file: &Path) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let rpc_url = var("RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        let contract_address = match var("CONTRACT_ADDRESS") {
            Some(addr) => addr.trim().parse().map_err(|e| ConfigError::Invalid {
                field: "CONTRACT_ADDRESS",
                reason: format!("{e}"),
            })?,
            None if deployment_file.exists() => Self::deployment_address(deployment_file)?,
            None => return Err(ConfigError::Missing("CONTRACT_ADDRESS")),
        };

        let mut cfg = Self::new(rpc_url, contract_address);
        cfg.ws_url = var("WS_URL");
        cfg.private_key = var("PRIVATE_KEY");
        cfg.chain_id = var("CHAIN_ID")
            .map(|v| {
                v.trim().parse().map_err(|_| ConfigError::Invalid {
                    field: "CHAIN_ID",
                    reason: format!("not an integer: {v}"),
                })
            })
            .transpose()?;
        Ok(cfg)
    }

    /// Read `contractAddress` from a deployment record.
    pub fn deployment_address(path: &Path) -> Result<Address, ConfigError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let info: DeploymentInfo =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: display,
                source,
            })?;
        Ok(info.contract_address)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("rpc_url", &self.rpc_url, &["http", "https"])?;
        if let Some(ws) = &self.ws_url {
            check_url("ws_url", ws, &["ws", "wss"])?;
        }
        if self.contract_address == Address::ZERO {
            return Err(ConfigError::Invalid {
                field: "contract_address",
                reason: "zero address".into(),
            });
        }
        if self.receipt_poll_ms == 0 || self.log_poll_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "poll interval",
                reason: "must be greater than zero".into(),
            });
        }
        if self.max_concurrent_reads == 0 {
            return Err(ConfigError::Invalid {
                field: "max_concurrent_reads",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }

    pub fn log_poll_interval(&self) -> Duration {
        Duration::from_millis(self.log_poll_ms)
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            retry: self.http.clone(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}

fn check_url(field: &'static str, raw: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(raw).map_err(|e| ConfigError::Invalid {
        field,
        reason: format!("{raw}: {e}"),
    })?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(())
}
