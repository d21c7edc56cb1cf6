//! Error types for the course market client.

use coursechain_rpc::TransportError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::revert::revert_reason;
use crate::units::UnitError;

/// Coarse classification callers map to their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed amount, id, account or page. Nothing was sent.
    InvalidArgument,
    /// The queried course does not exist.
    NotFound,
    /// Node unreachable, timed out or answered with garbage. Retryable.
    NetworkFailure,
    /// The EVM reverted the call.
    Reverted,
    /// The node refused the transaction (nonce, funds, gas price).
    Rejected,
    /// No credential configured, or signing failed.
    Signing,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::NetworkFailure => "network_failure",
            Self::Reverted => "reverted",
            Self::Rejected => "rejected",
            Self::Signing => "signing",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by every public course market operation.
#[derive(Debug, Error)]
pub enum CourseError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(#[from] UnitError),

    #[error("course {id} not found")]
    NotFound { id: u64 },

    #[error("network failure: {0}")]
    Network(#[source] TransportError),

    #[error("unexpected response from node: {0}")]
    MalformedResponse(String),

    #[error("transaction reverted: {}", .reason.as_deref().unwrap_or("no reason given"))]
    Reverted { reason: Option<String> },

    #[error("rejected by node: {0}")]
    Rejected(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

impl CourseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) | Self::InvalidAmount(_) => ErrorKind::InvalidArgument,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Network(_) | Self::MalformedResponse(_) => ErrorKind::NetworkFailure,
            Self::Reverted { .. } => ErrorKind::Reverted,
            Self::Rejected(_) => ErrorKind::Rejected,
            Self::Signing(_) => ErrorKind::Signing,
        }
    }

    /// Returns `true` when repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::NetworkFailure
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Classify a failure of `eth_estimateGas` or `eth_sendRawTransaction`.
    ///
    /// Node errors there mean the transaction itself was refused (nonce,
    /// funds, gas price), so they become [`CourseError::Rejected`] instead of
    /// a retryable network failure.
    pub fn from_submission(err: TransportError) -> Self {
        match err {
            TransportError::Rpc(rpc) if !rpc.is_execution_reverted() => {
                Self::Rejected(rpc.message)
            }
            other => other.into(),
        }
    }
}

/// Reverts keep their reason. Any other node error (`header not found`,
/// `limit exceeded`) is treated as a network failure.
impl From<TransportError> for CourseError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Rpc(rpc) if rpc.is_execution_reverted() => Self::Reverted {
                reason: revert_reason(&rpc),
            },
            TransportError::Deserialization(e) => Self::MalformedResponse(e.to_string()),
            other => Self::Network(other),
        }
    }
}

impl From<alloy_sol_types::Error> for CourseError {
    fn from(err: alloy_sol_types::Error) -> Self {
        Self::MalformedResponse(format!("ABI decode failed: {err}"))
    }
}

/// Why a single log could not be turned into a course event.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("log emitted by {0}, not the course market")]
    ForeignAddress(alloy_primitives::Address),

    #[error("log has no topics")]
    NoTopics,

    #[error("unknown event signature {0}")]
    UnknownSignature(alloy_primitives::B256),

    #[error("log was removed by a reorg")]
    Removed,

    #[error("ABI decode failed: {0}")]
    Abi(#[from] alloy_sol_types::Error),

    #[error("course id {0} does not fit in u64")]
    IdOverflow(alloy_primitives::U256),
}
