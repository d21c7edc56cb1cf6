//! Records exchanged across the service boundary.

use std::ops::RangeInclusive;

use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CourseError, ErrorKind};
use crate::events::CourseEvent;
use crate::units::{to_decimal, to_smallest_unit, UnitError};

/// Largest page size `list_courses` accepts.
pub const MAX_PAGE_LIMIT: u64 = 100;

/// An amount in both its decimal and its wei form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceAmount {
    pub decimal: String,
    #[serde(with = "u256_decimal")]
    pub smallest_unit: U256,
}

impl PriceAmount {
    pub fn from_smallest_unit(wei: U256) -> Self {
        Self {
            decimal: to_decimal(wei),
            smallest_unit: wei,
        }
    }

    /// Parse a decimal amount. The stored decimal is the canonical rendering.
    pub fn parse(decimal: &str) -> Result<Self, UnitError> {
        to_smallest_unit(decimal).map(Self::from_smallest_unit)
    }
}

/// A course as stored on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRecord {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub author: Address,
    pub price: PriceAmount,
    /// Unix seconds.
    pub created_at: u64,
    /// `created_at` as RFC 3339 UTC.
    pub created_at_iso: String,
}

impl CourseRecord {
    pub fn new(
        id: u64,
        title: String,
        description: String,
        author: Address,
        price: U256,
        created_at: u64,
    ) -> Self {
        Self {
            id,
            title,
            description,
            author,
            price: PriceAmount::from_smallest_unit(price),
            created_at,
            created_at_iso: iso_timestamp(created_at),
        }
    }
}

fn iso_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

/// Native balance of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub account: Address,
    #[serde(flatten)]
    pub amount: PriceAmount,
}

/// 1-based page selector for `list_courses`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

impl PageRequest {
    pub fn new(page: u64, limit: u64) -> Self {
        Self { page, limit }
    }

    pub fn validate(&self) -> Result<(), CourseError> {
        if self.page < 1 {
            return Err(CourseError::invalid("page must be at least 1"));
        }
        if self.limit < 1 || self.limit > MAX_PAGE_LIMIT {
            return Err(CourseError::invalid(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}"
            )));
        }
        Ok(())
    }

    /// Inclusive id range this page covers given `total` courses.
    /// `None` when the page lies past the end.
    pub fn id_range(&self, total: u64) -> Option<RangeInclusive<u64>> {
        let start = self
            .page
            .checked_sub(1)?
            .checked_mul(self.limit)?
            .checked_add(1)?;
        let end = start.checked_add(self.limit - 1)?.min(total);
        (start <= end).then_some(start..=end)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit)
    }

    pub fn has_next(&self, total: u64) -> bool {
        self.page.saturating_mul(self.limit) < total
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

/// One page of courses plus navigation metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoursePage {
    pub items: Vec<CourseRecord>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

/// Where a submitted transaction ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    Building,
    Submitted,
    Confirmed,
    Reverted,
    NetworkFailure,
}

impl TxState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Reverted | Self::NetworkFailure)
    }
}

/// Block inclusion details from the receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub block_number: u64,
    pub block_hash: Option<B256>,
    pub gas_used: u64,
    pub effective_gas_price: u128,
}

/// Failure half of a [`TransactionOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&CourseError> for OutcomeError {
    fn from(err: &CourseError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result of a state-changing call. Never an `Err`: failures are folded
/// into `success = false` with `error` set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOutcome {
    pub success: bool,
    pub state: TxState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<B256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<Confirmation>,
    /// Id assigned by a confirmed `createCourse`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<CourseEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,
}

impl TransactionOutcome {
    pub fn confirmed(tx_hash: B256, confirmation: Confirmation, events: Vec<CourseEvent>) -> Self {
        Self {
            success: true,
            state: TxState::Confirmed,
            tx_hash: Some(tx_hash),
            confirmation: Some(confirmation),
            course_id: None,
            events,
            error: None,
        }
    }

    pub fn failed(state: TxState, tx_hash: Option<B256>, err: &CourseError) -> Self {
        Self {
            success: false,
            state,
            tx_hash,
            confirmation: None,
            course_id: None,
            events: Vec::new(),
            error: Some(err.into()),
        }
    }

    pub fn with_confirmation(mut self, confirmation: Confirmation) -> Self {
        self.confirmation = Some(confirmation);
        self
    }

    pub fn with_course_id(mut self, id: Option<u64>) -> Self {
        self.course_id = id;
        self
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Serde adapter writing `U256` as a base-10 string.
pub mod u256_decimal {
    use alloy_primitives::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &U256, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(v)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<U256, D::Error> {
        let s = String::deserialize(d)?;
        U256::from_str_radix(&s, 10).map_err(D::Error::custom)
    }
}
