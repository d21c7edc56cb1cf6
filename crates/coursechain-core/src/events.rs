//! Course market log decoding.
//!
//! Turns [`RawLog`]s from receipts, `eth_getLogs` or a `logs` subscription
//! into typed [`CourseEvent`]s. Logs that do not belong to the market are
//! skipped, never fatal.

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolEvent;
use coursechain_rpc::{LogFilter, RawLog};
use serde::{Deserialize, Serialize};

use crate::contract::{CourseCreated, CoursePurchased};
use crate::error::DecodeError;
use crate::types::PriceAmount;

/// The two events the market emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Created,
    Purchased,
}

impl EventKind {
    pub const ALL: [EventKind; 2] = [EventKind::Created, EventKind::Purchased];

    /// keccak256 of the event signature, i.e. the expected topic0.
    pub fn topic0(self) -> B256 {
        match self {
            Self::Created => CourseCreated::SIGNATURE_HASH,
            Self::Purchased => CoursePurchased::SIGNATURE_HASH,
        }
    }

    pub fn from_topic0(topic: &B256) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.topic0() == *topic)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Created => "CourseCreated",
            Self::Purchased => "CoursePurchased",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded market event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseEvent {
    pub kind: EventKind,
    pub course_id: u64,
    /// Author for `Created`, buyer for `Purchased`.
    pub actor: Address,
    /// Only `Created` carries the title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub price: PriceAmount,
    pub tx_hash: Option<B256>,
    pub block_number: u64,
    pub log_index: u64,
}

/// Decoder bound to one deployed market address.
#[derive(Debug, Clone, Copy)]
pub struct EventDecoder {
    contract: Address,
}

impl EventDecoder {
    pub fn new(contract: Address) -> Self {
        Self { contract }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Node-side filter matching `kinds` at this address.
    pub fn filter(&self, kinds: &[EventKind]) -> LogFilter {
        LogFilter::for_address(self.contract).with_topic0(kinds.iter().map(|k| k.topic0()))
    }

    /// Decode one log, reporting why it was not a market event.
    pub fn decode_log(&self, log: &RawLog) -> Result<CourseEvent, DecodeError> {
        if log.address != self.contract {
            return Err(DecodeError::ForeignAddress(log.address));
        }
        if log.removed {
            return Err(DecodeError::Removed);
        }
        let topic0 = log.topics.first().ok_or(DecodeError::NoTopics)?;
        let kind = EventKind::from_topic0(topic0).ok_or(DecodeError::UnknownSignature(*topic0))?;
        let topics = log.topics.iter().copied();

        let (course_id, actor, title, price) = match kind {
            EventKind::Created => {
                let ev = CourseCreated::decode_raw_log(topics, &log.data, true)?;
                (ev.courseId, ev.author, Some(ev.title), ev.price)
            }
            EventKind::Purchased => {
                let ev = CoursePurchased::decode_raw_log(topics, &log.data, true)?;
                (ev.courseId, ev.buyer, None, ev.price)
            }
        };

        Ok(CourseEvent {
            kind,
            course_id: course_id_u64(course_id)?,
            actor,
            title,
            price: PriceAmount::from_smallest_unit(price),
            tx_hash: log.transaction_hash,
            block_number: log.block_number_u64(),
            log_index: log.log_index_u64(),
        })
    }

    /// Decode `log` if it is one of `kinds`; anything else is skipped.
    pub fn decode(&self, log: &RawLog, kinds: &[EventKind]) -> Option<CourseEvent> {
        match self.decode_log(log) {
            Ok(ev) if kinds.contains(&ev.kind) => Some(ev),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(
                    address = %log.address,
                    tx = ?log.transaction_hash,
                    error = %e,
                    "skipping log"
                );
                None
            }
        }
    }

    /// Decode every matching log, preserving order.
    pub fn decode_all(&self, logs: &[RawLog], kinds: &[EventKind]) -> Vec<CourseEvent> {
        logs.iter().filter_map(|l| self.decode(l, kinds)).collect()
    }
}

fn course_id_u64(id: U256) -> Result<u64, DecodeError> {
    u64::try_from(id).map_err(|_| DecodeError::IdOverflow(id))
}
