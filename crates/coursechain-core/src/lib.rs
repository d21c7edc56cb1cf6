//! coursechain-core: domain layer for the course market client.
//!
//! - [`units`]: exact wei/decimal conversion
//! - [`contract`]: `sol!` bindings for the market ABI
//! - [`events`]: log decoding into [`CourseEvent`]s
//! - [`revert`]: `Error(string)` reason extraction
//! - [`types`]: records and outcomes crossing the service boundary
//! - [`error`]: [`CourseError`] and its [`ErrorKind`] classification

pub mod contract;
pub mod error;
pub mod events;
pub mod input;
pub mod revert;
pub mod types;
pub mod units;

pub use error::{CourseError, DecodeError, ErrorKind};
pub use events::{CourseEvent, EventDecoder, EventKind};
pub use input::{parse_account, parse_course_id};
pub use types::{
    Balance, Confirmation, CoursePage, CourseRecord, OutcomeError, PageRequest, PriceAmount,
    TransactionOutcome, TxState, MAX_PAGE_LIMIT,
};
pub use units::{to_decimal, to_smallest_unit, UnitError};
