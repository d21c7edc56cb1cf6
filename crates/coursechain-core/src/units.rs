//! Conversion between wei and decimal ether strings.
//!
//! The chain stores amounts as 256-bit integers in its smallest unit. Callers
//! speak decimal strings with at most [`DECIMALS`] fractional digits. Both
//! directions are exact; nothing here goes through floating point.

use alloy_primitives::U256;
use thiserror::Error;

/// Fractional digits of the native denomination.
pub const DECIMALS: usize = 18;

/// Why a decimal amount was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("amount is empty")]
    Empty,

    #[error("amount must not be negative: {0}")]
    Negative(String),

    #[error("amount has {got} fractional digits, at most {max} are supported")]
    TooManyDecimals { max: usize, got: usize },

    #[error("malformed amount '{0}': expected digits with an optional fractional part")]
    Malformed(String),

    #[error("amount '{0}' does not fit in 256 bits")]
    Overflow(String),
}

/// Parse a decimal amount such as `"0.1"` or `"12"` into wei.
///
/// Accepts `digits` or `digits.digits`, surrounding whitespace ignored.
pub fn to_smallest_unit(amount: &str) -> Result<U256, UnitError> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(UnitError::Empty);
    }
    if amount.starts_with('-') {
        return Err(UnitError::Negative(amount.to_string()));
    }

    let (int_part, frac_part) = match amount.split_once('.') {
        Some((i, f)) => (i, f),
        None => (amount, ""),
    };
    let well_formed = !int_part.is_empty()
        && int_part.bytes().all(|b| b.is_ascii_digit())
        && frac_part.bytes().all(|b| b.is_ascii_digit())
        && !(amount.contains('.') && frac_part.is_empty());
    if !well_formed {
        return Err(UnitError::Malformed(amount.to_string()));
    }
    if frac_part.len() > DECIMALS {
        return Err(UnitError::TooManyDecimals {
            max: DECIMALS,
            got: frac_part.len(),
        });
    }

    // Right-pad the fraction so the whole thing reads as one integer in wei.
    let digits = int_part
        .bytes()
        .chain(frac_part.bytes())
        .chain(std::iter::repeat(b'0').take(DECIMALS - frac_part.len()));

    let ten = U256::from(10u8);
    let mut acc = U256::ZERO;
    for b in digits {
        acc = acc
            .checked_mul(ten)
            .and_then(|v| v.checked_add(U256::from(b - b'0')))
            .ok_or_else(|| UnitError::Overflow(amount.to_string()))?;
    }
    Ok(acc)
}

/// Render wei as a canonical decimal string.
///
/// No trailing fractional zeros and no `.` for whole amounts, so
/// `to_decimal(to_smallest_unit(x)) == x` for every canonical `x`.
pub fn to_decimal(wei: U256) -> String {
    let base = U256::from(10u8).pow(U256::from(DECIMALS));
    let whole = wei / base;
    let frac = wei % base;
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", frac.to_string(), width = DECIMALS);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}
