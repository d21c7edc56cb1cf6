//! Validation of caller-supplied identifiers.

use alloy_primitives::Address;

use crate::error::CourseError;

/// Parse a `0x`-prefixed, 20-byte hex account. Checksum casing is not enforced.
pub fn parse_account(s: &str) -> Result<Address, CourseError> {
    let s = s.trim();
    let hex = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .ok_or_else(|| CourseError::invalid(format!("account must start with 0x: '{s}'")))?;
    if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CourseError::invalid(format!(
            "account must be 40 hex digits: '{s}'"
        )));
    }
    s.parse::<Address>()
        .map_err(|e| CourseError::invalid(format!("bad account '{s}': {e}")))
}

/// Parse a positive decimal course id.
pub fn parse_course_id(s: &str) -> Result<u64, CourseError> {
    let s = s.trim();
    let id: u64 = s
        .parse()
        .map_err(|_| CourseError::invalid(format!("course id must be a positive integer: '{s}'")))?;
    if id == 0 {
        return Err(CourseError::invalid("course ids start at 1"));
    }
    Ok(id)
}
