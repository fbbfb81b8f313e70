//! Duration string parsing
//!
//! Tool output reports elapsed time as human readable strings such as
//! `1.234ms`, `450ns` or, from Go, compound values like `1m30.5s`. They are
//! all converted to seconds as `f64`.

use crate::error::{AppError, AppResult};

/// Unit suffixes and their length in nanoseconds
const UNITS: &[(&str, f64)] = &[
    ("ns", 1.0),
    ("us", 1_000.0),
    ("\u{00b5}s", 1_000.0),
    ("\u{03bc}s", 1_000.0),
    ("ms", 1_000_000.0),
    ("s", 1_000_000_000.0),
    ("m", 60_000_000_000.0),
    ("h", 3_600_000_000_000.0),
];

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

/// Parse a duration string into seconds.
///
/// Components are summed in nanoseconds and divided once at the end so
/// that equivalent spellings (`1000ms`, `1s`) produce identical values.
pub fn parse_duration(input: &str) -> AppResult<f64> {
    let s = input.trim();
    let (negative, body) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    if body.is_empty() {
        return Err(AppError::Parse(format!("empty duration: {:?}", input)));
    }
    if body == "0" {
        return Ok(0.0);
    }

    let mut rest = body;
    let mut total_ns = 0.0;

    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number = &rest[..number_end];
        if !number.bytes().any(|b| b.is_ascii_digit()) {
            return Err(AppError::Parse(format!("missing number in duration: {:?}", input)));
        }
        let value: f64 = number
            .parse()
            .map_err(|_| AppError::Parse(format!("malformed number {:?} in duration {:?}", number, input)))?;
        rest = &rest[number_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_end];
        if unit.is_empty() {
            return Err(AppError::Parse(format!("missing unit in duration: {:?}", input)));
        }
        let factor = UNITS
            .iter()
            .find(|(suffix, _)| *suffix == unit)
            .map(|(_, factor)| *factor)
            .ok_or_else(|| AppError::Parse(format!("unknown unit {:?} in duration {:?}", unit, input)))?;
        rest = &rest[unit_end..];

        total_ns += value * factor;
    }

    let seconds = total_ns / NANOS_PER_SECOND;
    Ok(if negative { -seconds } else { seconds })
}
