//! Bucket width parsing: `<n>m`, `<n>h`, `<n>d` to milliseconds.

use super::AggregationError;

/// Width used whenever an interval cannot be interpreted (one minute).
pub const DEFAULT_INTERVAL_MS: i64 = 60_000;

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

// ---

/// Parse an interval, falling back to [`DEFAULT_INTERVAL_MS`] on any
/// malformed input (empty string, unknown unit, non-numeric or non-positive
/// magnitude, overflow).
pub fn parse_interval(spec: &str) -> i64 {
    // ---
    match try_parse_interval(spec) {
        Ok(width) => width,
        Err(_) => DEFAULT_INTERVAL_MS,
    }
}

/// Parse an interval, reporting malformed input as an error.
///
/// The last character is the unit (`m`, `h`, `d`), everything before it a
/// base-10 magnitude greater than zero.
pub fn try_parse_interval(spec: &str) -> Result<i64, AggregationError> {
    // ---
    let invalid = || AggregationError::InvalidInterval(spec.to_string());

    let mut chars = spec.chars();
    let unit = chars.next_back().ok_or_else(invalid)?;
    let magnitude = chars.as_str();

    let unit_ms = match unit {
        'm' => MINUTE_MS,
        'h' => HOUR_MS,
        'd' => DAY_MS,
        _ => return Err(invalid()),
    };

    let n: i64 = magnitude.parse().map_err(|_| invalid())?;
    if n <= 0 {
        return Err(invalid());
    }

    n.checked_mul(unit_ms).ok_or_else(invalid)
}
