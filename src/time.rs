use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

/// Failed to recognize a date string in any supported format.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseDateError(pub String);

impl fmt::Display for ParseDateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unrecognized date format: '{}'", self.0)
    }
}

impl std::error::Error for ParseDateError {}

/// Parses exchange export timestamps, trying formats in priority order:
///
/// 1. Two-digit-year `YY-MM-DD HH:MM:SS`, expanded by adding 2000 to the
///    year (some Binance exports use this form).
/// 2. ISO-8601 with optional fractional seconds and `Z`.
/// 3. `YYYY-MM-DD HH:MM:SS`, with optional fractional seconds.
/// 4. Date-only `YYYY-MM-DD`, taken as midnight UTC.
/// 5. Slash formats (`MM/DD/YYYY` first, then `DD/MM/YYYY`) as a
///    last-resort generic parse.
pub fn parse_date_time(raw: &str) -> Result<NaiveDateTime, ParseDateError> {
    let raw = raw.trim();

    if let Some(expanded) = expand_two_digit_year(raw) {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(&expanded, "%Y-%m-%d %H:%M:%S") {
            return Ok(timestamp);
        }
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.fZ")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").map(|date| date.and_hms_opt(0, 0, 0).unwrap())
        })
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%m/%d/%Y %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%m/%d/%Y %H:%M"))
        .or_else(|_| {
            NaiveDate::parse_from_str(raw, "%m/%d/%Y").map(|date| date.and_hms_opt(0, 0, 0).unwrap())
        })
        .or_else(|_| {
            NaiveDate::parse_from_str(raw, "%d/%m/%Y").map(|date| date.and_hms_opt(0, 0, 0).unwrap())
        })
        .map_err(|_| ParseDateError(raw.to_owned()))
}

/// Rewrites `YY-MM-DD HH:MM:SS` as `20YY-MM-DD HH:MM:SS`. Shape check
/// only; the caller still runs the full parse.
fn expand_two_digit_year(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    if bytes.len() != 17 || bytes[2] != b'-' || bytes[5] != b'-' || bytes[8] != b' ' {
        return None;
    }
    if !bytes[..2].iter().all(u8::is_ascii_digit) {
        return None;
    }
    Some(format!("20{}", raw))
}
