use std::sync::OnceLock;

use regex::Regex;

use crate::error::{AppError, Result};

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;
// Fixed-width approximations; stored timestamps depend on these staying put.
const MONTH: i64 = 30 * DAY;
const YEAR: i64 = 365 * DAY;

static RELATIVE_RE: OnceLock<Regex> = OnceLock::new();

fn relative_re() -> &'static Regex {
    RELATIVE_RE.get_or_init(|| {
        Regex::new(r"^(\d+)\s+(second|minute|hour|day|week|month|year)s?\s+ago$")
            .expect("relative time pattern is valid")
    })
}

fn unit_seconds(unit: &str) -> Option<i64> {
    match unit {
        "second" => Some(1),
        "minute" => Some(MINUTE),
        "hour" => Some(HOUR),
        "day" => Some(DAY),
        "week" => Some(WEEK),
        "month" => Some(MONTH),
        "year" => Some(YEAR),
        _ => None,
    }
}

/// How many seconds ago a string like "3 hours ago" or "just now" refers to.
pub fn parse_relative(text: &str) -> Result<i64> {
    let text = text.trim().to_lowercase();
    if text == "just now" {
        return Ok(0);
    }

    let malformed = || AppError::MalformedEntry(format!("unrecognised relative time {:?}", text));
    let caps = relative_re().captures(&text).ok_or_else(malformed)?;
    let count: i64 = caps[1].parse().map_err(|_| malformed())?;
    let unit = unit_seconds(&caps[2]).ok_or_else(malformed)?;

    count.checked_mul(unit).ok_or_else(malformed)
}

/// Absolute timestamp for the entry at `position` in a newest-first listing.
///
/// Each position is pushed one second further into the past so entries that
/// share a coarse relative time keep the listing's order.
pub fn resolve(text: &str, now: i64, position: usize) -> Result<i64> {
    let ago = parse_relative(text)?;
    Ok(now - ago - position as i64)
}
