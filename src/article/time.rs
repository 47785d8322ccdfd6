use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;

/// Formats that carry an explicit UTC offset. Anything without one is
/// ambiguous and gets dropped.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%dT%H:%M%z",
    "%a, %d %b %Y %H:%M:%S %z",
    "%A, %B %d, %Y %I:%M %p %z",
];

/// `Z`-suffixed forms that RFC 3339 parsing rejects (missing seconds).
const ZULU_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// Epoch values above this are treated as milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Parse a publisher-supplied date string into UTC epoch seconds.
pub fn parse_timestamp(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.timestamp());
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Some(parsed.timestamp());
    }
    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(value, format) {
            return Some(parsed.timestamp());
        }
    }
    if let Some(naive) = value.strip_suffix('Z').or_else(|| value.strip_suffix(" UTC")) {
        for format in ZULU_FORMATS {
            if let Ok(parsed) = NaiveDateTime::parse_from_str(naive, format) {
                return Some(parsed.and_utc().timestamp());
            }
        }
    }

    if (value.len() == 10 || value.len() == 13) && value.bytes().all(|b| b.is_ascii_digit()) {
        return value.parse::<i64>().ok().map(normalize_epoch);
    }

    None
}

/// Like [`parse_timestamp`] but also accepts numeric epoch values found in
/// JSON state.
pub fn parse_timestamp_value(value: &Value) -> Option<i64> {
    match value {
        Value::String(text) => parse_timestamp(text),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|f| f as i64))
            .filter(|epoch| *epoch > 0)
            .map(normalize_epoch),
        _ => None,
    }
}

fn normalize_epoch(epoch: i64) -> i64 {
    if epoch > MILLIS_THRESHOLD {
        epoch / 1000
    } else {
        epoch
    }
}
