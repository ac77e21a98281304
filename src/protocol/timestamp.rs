//! Payload timestamp normalization.
//!
//! The `timeStamp` field observed on the wire arrives in several
//! formats depending on the producing system. This module picks a parse
//! layout from an ordered heuristic stack and returns the instant, or
//! `None` when nothing matches. It is deliberately not a general
//! ISO-8601 parser; callers must tolerate failure.
//!
//! # Example
//!
//! ```
//! use gtmwire::protocol::parse_payload_timestamp;
//!
//! assert!(parse_payload_timestamp("2021-05-01T12:00:00.123Z").is_some());
//! assert!(parse_payload_timestamp("05/01/2021 12:00:00").is_some());
//! assert!(parse_payload_timestamp("2021-05-01").is_some());
//! assert!(parse_payload_timestamp("garbage").is_none());
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

/// Parse a protocol-supplied timestamp string of unknown origin format.
///
/// Heuristics are applied in order; the first match selects the layout:
///
/// 1. ends with `Z` suffix: `YYYY-MM-DDTHH:MM:SS.fffZ` (any fractional
///    width, including none)
/// 2. contains `UTC` and `+`: the stringified form some producers emit,
///    `YYYY-MM-DD HH:MM:SS.fff +0000 UTC`
/// 3. contains `+`: numeric UTC offset, normalized to `+00:00`, then
///    ISO-8601 with offset
/// 4. contains `/` and `:`: US-style `MM/DD/YYYY HH:MM:SS`
/// 5. shorter than 11 characters: date-only `YYYY-MM-DD` (midnight)
/// 6. otherwise: plain `YYYY-MM-DDTHH:MM:SS`
pub fn parse_payload_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if raw.is_empty() {
        return None;
    }

    if raw.ends_with('Z') {
        return NaiveDateTime::parse_from_str(
            raw.trim_end_matches('Z'),
            "%Y-%m-%dT%H:%M:%S%.f",
        )
        .ok();
    }

    if raw.contains("UTC") && raw.contains('+') {
        return DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f %z UTC")
            .ok()
            .map(|dt| dt.naive_utc());
    }

    if let Some(cut) = raw.rfind('+') {
        // Whatever offset the producer wrote, observed clocks are UTC.
        let normalized = format!("{}+00:00", &raw[..cut]);
        return DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f%:z")
            .ok()
            .map(|dt| dt.naive_utc());
    }

    if raw.contains('/') && raw.contains(':') {
        return NaiveDateTime::parse_from_str(raw, "%m/%d/%Y %H:%M:%S").ok();
    }

    if raw.len() < 11 {
        return NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .map(|d| d.and_time(NaiveTime::MIN));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").ok()
}
