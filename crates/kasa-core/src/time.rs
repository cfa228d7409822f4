//! # Timestamps
//!
//! Every timestamp Kasa writes is UTC with a fixed six-digit fraction:
//!
//! ```text
//! 2026-10-15T09:30:00.000000Z
//! ```
//!
//! The fixed width keeps text comparison equal to time comparison, which the
//! SQLite and in-memory stores rely on for `sale_date >= <start of day>`
//! filters. Reading is lenient: any RFC 3339 value (PostgREST returns
//! `+00:00` offsets) or a bare `YYYY-MM-DD HH:MM:SS` is accepted.

use chrono::{DateTime, FixedOffset, NaiveDateTime, NaiveTime, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// Format used for every stored timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Current time at stored precision (microseconds), so a value written and
/// read back compares equal to the original.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Formats a timestamp the way it is stored and filtered on.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a stored timestamp.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Ok(ts.with_timezone(&Utc)),
        Err(_) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|n| n.and_utc()),
    }
}

/// Start of the business day containing `now`, in the given local offset.
///
/// "Today's sales" for the till are counted from this instant.
pub fn start_of_day(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let local_midnight = now
        .with_timezone(&offset)
        .date_naive()
        .and_time(NaiveTime::MIN);
    offset
        .from_local_datetime(&local_midnight)
        .single()
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or(now)
}

/// serde adapter for `DateTime<Utc>` fields on stored records.
pub mod timestamp {
    use super::*;

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

/// serde adapter for `Option<DateTime<Utc>>` fields on stored records.
pub mod timestamp_opt {
    use super::*;

    pub fn serialize<S: Serializer>(
        ts: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => serializer.serialize_some(&format_timestamp(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| parse_timestamp(&raw))
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}
