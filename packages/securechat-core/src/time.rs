//! Timestamp helpers.
//!
//! Every timestamp in the core (session key creation, message `createdAt`)
//! is Unix milliseconds in UTC.

use chrono::{DateTime, TimeZone, Utc};

/// Returns the current Unix timestamp in milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a Unix millisecond timestamp into a UTC date-time.
///
/// Returns `None` for values chrono cannot represent.
pub fn to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}
