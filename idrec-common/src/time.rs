//! Timestamp utilities

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// Current UTC timestamp at storage precision (microseconds)
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Next timestamp that is not earlier than `floor` (equal when the clock lags)
///
/// Stores hand out creation times through this so that `created_at` never
/// runs backwards when the wall clock does.
pub fn monotonic_after(floor: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = now();
    match floor {
        Some(floor) if floor > now => floor,
        _ => now,
    }
}

/// Fixed-width RFC 3339 form used for storage (sorts lexicographically)
pub fn to_storage(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
