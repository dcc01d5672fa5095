use chrono::{DateTime, Utc};

/// Current UTC instant truncated to millisecond resolution, the resolution
/// events are persisted at.
pub(crate) fn now_ms() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Milliseconds between two instants, clamped to zero if `end` precedes `start`.
pub(crate) fn duration_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_milliseconds().max(0)
}
