use chrono::{DateTime, Utc};

/// All timestamps in Arbitros are UTC instants; millisecond resolution is enforced at
/// construction so two events computed from the same wall-clock read compare equal.
pub fn now_ms() -> DateTime<Utc> {
    truncate_to_millis(Utc::now())
}

pub fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    let millis = ts.timestamp_millis();
    DateTime::from_timestamp_millis(millis).unwrap_or(ts)
}
