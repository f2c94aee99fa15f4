use chrono::{DateTime, DurationRound, Utc};
use std::time::Duration;

pub const NANOS_IN_1_MICRO: u64 = 1_000;
pub const MICROS_IN_1_SEC: u64 = 1_000_000;

/// Drops sub-microsecond precision, matching what the database keeps.
pub fn truncate_to_micros(time: DateTime<Utc>) -> DateTime<Utc> {
    // only fails for timestamps outside of what chrono can represent in nanos
    time.duration_trunc(chrono::Duration::microseconds(1))
        .unwrap_or(time)
}

pub fn truncate_duration_to_micros(duration: Duration) -> Duration {
    Duration::from_micros(duration_to_micros(duration) as u64)
}

// saturates instead of overflowing for absurdly long durations
pub fn duration_to_micros(duration: Duration) -> i64 {
    i64::try_from(duration.as_micros()).unwrap_or(i64::MAX)
}

// negative intervals have no meaning for a span, they become zero
pub fn micros_to_duration(micros: i64) -> Duration {
    Duration::from_micros(u64::try_from(micros).unwrap_or(0))
}
