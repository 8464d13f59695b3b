use time::{Duration, OffsetDateTime};

pub(crate) fn duration_seconds_from_minutes(duration_minutes: i64) -> Option<i64> {
    if duration_minutes <= 0 {
        return None;
    }
    duration_minutes.checked_mul(60)
}

pub(crate) fn compute_deadline(start_time: OffsetDateTime, duration_seconds: i64) -> OffsetDateTime {
    start_time.saturating_add(Duration::seconds(duration_seconds))
}

/// Whole seconds left until `deadline`, clamped at zero.
pub(crate) fn remaining_seconds(deadline: OffsetDateTime, now: OffsetDateTime) -> u64 {
    let left = (deadline - now).whole_seconds();
    if left <= 0 {
        0
    } else {
        left as u64
    }
}

/// Renders a countdown as `H:MM:SS` from one hour up and `MM:SS` below that.
pub fn format_remaining(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}
