//! General time utility functions

use chrono;

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Format used for timestamps in published telemetry.
pub const TLM_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Convert a duration into a number of seconds, or `None` if overflow
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    duration
        .num_nanoseconds()
        .map(|ns| ns as f64 / NANOS_PER_SECOND as f64)
}

/// Format a local timestamp the way telemetry subscribers expect it.
pub fn format_tlm_timestamp(timestamp: &chrono::DateTime<chrono::Local>) -> String {
    timestamp.format(TLM_TIMESTAMP_FORMAT).to_string()
}
