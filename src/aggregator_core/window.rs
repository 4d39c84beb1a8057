//! Window math for time-bucketed aggregation

use std::time::Duration;

/// Width of one aggregation window.
pub const BUCKET_DURATION: Duration = Duration::from_secs(10);

/// How often the worker checks for elapsed windows. Independent of the
/// window width so a window is flushed shortly after it elapses.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Truncate a nanosecond timestamp down to the start of its window.
///
/// Every open-window key is produced by this function, so keys are always
/// exact multiples of the bucket duration.
pub fn align_timestamp(ns: u64, bucket_ns: u64) -> u64 {
    ns - (ns % bucket_ns)
}

/// A window is flushable once its end lies strictly in the past. The
/// currently active window never satisfies this.
pub fn has_elapsed(start: u64, bucket_ns: u64, now_ns: u64) -> bool {
    start + bucket_ns < now_ns
}

/// Current wall-clock time in nanoseconds since epoch.
pub fn now_ns() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .map(|ns| ns as u64)
        .unwrap_or(0)
}
