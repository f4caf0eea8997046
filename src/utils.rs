use std::time::{Duration, Instant};

/// Format a `Duration` for log fields, e.g. `1.94ms` or `2.34s`.
pub fn fmt_duration(d: Duration) -> String {
    format!("{d:.2?}")
}

/// Warn when a portal request that began at `start` took longer than `threshold`.
pub fn log_if_slow(start: Instant, threshold: Duration, endpoint: &str) {
    let elapsed = start.elapsed();
    if elapsed > threshold {
        tracing::warn!(
            endpoint,
            duration = fmt_duration(elapsed),
            "Slow portal request"
        );
    }
}
