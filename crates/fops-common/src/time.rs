//! ---
//! fops_section: "01-core-functionality"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Shared primitives and utilities for the simulator runtime."
//! fops_version: "v0.0.0-prealpha"
//! fops_owner: "tbd"
//! ---
use std::time::Duration;

/// Shortest period handed to a timer; tokio rejects zero-length intervals.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Divide `period` by `speed_multiplier`, never returning less than [`MIN_PERIOD`].
pub fn scale_duration(period: Duration, speed_multiplier: f64) -> Duration {
    if !(speed_multiplier.is_finite() && speed_multiplier > 0.0) {
        return period.max(MIN_PERIOD);
    }
    let nanos = (period.as_nanos() as f64 / speed_multiplier).round();
    Duration::from_nanos(nanos as u64).max(MIN_PERIOD)
}

/// Convert a duration into microseconds, saturating at `u64::MAX`.
pub fn duration_to_micros(duration: Duration) -> u64 {
    duration
        .as_secs()
        .saturating_mul(1_000_000)
        .saturating_add(u64::from(duration.subsec_micros()))
}
