//! ---
//! fops_section: "01-core-functionality"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Shared primitives and utilities for the simulator runtime."
//! fops_version: "v0.0.0-prealpha"
//! fops_owner: "tbd"
//! ---
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Running jitter statistics in constant space (Welford's online variance).
#[derive(Debug, Default, Clone, Copy)]
pub struct JitterStats {
    count: u64,
    mean_ns: f64,
    m2: f64,
    min_ns: f64,
    max_ns: f64,
}

impl JitterStats {
    pub fn record(&mut self, jitter: Duration) {
        let nanos = jitter.as_nanos() as f64;
        if self.count == 0 {
            self.min_ns = nanos;
            self.max_ns = nanos;
        } else {
            self.min_ns = self.min_ns.min(nanos);
            self.max_ns = self.max_ns.max(nanos);
        }
        self.count += 1;
        let delta = nanos - self.mean_ns;
        self.mean_ns += delta / self.count as f64;
        self.m2 += delta * (nanos - self.mean_ns);
    }

    pub fn summary(&self) -> Option<JitterSummary> {
        if self.count == 0 {
            return None;
        }
        let variance = if self.count > 1 {
            self.m2 / (self.count - 1) as f64
        } else {
            0.0
        };
        Some(JitterSummary {
            mean_ns: self.mean_ns,
            std_dev_ns: variance.sqrt(),
            max_ns: self.max_ns,
            min_ns: self.min_ns,
            samples: self.count,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JitterSummary {
    pub mean_ns: f64,
    pub std_dev_ns: f64,
    pub max_ns: f64,
    pub min_ns: f64,
    pub samples: u64,
}

#[derive(Debug, Default)]
struct TimingState {
    first_tick: Option<Instant>,
    last_tick: Option<Instant>,
    ticks: u64,
    jitter: JitterStats,
}

/// Measures the observed period of a periodic cycle against its target.
#[derive(Debug)]
pub struct CycleTimingReporter {
    target_interval: Duration,
    state: Mutex<TimingState>,
}

impl CycleTimingReporter {
    pub fn new(target_interval: Duration) -> Self {
        Self {
            target_interval,
            state: Mutex::new(TimingState::default()),
        }
    }

    pub fn target_interval(&self) -> Duration {
        self.target_interval
    }

    /// Record a tick observed at `now` and return its jitter against the
    /// target period. The first tick has nothing to compare with.
    /// Ticks must be supplied in order.
    pub fn record_tick_at(&self, now: Instant) -> Option<Duration> {
        let mut state = self.state.lock();
        let jitter = state.last_tick.map(|previous| {
            let actual = now.saturating_duration_since(previous);
            actual.abs_diff(self.target_interval)
        });
        if let Some(jitter) = jitter {
            state.jitter.record(jitter);
        }
        if state.first_tick.is_none() {
            state.first_tick = Some(now);
        }
        state.last_tick = Some(now);
        state.ticks += 1;
        jitter
    }

    pub fn ticks(&self) -> u64 {
        self.state.lock().ticks
    }

    /// Average period between recorded ticks, once at least two were seen.
    pub fn mean_period(&self) -> Option<Duration> {
        let state = self.state.lock();
        match (state.first_tick, state.last_tick) {
            (Some(first), Some(last)) if state.ticks > 1 => {
                let span = last.saturating_duration_since(first);
                let gaps = u32::try_from(state.ticks - 1).unwrap_or(u32::MAX);
                Some(span / gaps)
            }
            _ => None,
        }
    }

    pub fn jitter(&self) -> Option<JitterSummary> {
        self.state.lock().jitter.summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_period_requires_two_ticks() {
        let reporter = CycleTimingReporter::new(Duration::from_millis(100));
        assert!(reporter.mean_period().is_none());
        assert_eq!(reporter.record_tick_at(Instant::now()), None);
        assert!(reporter.mean_period().is_none());
        assert!(reporter.jitter().is_none());
    }

    #[test]
    fn mean_period_averages_spacing() {
        let reporter = CycleTimingReporter::new(Duration::from_millis(100));
        let start = Instant::now();
        for step in 0..5u64 {
            reporter.record_tick_at(start + Duration::from_millis(100 * step));
        }
        assert_eq!(reporter.ticks(), 5);
        assert_eq!(reporter.mean_period(), Some(Duration::from_millis(100)));
        let summary = reporter.jitter().expect("jitter recorded");
        assert_eq!(summary.samples, 4);
        assert!(summary.max_ns < 1.0);
    }

    #[test]
    fn jitter_reports_deviation_both_ways() {
        let reporter = CycleTimingReporter::new(Duration::from_millis(100));
        let start = Instant::now();
        reporter.record_tick_at(start);
        let late = reporter.record_tick_at(start + Duration::from_millis(110));
        let early = reporter.record_tick_at(start + Duration::from_millis(200));
        assert_eq!(late, Some(Duration::from_millis(10)));
        assert_eq!(early, Some(Duration::from_millis(10)));

        let summary = reporter.jitter().expect("jitter recorded");
        assert_eq!(summary.samples, 2);
        assert!((summary.mean_ns - 10_000_000.0).abs() < 1e-3);
        assert!(summary.std_dev_ns.abs() < 1e-3);
    }

    #[test]
    fn long_runs_keep_constant_state() {
        let reporter = CycleTimingReporter::new(Duration::from_millis(50));
        let start = Instant::now();
        for step in 0..200_000u64 {
            let wobble = Duration::from_micros(step % 7);
            reporter.record_tick_at(start + Duration::from_millis(50 * step) + wobble);
        }
        assert_eq!(std::mem::size_of::<JitterStats>(), 40);
        let summary = reporter.jitter().expect("jitter recorded");
        assert_eq!(summary.samples, 199_999);
        assert!(summary.min_ns >= 0.0);
        assert!(summary.max_ns <= 6_000.0);
        assert!(summary.mean_ns > 0.0 && summary.mean_ns < summary.max_ns);
    }
}
