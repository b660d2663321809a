//! ---
//! fops_section: "01-core-functionality"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Runtime helpers supporting the simulation scheduler."
//! fops_version: "v0.0.0-prealpha"
//! fops_owner: "tbd"
//! ---
use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::error;

/// Async ticker with a fixed period and an optional offset before the first tick.
///
/// Late ticks are delayed rather than burst, so a slow tick never causes a
/// catch-up storm of back-to-back firings.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Interval,
}

impl RateLimiter {
    /// First tick completes immediately.
    pub fn new(period: Duration) -> Self {
        Self::with_initial_delay(period, Duration::ZERO)
    }

    pub fn with_initial_delay(period: Duration, initial_delay: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + initial_delay, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    pub async fn tick(&mut self) -> Instant {
        self.interval.tick().await
    }
}

/// Named set of spawned tasks that are awaited together on shutdown.
#[derive(Debug, Default)]
pub struct TaskSet {
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, name: impl Into<String>, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.push((name.into(), tokio::spawn(fut)));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every task to finish. Join failures are logged, never propagated.
    pub async fn join_all(self) -> usize {
        let mut failed = 0;
        for (name, task) in self.tasks {
            if let Err(err) = task.await {
                failed += 1;
                error!(task = %name, error = %err, "task join failure");
            }
        }
        failed
    }
}
