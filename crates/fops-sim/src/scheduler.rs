//! ---
//! fops_section: "11-simulation"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Lifecycle and periodic driving of the three simulation cycles."
//! fops_version: "v0.1.0"
//! fops_owner: "tbd"
//! ---
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fops_common::time::duration_to_micros;
use fops_common::{CycleDelays, CycleIntervals, CycleTimingReporter, SimulationProfile};
use fops_metrics::SimulationMetrics;
use fops_rt::{RateLimiter, TaskSet};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use strum::{Display, IntoEnumIterator};
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::cycles::{cycle_rng, run_tick, CycleKind, TickOutput};
use crate::directory::EquipmentDirectory;
use crate::equipment::EquipmentSimulationState;
use crate::error::{Result, SimError};
use crate::events::{AlarmRaised, ProductionBatch, SensorReading, SimulationEvent, StatusChanged};
use crate::store::EquipmentStateStore;

/// Stream used to seed the state store. Cycles use their own offsets.
const SEEDING_STREAM: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Periods and first-tick offsets after applying a speed multiplier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveSchedule {
    pub speed_multiplier: f64,
    pub intervals: CycleIntervals,
    pub initial_delays: CycleDelays,
}

impl EffectiveSchedule {
    pub fn new(profile: &SimulationProfile, speed_multiplier: f64) -> Self {
        Self {
            speed_multiplier,
            intervals: profile.intervals.scaled(speed_multiplier),
            initial_delays: profile.initial_delays.scaled(speed_multiplier),
        }
    }

    pub fn period(&self, kind: CycleKind) -> Duration {
        match kind {
            CycleKind::Sensor => self.intervals.sensor,
            CycleKind::Status => self.intervals.status,
            CycleKind::Production => self.intervals.production,
        }
    }

    pub fn initial_delay(&self, kind: CycleKind) -> Duration {
        match kind {
            CycleKind::Sensor => self.initial_delays.sensor,
            CycleKind::Status => self.initial_delays.status,
            CycleKind::Production => self.initial_delays.production,
        }
    }
}

#[derive(Debug)]
struct CycleTimings {
    sensor: Arc<CycleTimingReporter>,
    status: Arc<CycleTimingReporter>,
    production: Arc<CycleTimingReporter>,
}

impl CycleTimings {
    fn new(schedule: &EffectiveSchedule) -> Self {
        let reporter = |kind| Arc::new(CycleTimingReporter::new(schedule.period(kind)));
        Self {
            sensor: reporter(CycleKind::Sensor),
            status: reporter(CycleKind::Status),
            production: reporter(CycleKind::Production),
        }
    }

    fn get(&self, kind: CycleKind) -> &Arc<CycleTimingReporter> {
        match kind {
            CycleKind::Sensor => &self.sensor,
            CycleKind::Status => &self.status,
            CycleKind::Production => &self.production,
        }
    }
}

/// Resources owned by one Start..Stop span.
#[derive(Debug)]
struct ActiveRun {
    store: Arc<EquipmentStateStore>,
    shutdown: broadcast::Sender<()>,
    tasks: TaskSet,
    schedule: EffectiveSchedule,
    timings: CycleTimings,
}

/// Tick body run by a cycle task on every period.
type TickFn = fn(
    CycleKind,
    &EquipmentStateStore,
    &SimulationProfile,
    &mut StdRng,
    DateTime<Utc>,
) -> TickOutput;

/// Shared state handed to each cycle task.
struct CycleContext {
    kind: CycleKind,
    store: Arc<EquipmentStateStore>,
    profile: Arc<SimulationProfile>,
    bus: EventBus,
    metrics: Option<SimulationMetrics>,
    timing: Arc<CycleTimingReporter>,
    tick: TickFn,
}

impl CycleContext {
    fn execute_tick(&self, rng: &mut StdRng) {
        let started = Instant::now();
        let outcome = guard_tick(self.kind, || {
            (self.tick)(self.kind, &self.store, &self.profile, rng, Utc::now())
        });
        let elapsed = started.elapsed();

        let failures = match outcome {
            Some(output) => self.publish(output),
            None => 1,
        };
        if let Some(metrics) = &self.metrics {
            metrics.observe_tick(self.kind.label(), elapsed.as_secs_f64());
            if failures > 0 {
                metrics.record_tick_failures(self.kind.label(), failures);
            }
        }
    }

    fn publish(&self, output: TickOutput) -> usize {
        let TickOutput {
            events,
            failures,
            processed,
            skipped,
        } = output;
        for failure in &failures {
            warn!(cycle = %self.kind, error = %failure, "equipment skipped for this tick");
        }
        let published = events.len();
        for event in events {
            if let Some(metrics) = &self.metrics {
                metrics.record_events(event.kind().as_str(), 1);
            }
            self.bus.publish(event);
        }
        debug!(
            cycle = %self.kind,
            processed,
            skipped,
            published,
            failed = failures.len(),
            "tick complete"
        );
        failures.len()
    }
}

/// Run one tick body, turning a panic into a logged `None`.
///
/// The surrounding cycle keeps its schedule whatever the tick does.
pub fn guard_tick<F>(kind: CycleKind, tick: F) -> Option<TickOutput>
where
    F: FnOnce() -> TickOutput,
{
    match panic::catch_unwind(AssertUnwindSafe(tick)) {
        Ok(output) => Some(output),
        Err(payload) => {
            error!(cycle = %kind, panic = %panic_message(payload.as_ref()), "tick aborted");
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("non-string panic payload")
    }
}

async fn run_cycle(
    ctx: CycleContext,
    schedule: EffectiveSchedule,
    mut rng: StdRng,
    mut shutdown: broadcast::Receiver<()>,
) {
    let period = schedule.period(ctx.kind);
    let delay = schedule.initial_delay(ctx.kind);
    let mut limiter = RateLimiter::with_initial_delay(period, delay);
    debug!(
        cycle = %ctx.kind,
        period_us = duration_to_micros(period),
        initial_delay_us = duration_to_micros(delay),
        "cycle started"
    );
    loop {
        tokio::select! {
            biased;
            // A closed channel means the owning run was dropped.
            _ = shutdown.recv() => break,
            instant = limiter.tick() => {
                let jitter = ctx.timing.record_tick_at(instant.into_std());
                if let (Some(metrics), Some(jitter)) = (&ctx.metrics, jitter) {
                    metrics.observe_jitter(ctx.kind.label(), jitter.as_secs_f64());
                }
                ctx.execute_tick(&mut rng);
            }
        }
    }
    debug!(cycle = %ctx.kind, ticks = ctx.timing.ticks(), "cycle stopped");
}

/// Drives the sensor, status and production cycles against a shared
/// equipment state store and fans their events out through an [`EventBus`].
///
/// Start and Stop are serialized. Starting a running scheduler and stopping
/// a stopped one are both no-ops. Dropping a running scheduler signals its
/// cycles to stop without waiting for them; call [`SimulationScheduler::shutdown`]
/// to wait.
pub struct SimulationScheduler {
    profile: Arc<SimulationProfile>,
    directory: Arc<dyn EquipmentDirectory>,
    bus: EventBus,
    metrics: Option<SimulationMetrics>,
    speed_multiplier: Mutex<f64>,
    running: AtomicBool,
    active: AsyncMutex<Option<ActiveRun>>,
}

impl SimulationScheduler {
    pub fn new(profile: SimulationProfile, directory: Arc<dyn EquipmentDirectory>) -> Self {
        let bus = EventBus::new(profile.event_capacity);
        let speed_multiplier = Mutex::new(profile.speed_multiplier);
        Self {
            profile: Arc::new(profile),
            directory,
            bus,
            metrics: None,
            speed_multiplier,
            running: AtomicBool::new(false),
            active: AsyncMutex::new(None),
        }
    }

    pub fn with_metrics(mut self, metrics: SimulationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn profile(&self) -> &SimulationProfile {
        &self.profile
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe_sensor_readings(&self) -> broadcast::Receiver<SensorReading> {
        self.bus.subscribe_sensor_readings()
    }

    pub fn subscribe_status_changes(&self) -> broadcast::Receiver<StatusChanged> {
        self.bus.subscribe_status_changes()
    }

    pub fn subscribe_alarms(&self) -> broadcast::Receiver<AlarmRaised> {
        self.bus.subscribe_alarms()
    }

    pub fn subscribe_production(&self) -> broadcast::Receiver<ProductionBatch> {
        self.bus.subscribe_production()
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<SimulationEvent> {
        self.bus.subscribe_all()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SchedulerState {
        if self.is_running() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    pub fn speed_multiplier(&self) -> f64 {
        *self.speed_multiplier.lock()
    }

    /// Change the speed used by the next start. A running simulation keeps
    /// the periods it was started with.
    pub fn set_speed_multiplier(&self, speed_multiplier: f64) -> Result<()> {
        if !speed_multiplier.is_finite() || speed_multiplier <= 0.0 {
            return Err(SimError::InvalidSpeedMultiplier(speed_multiplier));
        }
        *self.speed_multiplier.lock() = speed_multiplier;
        if self.is_running() {
            info!(
                speed_multiplier,
                "speed multiplier updated; takes effect on next start"
            );
        }
        Ok(())
    }

    /// Schedule the next start would use.
    pub fn effective_schedule(&self) -> EffectiveSchedule {
        EffectiveSchedule::new(&self.profile, self.speed_multiplier())
    }

    /// Schedule of the current run, if any.
    pub async fn running_schedule(&self) -> Option<EffectiveSchedule> {
        self.active.lock().await.as_ref().map(|run| run.schedule)
    }

    /// Observed mean period of `kind` in the current run.
    pub async fn observed_period(&self, kind: CycleKind) -> Option<Duration> {
        self.active
            .lock()
            .await
            .as_ref()
            .and_then(|run| run.timings.get(kind).mean_period())
    }

    /// Snapshot of every tracked unit. Empty while stopped.
    pub async fn equipment_states(&self) -> Vec<EquipmentSimulationState> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|run| run.store.snapshot())
            .unwrap_or_default()
    }

    /// Seed the state store from the directory and launch the three cycles.
    ///
    /// Validation or directory failures leave the scheduler stopped.
    pub async fn start(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            warn!("simulation already running; start ignored");
            return Ok(());
        }

        self.profile.validate()?;
        let speed_multiplier = self.speed_multiplier();
        if !speed_multiplier.is_finite() || speed_multiplier <= 0.0 {
            return Err(SimError::InvalidSpeedMultiplier(speed_multiplier));
        }
        let schedule = EffectiveSchedule::new(&self.profile, speed_multiplier);

        let records = self.directory.active_equipment().await?;
        let mut seeding_rng = self.rng_for(SEEDING_STREAM);
        let store = Arc::new(EquipmentStateStore::seed(
            records,
            &self.profile.sensors,
            &mut seeding_rng,
            Utc::now(),
        ));
        if store.is_empty() {
            warn!("equipment directory returned no active equipment; cycles will idle");
        }
        if self.profile.transitions.is_empty() {
            warn!("status transition table is empty; statuses will never change");
        }

        let (shutdown, _) = broadcast::channel(1);
        let timings = CycleTimings::new(&schedule);
        let mut tasks = TaskSet::new();
        for kind in CycleKind::iter() {
            let ctx = CycleContext {
                kind,
                store: store.clone(),
                profile: self.profile.clone(),
                bus: self.bus.clone(),
                metrics: self.metrics.clone(),
                timing: timings.get(kind).clone(),
                tick: run_tick::<StdRng>,
            };
            tasks.spawn(
                format!("{kind}-cycle"),
                run_cycle(ctx, schedule, self.rng_for(kind.seed_offset()), shutdown.subscribe()),
            );
        }

        if let Some(metrics) = &self.metrics {
            metrics.set_equipment_tracked(store.len());
            metrics.set_running(true);
        }
        info!(
            equipment = store.len(),
            subscribers = self.bus.subscriber_count(),
            speed_multiplier,
            sensor_interval_ms = schedule.intervals.sensor.as_millis() as u64,
            status_interval_ms = schedule.intervals.status.as_millis() as u64,
            production_interval_ms = schedule.intervals.production.as_millis() as u64,
            "simulation started"
        );

        *active = Some(ActiveRun {
            store,
            shutdown,
            tasks,
            schedule,
            timings,
        });
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    /// Signal the cycles to stop and wait for any in-flight tick to finish.
    pub async fn stop(&self) {
        let mut active = self.active.lock().await;
        let Some(run) = active.take() else {
            debug!("stop requested while stopped");
            return;
        };
        self.running.store(false, Ordering::Release);
        let _ = run.shutdown.send(());
        let failed = run.tasks.join_all().await;
        if failed > 0 {
            error!(failed, "simulation cycles terminated abnormally");
        }
        for kind in CycleKind::iter() {
            let timing = run.timings.get(kind);
            let jitter = timing.jitter();
            debug!(
                cycle = %kind,
                ticks = timing.ticks(),
                target_us = duration_to_micros(timing.target_interval()),
                mean_period_us = timing.mean_period().map(duration_to_micros),
                jitter_mean_ns = jitter.as_ref().map(|summary| summary.mean_ns),
                jitter_max_ns = jitter.as_ref().map(|summary| summary.max_ns),
                "cycle timing"
            );
        }
        if let Some(metrics) = &self.metrics {
            metrics.set_running(false);
            metrics.set_equipment_tracked(0);
        }
        info!("simulation stopped");
    }

    /// Stop and release the scheduler.
    pub async fn shutdown(self) {
        self.stop().await;
    }

    fn rng_for(&self, stream: u64) -> StdRng {
        cycle_rng(self.profile.random_seed, stream)
    }
}

impl Drop for SimulationScheduler {
    fn drop(&mut self) {
        if let Some(run) = self.active.get_mut().take() {
            let _ = run.shutdown.send(());
            warn!("scheduler dropped while running; cycles signalled to stop");
        }
    }
}
