//! ---
//! fops_section: "11-simulation"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Single-tick bodies of the sensor, status and production cycles."
//! fops_version: "v0.1.0"
//! fops_owner: "tbd"
//! ---
//! Tick functions are synchronous and take their clock and randomness as
//! arguments, so the scheduler and the offline generator share them.

use chrono::{DateTime, Utc};
use fops_common::SimulationProfile;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strum::{Display, EnumIter, IntoStaticStr};

use crate::alarm::evaluate_alarm;
use crate::error::SimError;
use crate::events::{SensorReading, SimulationEvent, StatusChanged};
use crate::production::generate_batch;
use crate::sensor::{generate_sensor_value, AnomalySettings};
use crate::store::EquipmentStateStore;
use crate::transitions::next_status;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum CycleKind {
    Sensor,
    Status,
    Production,
}

impl CycleKind {
    pub fn label(&self) -> &'static str {
        self.into()
    }

    /// Offset mixed into the profile seed so each cycle draws its own stream.
    pub(crate) fn seed_offset(&self) -> u64 {
        match self {
            Self::Sensor => 1,
            Self::Status => 2,
            Self::Production => 3,
        }
    }
}

/// Randomness for one stream: `seed + stream` when seeded, entropy otherwise.
pub fn cycle_rng(seed: Option<u64>, stream: u64) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
        None => StdRng::from_entropy(),
    }
}

/// Everything one tick produced.
#[derive(Debug, Default)]
pub struct TickOutput {
    /// Events in emission order.
    pub events: Vec<SimulationEvent>,
    /// Per-equipment failures. The affected units were skipped.
    pub failures: Vec<SimError>,
    /// Units the tick acted on.
    pub processed: usize,
    /// Units the tick left untouched, e.g. offline or idle.
    pub skipped: usize,
}

impl TickOutput {
    fn record<T, F>(&mut self, outcome: Result<Option<T>, SimError>, mut emit: F)
    where
        F: FnMut(&mut Vec<SimulationEvent>, T),
    {
        match outcome {
            Ok(Some(value)) => {
                self.processed += 1;
                emit(&mut self.events, value);
            }
            Ok(None) => self.skipped += 1,
            Err(err) => self.failures.push(err),
        }
    }
}

pub fn run_tick<R: Rng + ?Sized>(
    kind: CycleKind,
    store: &EquipmentStateStore,
    profile: &SimulationProfile,
    rng: &mut R,
    now: DateTime<Utc>,
) -> TickOutput {
    match kind {
        CycleKind::Sensor => sensor_tick(store, profile, rng, now),
        CycleKind::Status => status_tick(store, profile, rng, now),
        CycleKind::Production => production_tick(store, rng, now),
    }
}

/// One reading per configured sensor for every non-offline unit, each
/// followed by its alarm when one is raised.
pub fn sensor_tick<R: Rng + ?Sized>(
    store: &EquipmentStateStore,
    profile: &SimulationProfile,
    rng: &mut R,
    now: DateTime<Utc>,
) -> TickOutput {
    let settings = AnomalySettings::from(profile);
    let mut output = TickOutput::default();
    for id in store.ids() {
        let outcome = store.update(id, |state| {
            if state.current_status.is_offline() {
                return None;
            }
            let readings: Vec<SensorReading> = profile
                .sensors
                .iter()
                .map(|sensor| {
                    let generated = generate_sensor_value(state, sensor, settings, rng);
                    SensorReading {
                        equipment_id: state.equipment_id.clone(),
                        sensor_type: sensor.name.clone(),
                        value: generated.value,
                        unit: sensor.unit.clone(),
                        timestamp: now,
                        is_anomaly: generated.is_anomaly,
                    }
                })
                .collect();
            Some(readings)
        });
        output.record(outcome, |events, readings| {
            for (reading, sensor) in readings.into_iter().zip(&profile.sensors) {
                let alarm = evaluate_alarm(&reading, sensor, rng);
                events.push(reading.into());
                if let Some(alarm) = alarm {
                    events.push(alarm.into());
                }
            }
        });
    }
    output
}

/// Sample a successor status per unit and emit a change when it differs.
pub fn status_tick<R: Rng + ?Sized>(
    store: &EquipmentStateStore,
    profile: &SimulationProfile,
    rng: &mut R,
    now: DateTime<Utc>,
) -> TickOutput {
    let mut output = TickOutput::default();
    for id in store.ids() {
        let outcome = store.update(id, |state| {
            let next = next_status(&profile.transitions, state.current_status, rng)?;
            if next == state.current_status {
                return None;
            }
            let previous_status = state.current_status;
            state.current_status = next;
            state.last_status_change = now;
            Some(StatusChanged {
                equipment_id: state.equipment_id.clone(),
                previous_status,
                new_status: next,
                timestamp: now,
            })
        });
        output.record(outcome, |events, change| events.push(change.into()));
    }
    output
}

/// One production batch for every running unit.
pub fn production_tick<R: Rng + ?Sized>(
    store: &EquipmentStateStore,
    rng: &mut R,
    now: DateTime<Utc>,
) -> TickOutput {
    let mut output = TickOutput::default();
    for id in store.ids() {
        let outcome = store.update(id, |state| generate_batch(state, rng, now));
        output.record(outcome, |events, batch| events.push(batch.into()));
    }
    output
}
