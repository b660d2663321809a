//! ---
//! fops_section: "11-simulation"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Timer-free simulation driven by a virtual clock."
//! fops_version: "v0.1.0"
//! fops_owner: "tbd"
//! ---
use std::time::Duration;

use chrono::{DateTime, Utc};
use fops_common::SimulationProfile;
use rand::rngs::StdRng;
use strum::IntoEnumIterator;
use tracing::warn;

use crate::cycles::{cycle_rng, run_tick, CycleKind};
use crate::equipment::EquipmentRecord;
use crate::error::Result;
use crate::events::SimulationEvent;
use crate::scheduler::EffectiveSchedule;
use crate::store::EquipmentStateStore;

struct VirtualCycle {
    kind: CycleKind,
    next_due: Duration,
    period: Duration,
    rng: StdRng,
}

/// Runs the same tick bodies as the scheduler, interleaved on a virtual
/// clock so a whole session can be generated instantly and reproducibly.
pub struct OfflineSimulation {
    profile: SimulationProfile,
    store: EquipmentStateStore,
    start: DateTime<Utc>,
    cycles: Vec<VirtualCycle>,
}

impl OfflineSimulation {
    pub fn new(
        profile: SimulationProfile,
        records: Vec<EquipmentRecord>,
        start: DateTime<Utc>,
    ) -> Result<Self> {
        profile.validate()?;
        let schedule = EffectiveSchedule::new(&profile, profile.speed_multiplier);
        let mut seeding_rng = cycle_rng(profile.random_seed, 0);
        let store = EquipmentStateStore::seed(records, &profile.sensors, &mut seeding_rng, start);
        let cycles = CycleKind::iter()
            .map(|kind| VirtualCycle {
                kind,
                next_due: schedule.initial_delay(kind),
                period: schedule.period(kind),
                rng: cycle_rng(profile.random_seed, kind.seed_offset()),
            })
            .collect();
        Ok(Self {
            profile,
            store,
            start,
            cycles,
        })
    }

    pub fn store(&self) -> &EquipmentStateStore {
        &self.store
    }

    /// Advance until `sensor_ticks` sensor ticks have run, returning every
    /// event in virtual-time order. Ties go to the sensor cycle first.
    pub fn run(&mut self, sensor_ticks: usize) -> Vec<SimulationEvent> {
        let mut events = Vec::new();
        let mut completed = 0;
        while completed < sensor_ticks {
            let Some(cycle) = self.cycles.iter_mut().min_by_key(|cycle| cycle.next_due) else {
                break;
            };
            let Some(now) = virtual_time(self.start, cycle.next_due) else {
                warn!(
                    cycle = %cycle.kind,
                    offset_secs = cycle.next_due.as_secs(),
                    "virtual clock out of range; session truncated"
                );
                break;
            };
            let output = run_tick(cycle.kind, &self.store, &self.profile, &mut cycle.rng, now);
            for failure in &output.failures {
                warn!(cycle = %cycle.kind, error = %failure, "equipment skipped for this tick");
            }
            events.extend(output.events);
            if cycle.kind == CycleKind::Sensor {
                completed += 1;
            }
            cycle.next_due += cycle.period;
        }
        events
    }
}

/// Wall-clock time `offset` after `start`, at full nanosecond precision.
fn virtual_time(start: DateTime<Utc>, offset: Duration) -> Option<DateTime<Utc>> {
    let offset = chrono::Duration::from_std(offset).ok()?;
    start.checked_add_signed(offset)
}
