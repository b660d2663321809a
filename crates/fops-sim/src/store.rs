//! ---
//! fops_section: "11-simulation"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Keyed store of equipment simulation state."
//! fops_version: "v0.1.0"
//! fops_owner: "tbd"
//! ---
//! The key set is fixed once seeded. Each entry sits behind its own lock so
//! the sensor, status and production cycles only contend when they touch the
//! same unit at the same moment, and a read-modify-write through
//! [`EquipmentStateStore::update`] is never interleaved with another cycle.

use chrono::{DateTime, Utc};
use fops_common::SensorTypeConfig;
use indexmap::IndexMap;
use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, warn};

use crate::equipment::{EquipmentId, EquipmentRecord, EquipmentSimulationState};
use crate::error::{Result, SimError};

#[derive(Debug, Default)]
pub struct EquipmentStateStore {
    entries: IndexMap<EquipmentId, Mutex<EquipmentSimulationState>>,
}

impl EquipmentStateStore {
    /// Build a store holding one fresh state per active record.
    ///
    /// Inactive records are skipped. A repeated id keeps its first record.
    pub fn seed<R: Rng + ?Sized>(
        records: impl IntoIterator<Item = EquipmentRecord>,
        sensors: &[SensorTypeConfig],
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Self {
        let mut entries = IndexMap::new();
        for record in records {
            if !record.active {
                debug!(equipment = %record.id, "skipping inactive equipment");
                continue;
            }
            if entries.contains_key(&record.id) {
                warn!(equipment = %record.id, "duplicate equipment record ignored");
                continue;
            }
            let state = EquipmentSimulationState::seeded(&record, sensors, rng, now);
            entries.insert(record.id, Mutex::new(state));
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tracked ids in seeding order.
    pub fn ids(&self) -> impl Iterator<Item = &EquipmentId> {
        self.entries.keys()
    }

    /// Snapshot copy of one unit's state.
    pub fn get(&self, id: &EquipmentId) -> Option<EquipmentSimulationState> {
        self.entries.get(id).map(|entry| entry.lock().clone())
    }

    /// Replace the state of a tracked unit.
    pub fn set(&self, id: &EquipmentId, state: EquipmentSimulationState) -> Result<()> {
        if &state.equipment_id != id {
            return Err(SimError::IdentityMismatch {
                expected: id.clone(),
                actual: state.equipment_id,
            });
        }
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| SimError::UnknownEquipment(id.clone()))?;
        *entry.lock() = state;
        Ok(())
    }

    /// Run `f` against the live state of `id` while holding that unit's lock.
    pub fn update<T, F>(&self, id: &EquipmentId, f: F) -> Result<T>
    where
        F: FnOnce(&mut EquipmentSimulationState) -> T,
    {
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| SimError::UnknownEquipment(id.clone()))?;
        let mut state = entry.lock();
        Ok(f(&mut state))
    }

    pub fn snapshot(&self) -> Vec<EquipmentSimulationState> {
        self.entries
            .values()
            .map(|entry| entry.lock().clone())
            .collect()
    }
}
