//! ---
//! fops_section: "11-simulation"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Equipment identity and per-unit simulation state."
//! fops_version: "v0.1.0"
//! fops_owner: "tbd"
//! ---
use std::f64::consts::TAU;
use std::fmt;

use chrono::{DateTime, Utc};
use fops_common::{EquipmentStatus, SensorTypeConfig};
use indexmap::IndexMap;
use rand::Rng;
use serde::{Deserialize, Serialize};

fn default_active() -> bool {
    true
}

/// Opaque equipment identifier issued by the equipment directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EquipmentId(String);

impl EquipmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EquipmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EquipmentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EquipmentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Equipment unit as reported by the equipment directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentRecord {
    pub id: EquipmentId,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub status: EquipmentStatus,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl EquipmentRecord {
    pub fn new(
        id: impl Into<EquipmentId>,
        code: impl Into<String>,
        name: impl Into<String>,
        status: EquipmentStatus,
    ) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            name: name.into(),
            status,
            active: true,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Mutable simulation state of one equipment unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquipmentSimulationState {
    pub equipment_id: EquipmentId,
    pub code: String,
    pub name: String,
    pub current_status: EquipmentStatus,
    /// Last generated value per sensor type name.
    pub sensor_values: IndexMap<String, f64>,
    pub last_status_change: DateTime<Utc>,
    /// Slow random-walk bias in `[-1, 1]`.
    pub trend_direction: f64,
    /// Phase of the cyclical component in radians. Only ever increases.
    pub cycle_phase: f64,
    pub is_in_anomaly_state: bool,
}

impl EquipmentSimulationState {
    /// Fresh state for `record`, jittering every sensor around its base value.
    pub fn seeded<R: Rng + ?Sized>(
        record: &EquipmentRecord,
        sensors: &[SensorTypeConfig],
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Self {
        let sensor_values = sensors
            .iter()
            .map(|sensor| {
                let jitter = rng.gen_range(-0.5..0.5) * sensor.normal_variation;
                let value = (sensor.base_value + jitter)
                    .max(sensor.min_value)
                    .min(sensor.max_value);
                (sensor.name.clone(), value)
            })
            .collect();
        let trend_direction = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        let cycle_phase = rng.gen_range(0.0..TAU);
        Self {
            equipment_id: record.id.clone(),
            code: record.code.clone(),
            name: record.name.clone(),
            current_status: record.status,
            sensor_values,
            last_status_change: now,
            trend_direction,
            cycle_phase,
            is_in_anomaly_state: false,
        }
    }

    pub fn sensor_value(&self, sensor: &str) -> Option<f64> {
        self.sensor_values.get(sensor).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sensors() -> Vec<SensorTypeConfig> {
        vec![
            SensorTypeConfig::new("temperature", 50.0, 10.0, 20.0, 65.0, 80.0, 0.0, 100.0, "C"),
            SensorTypeConfig::new("pressure", 6.0, 0.4, 3.0, 8.0, 9.5, 0.0, 12.0, "bar"),
        ]
    }

    #[test]
    fn seeding_jitters_within_half_variation() {
        let mut rng = StdRng::seed_from_u64(11);
        let record = EquipmentRecord::new("eq-1", "CNC-01", "Lathe", EquipmentStatus::Running);
        for _ in 0..500 {
            let state =
                EquipmentSimulationState::seeded(&record, &sensors(), &mut rng, Utc::now());
            let temperature = state.sensor_value("temperature").unwrap();
            assert!((45.0..=55.0).contains(&temperature));
            let pressure = state.sensor_value("pressure").unwrap();
            assert!((5.8..=6.2).contains(&pressure));
            assert!(state.trend_direction == 1.0 || state.trend_direction == -1.0);
            assert!((0.0..TAU).contains(&state.cycle_phase));
            assert!(!state.is_in_anomaly_state);
            assert_eq!(state.current_status, EquipmentStatus::Running);
        }
    }

    #[test]
    fn seeding_keeps_identity() {
        let mut rng = StdRng::seed_from_u64(3);
        let record = EquipmentRecord::new("eq-9", "PRS-09", "Press", EquipmentStatus::Idle);
        let state = EquipmentSimulationState::seeded(&record, &sensors(), &mut rng, Utc::now());
        assert_eq!(state.equipment_id, EquipmentId::new("eq-9"));
        assert_eq!(state.code, "PRS-09");
        assert_eq!(state.name, "Press");
        let names: Vec<_> = state.sensor_values.keys().cloned().collect();
        assert_eq!(names, vec!["temperature", "pressure"]);
    }
}
