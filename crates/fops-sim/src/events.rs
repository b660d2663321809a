//! ---
//! fops_section: "11-simulation"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Telemetry events emitted by the simulation cycles."
//! fops_version: "v0.1.0"
//! fops_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use fops_common::EquipmentStatus;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::equipment::EquipmentId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub equipment_id: EquipmentId,
    pub sensor_type: String,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    /// Set when `value` reached the sensor's warning threshold.
    pub is_anomaly: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub equipment_id: EquipmentId,
    pub previous_status: EquipmentStatus,
    pub new_status: EquipmentStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum AlarmSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRaised {
    pub equipment_id: EquipmentId,
    /// `<SENSOR>_HIGH` for error-tier values, `<SENSOR>_WARN` otherwise.
    pub code: String,
    pub severity: AlarmSeverity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionBatch {
    pub equipment_id: EquipmentId,
    pub units_produced: u32,
    pub defect_count: u32,
    pub timestamp: DateTime<Utc>,
}

/// Discriminant of [`SimulationEvent`], used for metric labels and output routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    SensorReading,
    StatusChanged,
    AlarmRaised,
    ProductionBatch,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Any event the engine publishes, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimulationEvent {
    SensorReading(SensorReading),
    StatusChanged(StatusChanged),
    AlarmRaised(AlarmRaised),
    ProductionBatch(ProductionBatch),
}

impl SimulationEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::SensorReading(_) => EventKind::SensorReading,
            Self::StatusChanged(_) => EventKind::StatusChanged,
            Self::AlarmRaised(_) => EventKind::AlarmRaised,
            Self::ProductionBatch(_) => EventKind::ProductionBatch,
        }
    }

    pub fn equipment_id(&self) -> &EquipmentId {
        match self {
            Self::SensorReading(event) => &event.equipment_id,
            Self::StatusChanged(event) => &event.equipment_id,
            Self::AlarmRaised(event) => &event.equipment_id,
            Self::ProductionBatch(event) => &event.equipment_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::SensorReading(event) => event.timestamp,
            Self::StatusChanged(event) => event.timestamp,
            Self::AlarmRaised(event) => event.timestamp,
            Self::ProductionBatch(event) => event.timestamp,
        }
    }
}

impl From<SensorReading> for SimulationEvent {
    fn from(event: SensorReading) -> Self {
        Self::SensorReading(event)
    }
}

impl From<StatusChanged> for SimulationEvent {
    fn from(event: StatusChanged) -> Self {
        Self::StatusChanged(event)
    }
}

impl From<AlarmRaised> for SimulationEvent {
    fn from(event: AlarmRaised) -> Self {
        Self::AlarmRaised(event)
    }
}

impl From<ProductionBatch> for SimulationEvent {
    fn from(event: ProductionBatch) -> Self {
        Self::ProductionBatch(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_labels_are_snake_case() {
        assert_eq!(EventKind::SensorReading.as_str(), "sensor_reading");
        assert_eq!(EventKind::ProductionBatch.to_string(), "production_batch");
    }

    #[test]
    fn tagged_json_carries_kind() {
        let event = SimulationEvent::from(ProductionBatch {
            equipment_id: EquipmentId::new("eq-1"),
            units_produced: 12,
            defect_count: 1,
            timestamp: Utc::now(),
        });
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["kind"], "production_batch");
        assert_eq!(json["equipment_id"], "eq-1");
        assert_eq!(event.kind(), EventKind::ProductionBatch);
        assert_eq!(event.equipment_id().as_str(), "eq-1");
    }
}
