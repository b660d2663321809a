//! ---
//! fops_section: "11-simulation"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Synthetic factory telemetry engine."
//! fops_version: "v0.1.0"
//! fops_owner: "tbd"
//! ---
//! Keeps a simulated state per equipment unit and advances it on three
//! independent cycles: sensor readings (with probabilistic alarms), status
//! transitions and production batches. Events are fanned out to any number
//! of subscribers through [`EventBus`].

pub mod alarm;
pub mod bus;
pub mod cycles;
pub mod directory;
pub mod equipment;
pub mod error;
pub mod events;
pub mod offline;
pub mod production;
pub mod scheduler;
pub mod sensor;
pub mod store;
pub mod transitions;

pub use bus::EventBus;
pub use cycles::{CycleKind, TickOutput};
pub use directory::{EquipmentDirectory, FileDirectory, StaticDirectory};
pub use equipment::{EquipmentId, EquipmentRecord, EquipmentSimulationState};
pub use error::{DirectoryError, SimError};
pub use events::{
    AlarmRaised, AlarmSeverity, EventKind, ProductionBatch, SensorReading, SimulationEvent,
    StatusChanged,
};
pub use offline::OfflineSimulation;
pub use scheduler::{EffectiveSchedule, SchedulerState, SimulationScheduler};
pub use store::EquipmentStateStore;
