//! ---
//! fops_section: "01-core-functionality"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Shared primitives and utilities for the simulator runtime."
//! fops_version: "v0.0.0-prealpha"
//! fops_owner: "tbd"
//! ---
//! Core shared primitives for the FactoryOps simulator workspace.
//! This crate exposes configuration loading, the equipment status model,
//! logging, and tick timing utilities consumed across the workspace.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod status;
pub mod time;

pub use config::{
    AppConfig, CycleDelays, CycleIntervals, EquipmentSourceConfig, LoadedAppConfig, LoggingConfig,
    MetricsConfig, ProfileError, SensorTypeConfig, SimulationProfile, StatusTransitionTable,
    TransitionRow,
};
pub use logging::{init_tracing, LogFormat};
pub use metrics::{CycleTimingReporter, JitterStats, JitterSummary};
pub use status::EquipmentStatus;
