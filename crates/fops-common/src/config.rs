//! ---
//! fops_section: "01-core-functionality"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Shared primitives and utilities for the simulator runtime."
//! fops_version: "v0.0.0-prealpha"
//! fops_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use thiserror::Error;
use tracing::debug;

use crate::logging::LogFormat;
use crate::status::EquipmentStatus;
use crate::time::scale_duration;

/// Tolerance applied when checking that a transition row sums to one.
pub const ROW_SUM_TOLERANCE: f64 = 1e-6;

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_log_console() -> bool {
    true
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9464))
}

fn default_equipment_path() -> PathBuf {
    PathBuf::from("configs/equipment.csv")
}

fn default_realistic_mode() -> bool {
    true
}

fn default_anomaly_probability() -> f64 {
    0.05
}

fn default_speed_multiplier() -> f64 {
    1.0
}

fn default_event_capacity() -> usize {
    1024
}

fn default_sensor_interval() -> Duration {
    Duration::from_millis(5_000)
}

fn default_status_interval() -> Duration {
    Duration::from_millis(30_000)
}

fn default_production_interval() -> Duration {
    Duration::from_millis(60_000)
}

fn default_status_delay() -> Duration {
    Duration::from_millis(1_000)
}

fn default_production_delay() -> Duration {
    Duration::from_millis(2_000)
}

/// Primary configuration object for the simulator daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub equipment: EquipmentSourceConfig,
    #[serde(default)]
    pub simulation: SimulationProfile,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "FOPS_CONFIG";

    /// Load configuration from disk, respecting the `FOPS_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.simulation.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Mirror log events to stdout. The rolling file is always written.
    #[serde(default = "default_log_console")]
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            console: default_log_console(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
        }
    }
}

/// Location of the equipment directory consulted on every simulation start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentSourceConfig {
    #[serde(default = "default_equipment_path")]
    pub path: PathBuf,
}

impl Default for EquipmentSourceConfig {
    fn default() -> Self {
        Self {
            path: default_equipment_path(),
        }
    }
}

/// Static description of one simulated sensor channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorTypeConfig {
    pub name: String,
    pub base_value: f64,
    pub normal_variation: f64,
    pub anomaly_variation: f64,
    pub warning_threshold: f64,
    pub error_threshold: f64,
    pub min_value: f64,
    pub max_value: f64,
    #[serde(default)]
    pub unit: String,
}

impl SensorTypeConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        base_value: f64,
        normal_variation: f64,
        anomaly_variation: f64,
        warning_threshold: f64,
        error_threshold: f64,
        min_value: f64,
        max_value: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_value,
            normal_variation,
            anomaly_variation,
            warning_threshold,
            error_threshold,
            min_value,
            max_value,
            unit: unit.into(),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ProfileError> {
        let fields = [
            ("base_value", self.base_value),
            ("normal_variation", self.normal_variation),
            ("anomaly_variation", self.anomaly_variation),
            ("warning_threshold", self.warning_threshold),
            ("error_threshold", self.error_threshold),
            ("min_value", self.min_value),
            ("max_value", self.max_value),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(ProfileError::NonFiniteSensorField {
                    sensor: self.name.clone(),
                    field,
                });
            }
        }
        if self.normal_variation < 0.0 || self.anomaly_variation < 0.0 {
            return Err(ProfileError::NegativeVariation {
                sensor: self.name.clone(),
            });
        }
        if !(self.min_value <= self.base_value && self.base_value <= self.max_value) {
            return Err(ProfileError::BaseOutOfRange {
                sensor: self.name.clone(),
                base: self.base_value,
                min: self.min_value,
                max: self.max_value,
            });
        }
        if self.warning_threshold >= self.error_threshold {
            return Err(ProfileError::ThresholdOrder {
                sensor: self.name.clone(),
                warning: self.warning_threshold,
                error: self.error_threshold,
            });
        }
        Ok(())
    }
}

/// Probability distribution over next statuses for a single source status.
pub type TransitionRow = IndexMap<EquipmentStatus, f64>;

/// Markov table keyed by the current status. Rows keep their declared order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusTransitionTable(IndexMap<EquipmentStatus, TransitionRow>);

impl StatusTransitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion of a row, replacing any existing row for `from`.
    pub fn with_row<I>(mut self, from: EquipmentStatus, row: I) -> Self
    where
        I: IntoIterator<Item = (EquipmentStatus, f64)>,
    {
        self.insert(from, row.into_iter().collect());
        self
    }

    pub fn insert(&mut self, from: EquipmentStatus, row: TransitionRow) {
        self.0.insert(from, row);
    }

    /// Row for `from`, or `None` when the status never transitions.
    pub fn row(&self, from: EquipmentStatus) -> Option<&TransitionRow> {
        self.0.get(&from)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn validate(&self) -> std::result::Result<(), ProfileError> {
        for (from, row) in &self.0 {
            if row.is_empty() {
                return Err(ProfileError::EmptyTransitionRow(*from));
            }
            let mut sum = 0.0;
            for (to, probability) in row {
                if !probability.is_finite() || !(0.0..=1.0).contains(probability) {
                    return Err(ProfileError::ProbabilityOutOfRange {
                        from: *from,
                        to: *to,
                        probability: *probability,
                    });
                }
                sum += probability;
            }
            if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
                return Err(ProfileError::RowSum { from: *from, sum });
            }
        }
        Ok(())
    }
}

/// Configured period of each simulation cycle.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleIntervals {
    #[serde(rename = "sensor_ms", default = "default_sensor_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub sensor: Duration,
    #[serde(rename = "status_ms", default = "default_status_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub status: Duration,
    #[serde(rename = "production_ms", default = "default_production_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub production: Duration,
}

impl CycleIntervals {
    /// Divide every interval by `speed_multiplier`.
    pub fn scaled(&self, speed_multiplier: f64) -> Self {
        Self {
            sensor: scale_duration(self.sensor, speed_multiplier),
            status: scale_duration(self.status, speed_multiplier),
            production: scale_duration(self.production, speed_multiplier),
        }
    }
}

impl Default for CycleIntervals {
    fn default() -> Self {
        Self {
            sensor: default_sensor_interval(),
            status: default_status_interval(),
            production: default_production_interval(),
        }
    }
}

/// Offset applied before each cycle's first tick.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleDelays {
    #[serde(rename = "sensor_ms", default)]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub sensor: Duration,
    #[serde(rename = "status_ms", default = "default_status_delay")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub status: Duration,
    #[serde(rename = "production_ms", default = "default_production_delay")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub production: Duration,
}

impl CycleDelays {
    pub fn none() -> Self {
        Self {
            sensor: Duration::ZERO,
            status: Duration::ZERO,
            production: Duration::ZERO,
        }
    }

    pub fn scaled(&self, speed_multiplier: f64) -> Self {
        let scale = |delay: Duration| {
            if delay.is_zero() {
                delay
            } else {
                scale_duration(delay, speed_multiplier)
            }
        };
        Self {
            sensor: scale(self.sensor),
            status: scale(self.status),
            production: scale(self.production),
        }
    }
}

impl Default for CycleDelays {
    fn default() -> Self {
        Self {
            sensor: Duration::ZERO,
            status: default_status_delay(),
            production: default_production_delay(),
        }
    }
}

/// Everything the simulation engine needs to generate telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationProfile {
    #[serde(default = "default_realistic_mode")]
    pub realistic_mode: bool,
    #[serde(default = "default_anomaly_probability")]
    pub anomaly_probability: f64,
    #[serde(default = "default_speed_multiplier")]
    pub speed_multiplier: f64,
    #[serde(default)]
    pub random_seed: Option<u64>,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub intervals: CycleIntervals,
    #[serde(default)]
    pub initial_delays: CycleDelays,
    #[serde(default = "default_sensors")]
    pub sensors: Vec<SensorTypeConfig>,
    #[serde(default = "default_transitions")]
    pub transitions: StatusTransitionTable,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            realistic_mode: default_realistic_mode(),
            anomaly_probability: default_anomaly_probability(),
            speed_multiplier: default_speed_multiplier(),
            random_seed: None,
            event_capacity: default_event_capacity(),
            intervals: CycleIntervals::default(),
            initial_delays: CycleDelays::default(),
            sensors: default_sensors(),
            transitions: default_transitions(),
        }
    }
}

impl SimulationProfile {
    /// Validate every structural invariant of the profile.
    pub fn validate(&self) -> std::result::Result<(), ProfileError> {
        if self.sensors.is_empty() {
            return Err(ProfileError::NoSensors);
        }
        let mut seen = HashSet::new();
        for sensor in &self.sensors {
            if !seen.insert(sensor.name.as_str()) {
                return Err(ProfileError::DuplicateSensor(sensor.name.clone()));
            }
            sensor.validate()?;
        }
        self.transitions.validate()?;
        if !(0.0..=1.0).contains(&self.anomaly_probability) {
            return Err(ProfileError::AnomalyProbability(self.anomaly_probability));
        }
        if !(self.speed_multiplier.is_finite() && self.speed_multiplier > 0.0) {
            return Err(ProfileError::SpeedMultiplier(self.speed_multiplier));
        }
        for (cycle, interval) in [
            ("sensor", self.intervals.sensor),
            ("status", self.intervals.status),
            ("production", self.intervals.production),
        ] {
            if interval.is_zero() {
                return Err(ProfileError::ZeroInterval(cycle));
            }
        }
        if self.event_capacity == 0 {
            return Err(ProfileError::EventCapacity);
        }
        Ok(())
    }
}

/// Structural problems detected while validating a [`SimulationProfile`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    #[error("simulation profile must declare at least one sensor type")]
    NoSensors,
    #[error("sensor type '{0}' declared more than once")]
    DuplicateSensor(String),
    #[error("sensor '{sensor}' has a non-finite {field}")]
    NonFiniteSensorField { sensor: String, field: &'static str },
    #[error("sensor '{sensor}' variations must not be negative")]
    NegativeVariation { sensor: String },
    #[error("sensor '{sensor}' base value {base} outside [{min}, {max}]")]
    BaseOutOfRange {
        sensor: String,
        base: f64,
        min: f64,
        max: f64,
    },
    #[error("sensor '{sensor}' warning threshold {warning} must be below error threshold {error}")]
    ThresholdOrder {
        sensor: String,
        warning: f64,
        error: f64,
    },
    #[error("transition row for {0} is empty")]
    EmptyTransitionRow(EquipmentStatus),
    #[error("transition {from} -> {to} has probability {probability} outside [0, 1]")]
    ProbabilityOutOfRange {
        from: EquipmentStatus,
        to: EquipmentStatus,
        probability: f64,
    },
    #[error("transition row for {from} sums to {sum}, expected 1")]
    RowSum { from: EquipmentStatus, sum: f64 },
    #[error("anomaly probability {0} outside [0, 1]")]
    AnomalyProbability(f64),
    #[error("speed multiplier must be a positive finite number, got {0}")]
    SpeedMultiplier(f64),
    #[error("{0} interval must be greater than zero")]
    ZeroInterval(&'static str),
    #[error("event channel capacity must be greater than zero")]
    EventCapacity,
}

fn default_sensors() -> Vec<SensorTypeConfig> {
    vec![
        SensorTypeConfig::new("temperature", 65.0, 5.0, 25.0, 80.0, 95.0, 0.0, 150.0, "°C"),
        SensorTypeConfig::new("vibration", 2.5, 0.5, 4.0, 5.0, 8.0, 0.0, 20.0, "mm/s"),
        SensorTypeConfig::new("pressure", 6.0, 0.4, 3.0, 8.0, 9.5, 0.0, 12.0, "bar"),
        SensorTypeConfig::new("power", 45.0, 5.0, 30.0, 70.0, 85.0, 0.0, 120.0, "kW"),
    ]
}

fn default_transitions() -> StatusTransitionTable {
    use EquipmentStatus::*;
    StatusTransitionTable::new()
        .with_row(
            Running,
            [(Running, 0.92), (Idle, 0.04), (Warning, 0.03), (Error, 0.01)],
        )
        .with_row(
            Idle,
            [(Idle, 0.80), (Running, 0.15), (Setup, 0.03), (Maintenance, 0.02)],
        )
        .with_row(
            Warning,
            [(Warning, 0.50), (Running, 0.35), (Error, 0.10), (Maintenance, 0.05)],
        )
        .with_row(Error, [(Error, 0.60), (Maintenance, 0.30), (Idle, 0.10)])
        .with_row(
            Maintenance,
            [(Maintenance, 0.80), (Idle, 0.15), (Setup, 0.05)],
        )
        .with_row(Setup, [(Setup, 0.60), (Running, 0.35), (Idle, 0.05)])
}
