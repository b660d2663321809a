//! ---
//! fops_section: "11-simulation"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Sensor value model: status scaling, trend, cycle, noise and anomalies."
//! fops_version: "v0.1.0"
//! fops_owner: "tbd"
//! ---
use fops_common::{EquipmentStatus, SensorTypeConfig, SimulationProfile};
use rand::Rng;

use crate::equipment::EquipmentSimulationState;

/// Fraction of the gap to the target value closed on every tick.
pub const SMOOTHING_FACTOR: f64 = 0.3;
/// Radians added to the cycle phase per generated value.
pub const CYCLE_PHASE_STEP: f64 = 0.1;
/// Half-width of the uniform trend random walk step.
pub const TREND_STEP: f64 = 0.05;
/// Amplitude of the cyclical component relative to normal variation.
pub const CYCLICAL_AMPLITUDE: f64 = 0.3;
/// Chance per tick that a unit in anomaly state returns to normal.
pub const ANOMALY_RECOVERY_PROBABILITY: f64 = 0.2;

/// Scale applied to a sensor's base value for the given status.
pub fn status_multiplier(status: EquipmentStatus) -> f64 {
    match status {
        EquipmentStatus::Running => 1.1,
        EquipmentStatus::Idle => 0.6,
        EquipmentStatus::Warning => 1.3,
        EquipmentStatus::Error => 1.5,
        EquipmentStatus::Maintenance => 0.4,
        EquipmentStatus::Setup => 0.8,
        EquipmentStatus::Offline => 0.2,
    }
}

/// Profile switches consulted when injecting anomalies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalySettings {
    pub realistic_mode: bool,
    pub anomaly_probability: f64,
}

impl From<&SimulationProfile> for AnomalySettings {
    fn from(profile: &SimulationProfile) -> Self {
        Self {
            realistic_mode: profile.realistic_mode,
            anomaly_probability: profile.anomaly_probability,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratedValue {
    pub value: f64,
    pub is_anomaly: bool,
}

/// Advance `state` by one step for `sensor` and return the new value.
///
/// Updates the trend, cycle phase, anomaly flag and stored sensor value in
/// place. The result always lies within `[min_value, max_value]`.
pub fn generate_sensor_value<R: Rng + ?Sized>(
    state: &mut EquipmentSimulationState,
    sensor: &SensorTypeConfig,
    settings: AnomalySettings,
    rng: &mut R,
) -> GeneratedValue {
    let base = sensor.base_value * status_multiplier(state.current_status);

    state.trend_direction =
        (state.trend_direction + rng.gen_range(-TREND_STEP..TREND_STEP)).clamp(-1.0, 1.0);

    state.cycle_phase += CYCLE_PHASE_STEP;
    let cyclical = state.cycle_phase.sin() * sensor.normal_variation * CYCLICAL_AMPLITUDE;

    let noise = rng.gen_range(-0.5..0.5) * sensor.normal_variation;

    let anomaly = if settings.realistic_mode && rng.gen::<f64>() < settings.anomaly_probability {
        state.is_in_anomaly_state = true;
        rng.gen_range(-0.3..0.7) * sensor.anomaly_variation
    } else {
        if state.is_in_anomaly_state && rng.gen::<f64>() < ANOMALY_RECOVERY_PROBABILITY {
            state.is_in_anomaly_state = false;
        }
        0.0
    };

    let target = base + cyclical + noise + anomaly;
    let current = state
        .sensor_value(&sensor.name)
        .unwrap_or(sensor.base_value);
    // f64::max/min discard NaN, so a corrupted stored value still lands in range.
    let value = (current + (target - current) * SMOOTHING_FACTOR)
        .max(sensor.min_value)
        .min(sensor.max_value);
    state.sensor_values.insert(sensor.name.clone(), value);

    GeneratedValue {
        value,
        is_anomaly: value >= sensor.warning_threshold,
    }
}
