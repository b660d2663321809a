//! ---
//! fops_section: "11-simulation"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Probabilistic alarm generation for anomalous sensor readings."
//! fops_version: "v0.1.0"
//! fops_owner: "tbd"
//! ---
use fops_common::SensorTypeConfig;
use rand::Rng;

use crate::events::{AlarmRaised, AlarmSeverity, SensorReading};

/// Chance that an anomalous reading raises an alarm.
pub const ALARM_PROBABILITY: f64 = 0.3;

/// Severity tier of `value`, or `None` below the warning threshold.
pub fn alarm_tier(value: f64, sensor: &SensorTypeConfig) -> Option<AlarmSeverity> {
    if value >= sensor.error_threshold {
        Some(AlarmSeverity::Error)
    } else if value >= sensor.warning_threshold {
        Some(AlarmSeverity::Warning)
    } else {
        None
    }
}

/// Alarm code for a sensor and severity, e.g. `TEMPERATURE_HIGH`.
pub fn alarm_code(sensor: &str, severity: AlarmSeverity) -> String {
    let prefix: String = sensor
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    let suffix = match severity {
        AlarmSeverity::Error => "HIGH",
        AlarmSeverity::Warning => "WARN",
    };
    format!("{prefix}_{suffix}")
}

/// Decide whether `reading` raises an alarm.
///
/// Non-anomalous readings never alarm and consume no randomness.
pub fn evaluate_alarm<R: Rng + ?Sized>(
    reading: &SensorReading,
    sensor: &SensorTypeConfig,
    rng: &mut R,
) -> Option<AlarmRaised> {
    if !reading.is_anomaly || rng.gen::<f64>() >= ALARM_PROBABILITY {
        return None;
    }
    // An anomalous reading is at or above the warning threshold by construction.
    let severity = alarm_tier(reading.value, sensor).unwrap_or(AlarmSeverity::Warning);
    Some(AlarmRaised {
        equipment_id: reading.equipment_id.clone(),
        code: alarm_code(&sensor.name, severity),
        severity,
        message: format!(
            "{} reading {:.2} {} exceeds warning threshold {:.2} {}",
            sensor.name, reading.value, sensor.unit, sensor.warning_threshold, sensor.unit
        ),
        timestamp: reading.timestamp,
    })
}
