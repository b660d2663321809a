//! ---
//! fops_section: "11-simulation"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Production batch generation for running equipment."
//! fops_version: "v0.1.0"
//! fops_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use rand::Rng;

use crate::equipment::EquipmentSimulationState;
use crate::events::ProductionBatch;

pub const MIN_UNITS_PER_BATCH: u32 = 5;
pub const MAX_UNITS_PER_BATCH: u32 = 20;
pub const NORMAL_DEFECT_RATE: f64 = 0.02;
pub const ANOMALY_DEFECT_RATE: f64 = 0.15;

/// Defect rate applied to a batch, depending on the unit's anomaly state.
pub fn defect_rate(in_anomaly_state: bool) -> f64 {
    if in_anomaly_state {
        ANOMALY_DEFECT_RATE
    } else {
        NORMAL_DEFECT_RATE
    }
}

/// Produce a batch for `state`, or `None` unless the unit is running.
pub fn generate_batch<R: Rng + ?Sized>(
    state: &EquipmentSimulationState,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Option<ProductionBatch> {
    if !state.current_status.is_running() {
        return None;
    }
    let units_produced = rng.gen_range(MIN_UNITS_PER_BATCH..=MAX_UNITS_PER_BATCH);
    let defect_count =
        (f64::from(units_produced) * defect_rate(state.is_in_anomaly_state)).floor() as u32;
    Some(ProductionBatch {
        equipment_id: state.equipment_id.clone(),
        units_produced,
        defect_count,
        timestamp: now,
    })
}
