//! ---
//! fops_section: "11-simulation"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Markov-style equipment status transitions."
//! fops_version: "v0.1.0"
//! fops_owner: "tbd"
//! ---
use fops_common::{EquipmentStatus, StatusTransitionTable, TransitionRow};
use rand::Rng;

/// Walk `row` in order and return the first target whose cumulative
/// probability reaches `roll`. Falls back to the first entry when the row's
/// mass never reaches the roll. Empty rows yield `None`.
pub fn select_from_row(row: &TransitionRow, roll: f64) -> Option<EquipmentStatus> {
    let mut cumulative = 0.0;
    for (status, probability) in row {
        cumulative += probability;
        if cumulative >= roll {
            return Some(*status);
        }
    }
    row.keys().next().copied()
}

/// Sample the successor of `current`, or `None` when the table has no row for it.
pub fn next_status<R: Rng + ?Sized>(
    table: &StatusTransitionTable,
    current: EquipmentStatus,
    rng: &mut R,
) -> Option<EquipmentStatus> {
    let row = table.row(current)?;
    select_from_row(row, rng.gen::<f64>())
}
