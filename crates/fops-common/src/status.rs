//! ---
//! fops_section: "01-core-functionality"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Shared primitives and utilities for the simulator runtime."
//! fops_version: "v0.0.0-prealpha"
//! fops_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Operating status of a piece of equipment.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    Default,
)]
#[strum(ascii_case_insensitive)]
pub enum EquipmentStatus {
    Running,
    #[default]
    Idle,
    Warning,
    Error,
    Maintenance,
    Setup,
    Offline,
}

impl EquipmentStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, EquipmentStatus::Running)
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, EquipmentStatus::Offline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(
            EquipmentStatus::from_str("running").unwrap(),
            EquipmentStatus::Running
        );
        assert_eq!(
            EquipmentStatus::from_str("MAINTENANCE").unwrap(),
            EquipmentStatus::Maintenance
        );
        assert!(EquipmentStatus::from_str("exploded").is_err());
    }

    #[test]
    fn display_round_trips_every_variant() {
        for status in EquipmentStatus::iter() {
            let rendered = status.to_string();
            assert_eq!(EquipmentStatus::from_str(&rendered).unwrap(), status);
        }
    }
}
