//! ---
//! fops_section: "11-simulation"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Error taxonomy for the simulation engine."
//! fops_version: "v0.1.0"
//! fops_owner: "tbd"
//! ---
use std::path::PathBuf;

use fops_common::ProfileError;
use thiserror::Error;

use crate::equipment::EquipmentId;

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid simulation profile: {0}")]
    Config(#[from] ProfileError),
    #[error("equipment directory query failed: {0}")]
    Directory(#[from] DirectoryError),
    #[error("equipment {0} is not tracked by the state store")]
    UnknownEquipment(EquipmentId),
    #[error("state for equipment {actual} cannot be stored under {expected}")]
    IdentityMismatch {
        expected: EquipmentId,
        actual: EquipmentId,
    },
    #[error("speed multiplier must be a positive finite number, got {0}")]
    InvalidSpeedMultiplier(f64),
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("unable to read equipment directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid equipment JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid equipment CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid equipment TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unsupported equipment directory format: {0}")]
    UnsupportedFormat(PathBuf),
    #[error("equipment id {0} listed more than once")]
    DuplicateId(EquipmentId),
}
