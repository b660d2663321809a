//! ---
//! fops_section: "11-simulation"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Equipment directory sources queried when a simulation starts."
//! fops_version: "v0.1.0"
//! fops_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::equipment::EquipmentRecord;
use crate::error::DirectoryError;

/// Source of the equipment list the simulation is seeded from.
#[async_trait]
pub trait EquipmentDirectory: Send + Sync {
    /// Active equipment only. Implementations must not return duplicate ids.
    async fn active_equipment(&self) -> Result<Vec<EquipmentRecord>, DirectoryError>;
}

/// In-memory directory, handy for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    records: Vec<EquipmentRecord>,
}

impl StaticDirectory {
    pub fn new(records: Vec<EquipmentRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl EquipmentDirectory for StaticDirectory {
    async fn active_equipment(&self) -> Result<Vec<EquipmentRecord>, DirectoryError> {
        let records = self
            .records
            .iter()
            .filter(|record| record.active)
            .cloned()
            .collect();
        ensure_unique(records)
    }
}

/// Directory backed by a JSON, CSV or TOML file, re-read on every query.
#[derive(Debug, Clone)]
pub struct FileDirectory {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct TomlFleet {
    #[serde(default)]
    equipment: Vec<EquipmentRecord>,
}

impl FileDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(&self, contents: &str) -> Result<Vec<EquipmentRecord>, DirectoryError> {
        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => Ok(serde_json::from_str(contents)?),
            Some("toml") => Ok(toml::from_str::<TomlFleet>(contents)?.equipment),
            Some("csv") => {
                let mut reader = csv::ReaderBuilder::new()
                    .trim(csv::Trim::All)
                    .from_reader(contents.as_bytes());
                let mut records = Vec::new();
                for row in reader.deserialize() {
                    records.push(row?);
                }
                Ok(records)
            }
            _ => Err(DirectoryError::UnsupportedFormat(self.path.clone())),
        }
    }
}

#[async_trait]
impl EquipmentDirectory for FileDirectory {
    async fn active_equipment(&self) -> Result<Vec<EquipmentRecord>, DirectoryError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| DirectoryError::Io {
                path: self.path.clone(),
                source,
            })?;
        let records = self.parse(&contents)?;
        let total = records.len();
        let active: Vec<_> = records.into_iter().filter(|record| record.active).collect();
        debug!(
            path = %self.path.display(),
            total,
            active = active.len(),
            "equipment directory loaded"
        );
        ensure_unique(active)
    }
}

fn ensure_unique(records: Vec<EquipmentRecord>) -> Result<Vec<EquipmentRecord>, DirectoryError> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in &records {
        if !seen.insert(&record.id) {
            return Err(DirectoryError::DuplicateId(record.id.clone()));
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fops_common::EquipmentStatus;

    #[tokio::test]
    async fn static_directory_filters_inactive() {
        let directory = StaticDirectory::new(vec![
            EquipmentRecord::new("a", "A", "Alpha", EquipmentStatus::Running),
            EquipmentRecord::new("b", "B", "Beta", EquipmentStatus::Idle).inactive(),
        ]);
        let records = directory.active_equipment().await.expect("records");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id.as_str(), "a");
    }

    #[tokio::test]
    async fn static_directory_rejects_duplicates() {
        let directory = StaticDirectory::new(vec![
            EquipmentRecord::new("a", "A", "Alpha", EquipmentStatus::Running),
            EquipmentRecord::new("a", "A2", "Alpha again", EquipmentStatus::Idle),
        ]);
        assert!(matches!(
            directory.active_equipment().await,
            Err(DirectoryError::DuplicateId(id)) if id.as_str() == "a"
        ));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let directory = FileDirectory::new("fleet.yaml");
        assert!(matches!(
            directory.parse("[]"),
            Err(DirectoryError::UnsupportedFormat(_))
        ));
    }
}
