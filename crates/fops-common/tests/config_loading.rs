//! ---
//! fops_section: "01-core-functionality"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Configuration loading integration tests."
//! fops_version: "v0.0.0-prealpha"
//! fops_owner: "tbd"
//! ---
use std::fs;
use std::time::Duration;

use fops_common::config::AppConfig;
use fops_common::EquipmentStatus;
use tempfile::tempdir;

#[test]
fn loads_first_existing_candidate() {
    let dir = tempdir().expect("tempdir");
    let missing = dir.path().join("missing.toml");
    let present = dir.path().join("sim.toml");
    fs::write(
        &present,
        r#"
            [simulation]
            speed_multiplier = 4.0

            [simulation.intervals]
            sensor_ms = 100
        "#,
    )
    .expect("write config");

    let loaded = AppConfig::load_with_source(&[missing, present.clone()]).expect("config loads");
    assert_eq!(loaded.source, present);
    assert_eq!(loaded.config.simulation.speed_multiplier, 4.0);
    assert_eq!(
        loaded.config.simulation.intervals.sensor,
        Duration::from_millis(100)
    );
    assert_eq!(
        loaded.config.simulation.intervals.status,
        Duration::from_millis(30_000)
    );
    assert!(loaded
        .config
        .simulation
        .transitions
        .row(EquipmentStatus::Running)
        .is_some());
}

#[test]
fn reports_inspected_paths_when_nothing_exists() {
    let dir = tempdir().expect("tempdir");
    let err = AppConfig::load(&[dir.path().join("nope.toml")]).expect_err("no config");
    assert!(err.to_string().contains("nope.toml"));
}

#[test]
fn invalid_transition_table_is_rejected_with_context() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bad.toml");
    fs::write(
        &path,
        r#"
            [simulation.transitions.Running]
            Running = 0.7
            Idle = 0.7
        "#,
    )
    .expect("write config");
    let err = AppConfig::load(&[path]).expect_err("row sum invalid");
    let rendered = format!("{:#}", err);
    assert!(rendered.contains("sums to"), "unexpected error: {rendered}");
}

#[test]
fn shipped_example_config_is_valid() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../configs/example.toml");
    let config = AppConfig::load(&[path]).expect("example config loads");
    assert_eq!(config.simulation.sensors.len(), 4);
    assert_eq!(config.simulation, fops_common::SimulationProfile::default());
    assert!(config.logging.console);
}
