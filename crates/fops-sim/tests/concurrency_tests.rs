//! ---
//! fops_section: "11-simulation"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Concurrent sensor and status ticks against one shared state store."
//! fops_version: "v0.1.0"
//! fops_owner: "tbd"
//! ---
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use fops_common::{EquipmentStatus, SimulationProfile, StatusTransitionTable};
use fops_sim::cycles::{cycle_rng, sensor_tick, status_tick};
use fops_sim::sensor::CYCLE_PHASE_STEP;
use fops_sim::{EquipmentId, EquipmentRecord, EquipmentStateStore, SimulationEvent};

const TICKS: usize = 20_000;

/// Every row moves away from its own status, so each status tick changes it.
fn churning_profile() -> SimulationProfile {
    use EquipmentStatus::*;
    SimulationProfile {
        random_seed: Some(99),
        transitions: StatusTransitionTable::new()
            .with_row(Running, [(Idle, 0.5), (Warning, 0.5)])
            .with_row(Idle, [(Running, 0.5), (Warning, 0.5)])
            .with_row(Warning, [(Running, 0.5), (Idle, 0.5)]),
        ..SimulationProfile::default()
    }
}

#[test]
fn concurrent_sensor_and_status_ticks_lose_no_updates() {
    let profile = Arc::new(churning_profile());
    profile.validate().expect("valid profile");
    let id = EquipmentId::new("press-1");
    let mut seeding_rng = cycle_rng(profile.random_seed, 0);
    let store = Arc::new(EquipmentStateStore::seed(
        [EquipmentRecord::new(
            "press-1",
            "PRS-01",
            "Press",
            EquipmentStatus::Running,
        )],
        &profile.sensors,
        &mut seeding_rng,
        Utc::now(),
    ));
    let initial = store.get(&id).expect("tracked");

    let sensor = {
        let (store, profile) = (store.clone(), profile.clone());
        thread::spawn(move || {
            let mut rng = cycle_rng(profile.random_seed, 1);
            (0..TICKS)
                .map(|_| sensor_tick(&store, &profile, &mut rng, Utc::now()))
                .map(|output| {
                    assert!(output.failures.is_empty());
                    output
                        .events
                        .iter()
                        .filter(|event| matches!(event, SimulationEvent::SensorReading(_)))
                        .count()
                })
                .sum::<usize>()
        })
    };
    let status = {
        let (store, profile) = (store.clone(), profile.clone());
        thread::spawn(move || {
            let mut rng = cycle_rng(profile.random_seed, 2);
            let mut changes = Vec::with_capacity(TICKS);
            for _ in 0..TICKS {
                let output = status_tick(&store, &profile, &mut rng, Utc::now());
                assert!(output.failures.is_empty());
                changes.extend(output.events.into_iter().filter_map(|event| match event {
                    SimulationEvent::StatusChanged(change) => Some(change),
                    _ => None,
                }));
            }
            changes
        })
    };

    let readings = sensor.join().expect("sensor thread");
    let changes = status.join().expect("status thread");

    // Statuses never reach Offline, so every sensor tick reads every sensor.
    assert_eq!(readings, TICKS * profile.sensors.len());
    assert_eq!(changes.len(), TICKS);

    let mut expected_previous = EquipmentStatus::Running;
    for change in &changes {
        assert_eq!(change.previous_status, expected_previous);
        assert_ne!(change.new_status, change.previous_status);
        expected_previous = change.new_status;
    }

    let last = store.get(&id).expect("tracked");
    assert_eq!(Some(last.current_status), changes.last().map(|c| c.new_status));

    // Each generated value advances the phase once; none may be overwritten.
    let mut expected_phase = initial.cycle_phase;
    for _ in 0..readings {
        expected_phase += CYCLE_PHASE_STEP;
    }
    assert_eq!(last.cycle_phase, expected_phase);
}
