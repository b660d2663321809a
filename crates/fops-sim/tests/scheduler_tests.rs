//! ---
//! fops_section: "11-simulation"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Scheduler lifecycle and timing integration tests."
//! fops_version: "v0.1.0"
//! fops_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use fops_common::{
    CycleDelays, CycleIntervals, EquipmentStatus, ProfileError, SensorTypeConfig,
    SimulationProfile, StatusTransitionTable,
};
use fops_metrics::{new_registry, SimulationMetrics};
use fops_sim::{
    CycleKind, DirectoryError, EquipmentRecord, FileDirectory, SchedulerState, SimError,
    SimulationScheduler, StaticDirectory,
};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::time::{sleep, timeout, Instant};

fn fast_profile() -> SimulationProfile {
    SimulationProfile {
        random_seed: Some(1234),
        intervals: CycleIntervals {
            sensor: Duration::from_millis(100),
            status: Duration::from_secs(10),
            production: Duration::from_secs(10),
        },
        initial_delays: CycleDelays::none(),
        sensors: vec![SensorTypeConfig::new(
            "temperature",
            50.0,
            10.0,
            20.0,
            65.0,
            80.0,
            0.0,
            100.0,
            "°C",
        )],
        ..SimulationProfile::default()
    }
}

fn fleet() -> Vec<EquipmentRecord> {
    vec![
        EquipmentRecord::new("press-1", "PRS-01", "Press", EquipmentStatus::Running),
        EquipmentRecord::new("press-2", "PRS-02", "Press", EquipmentStatus::Idle),
        EquipmentRecord::new("press-3", "PRS-03", "Press", EquipmentStatus::Idle).inactive(),
    ]
}

fn scheduler_with(
    profile: SimulationProfile,
    records: Vec<EquipmentRecord>,
) -> SimulationScheduler {
    SimulationScheduler::new(profile, Arc::new(StaticDirectory::new(records)))
}

async fn sensor_gaps(speed: f64, samples: usize) -> (Vec<Duration>, Option<Duration>) {
    let scheduler = scheduler_with(
        fast_profile(),
        vec![EquipmentRecord::new("press-1", "PRS-01", "Press", EquipmentStatus::Running)],
    );
    scheduler.set_speed_multiplier(speed).expect("valid speed");
    let mut readings = scheduler.subscribe_sensor_readings();
    scheduler.start().await.expect("start");

    let mut stamps = Vec::with_capacity(samples);
    for _ in 0..samples {
        readings.recv().await.expect("reading");
        stamps.push(Instant::now());
    }
    let observed = scheduler.observed_period(CycleKind::Sensor).await;
    scheduler.shutdown().await;
    let gaps = stamps.windows(2).map(|pair| pair[1] - pair[0]).collect();
    (gaps, observed)
}

fn assert_close(actual: Duration, expected: Duration) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(
        diff <= Duration::from_millis(5),
        "expected ~{expected:?}, observed {actual:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn doubling_speed_halves_the_tick_period() {
    let (normal, normal_observed) = sensor_gaps(1.0, 8).await;
    let (fast, fast_observed) = sensor_gaps(2.0, 8).await;

    for gap in normal {
        assert_close(gap, Duration::from_millis(100));
    }
    for gap in fast {
        assert_close(gap, Duration::from_millis(50));
    }
    assert_close(normal_observed.expect("ticks seen"), Duration::from_millis(100));
    assert_close(fast_observed.expect("ticks seen"), Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn starting_twice_runs_a_single_set_of_cycles() {
    let scheduler = scheduler_with(
        fast_profile(),
        vec![EquipmentRecord::new("press-1", "PRS-01", "Press", EquipmentStatus::Running)],
    );
    let mut readings = scheduler.subscribe_sensor_readings();
    scheduler.start().await.expect("first start");
    scheduler.start().await.expect("second start is a no-op");
    assert_eq!(scheduler.state(), SchedulerState::Running);

    sleep(Duration::from_millis(1_000)).await;
    let mut received = 0;
    while readings.try_recv().is_ok() {
        received += 1;
    }
    assert!((10..=11).contains(&received), "received {received} readings");
    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn stop_before_start_is_a_no_op() {
    let scheduler = scheduler_with(fast_profile(), fleet());
    scheduler.stop().await;
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert!(!scheduler.is_running());
    assert!(scheduler.equipment_states().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_halts_event_emission_and_restart_reseeds() {
    let scheduler = scheduler_with(fast_profile(), fleet());
    let mut all = scheduler.subscribe_all();

    scheduler.start().await.expect("start");
    let states = scheduler.equipment_states().await;
    assert_eq!(states.len(), 2, "inactive equipment must not be seeded");
    sleep(Duration::from_millis(350)).await;
    scheduler.stop().await;
    assert!(!scheduler.is_running());
    assert!(scheduler.equipment_states().await.is_empty());

    while all.try_recv().is_ok() {}
    sleep(Duration::from_secs(2)).await;
    assert!(matches!(all.try_recv(), Err(TryRecvError::Empty)));

    scheduler.start().await.expect("restart");
    assert!(scheduler.is_running());
    assert_eq!(scheduler.equipment_states().await.len(), 2);
    all.recv().await.expect("events flow again");
    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn invalid_profile_keeps_scheduler_stopped() {
    let mut profile = fast_profile();
    profile.transitions = StatusTransitionTable::new().with_row(
        EquipmentStatus::Running,
        [(EquipmentStatus::Running, 0.4), (EquipmentStatus::Idle, 0.1)],
    );
    let scheduler = scheduler_with(profile, fleet());
    let err = scheduler.start().await.expect_err("row sum is invalid");
    assert!(matches!(
        err,
        SimError::Config(ProfileError::RowSum {
            from: EquipmentStatus::Running,
            ..
        })
    ));
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn directory_failure_keeps_scheduler_stopped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let directory = FileDirectory::new(dir.path().join("missing.csv"));
    let scheduler = SimulationScheduler::new(fast_profile(), Arc::new(directory));
    let err = scheduler.start().await.expect_err("missing file");
    assert!(matches!(err, SimError::Directory(DirectoryError::Io { .. })));
    assert!(!scheduler.is_running());
}

#[tokio::test(start_paused = true)]
async fn invalid_speed_multiplier_is_rejected() {
    let scheduler = scheduler_with(fast_profile(), fleet());
    for speed in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        assert!(matches!(
            scheduler.set_speed_multiplier(speed),
            Err(SimError::InvalidSpeedMultiplier(_))
        ));
    }
    assert_eq!(scheduler.speed_multiplier(), 1.0);
    scheduler.set_speed_multiplier(4.0).expect("valid");
    assert_eq!(
        scheduler.effective_schedule().period(CycleKind::Sensor),
        Duration::from_millis(25)
    );
}

#[tokio::test(start_paused = true)]
async fn lagging_subscriber_never_stalls_the_cycles() {
    let mut profile = fast_profile();
    profile.event_capacity = 4;
    let scheduler = scheduler_with(profile, fleet());
    let mut idle_subscriber = scheduler.subscribe_sensor_readings();
    scheduler.start().await.expect("start");

    sleep(Duration::from_secs(2)).await;
    assert!(matches!(
        idle_subscriber.recv().await,
        Err(RecvError::Lagged(_))
    ));
    let period = scheduler
        .observed_period(CycleKind::Sensor)
        .await
        .expect("sensor cycle ticked");
    assert_close(period, Duration::from_millis(100));
    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn dropping_a_running_scheduler_stops_its_cycles() {
    let scheduler = scheduler_with(fast_profile(), fleet());
    let mut readings = scheduler.subscribe_sensor_readings();
    scheduler.start().await.expect("start");
    readings.recv().await.expect("first reading");
    drop(scheduler);

    timeout(Duration::from_secs(5), async {
        loop {
            if let Err(RecvError::Closed) = readings.recv().await {
                break;
            }
        }
    })
    .await
    .expect("cycle tasks exit after drop");
}

#[tokio::test(start_paused = true)]
async fn metrics_track_published_events() {
    let registry = new_registry();
    let metrics = SimulationMetrics::new(registry).expect("register");
    let scheduler = scheduler_with(fast_profile(), fleet()).with_metrics(metrics.clone());
    scheduler.start().await.expect("start");
    sleep(Duration::from_millis(450)).await;
    scheduler.stop().await;

    // Two non-offline units, one sensor each, five ticks.
    assert_eq!(metrics.events_recorded("sensor_reading"), 10);
    assert_eq!(metrics.tick_failures("sensor"), 0);
    // The first tick has no predecessor to measure jitter against.
    assert_eq!(metrics.jitter_observations("sensor"), 4);
}
