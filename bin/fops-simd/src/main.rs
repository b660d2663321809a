//! ---
//! fops_section: "11-simulation"
//! fops_subsection: "binary"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Binary entrypoint for the telemetry simulator daemon."
//! fops_version: "v0.1.0"
//! fops_owner: "tbd"
//! ---
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand};
use fops_common::config::AppConfig;
use fops_common::logging::init_tracing;
use fops_metrics::{new_registry, spawn_http_server, DaemonMetrics, SimulationMetrics};
use fops_sim::{
    EquipmentDirectory, FileDirectory, OfflineSimulation, SimulationEvent, SimulationScheduler,
};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    version = concat!("fops-simd ", env!("CARGO_PKG_VERSION")),
    about = "Synthetic factory telemetry simulator",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Override the equipment directory file")]
    equipment: Option<PathBuf>,

    #[arg(long, value_name = "X", help = "Override the simulation speed multiplier")]
    speed: Option<f64>,

    #[arg(long, value_name = "N", help = "Fix the random seed for a reproducible run")]
    seed: Option<u64>,

    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print version information and exit"
    )]
    version: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the simulation until Ctrl-C")]
    Run {
        #[arg(long, value_name = "SECS", help = "Stop after this many seconds")]
        duration_secs: Option<u64>,
    },
    #[command(about = "Generate a session offline on a virtual clock")]
    Generate {
        #[arg(long, default_value_t = 12, help = "Number of sensor ticks to simulate")]
        ticks: usize,
        #[arg(
            long,
            value_name = "FILE",
            default_value = "-",
            help = "Output file (.csv or .json); '-' writes JSON to stdout"
        )]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    fn for_path(path: &Path) -> Result<Self> {
        if is_stdout(path) {
            return Ok(Self::Json);
        }
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Ok(Self::Csv),
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Self::Json),
            _ => bail!(
                "unsupported output format for {}; use .csv or .json",
                path.display()
            ),
        }
    }
}

fn is_stdout(path: &Path) -> bool {
    path.as_os_str() == "-"
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("fops-simd {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/example.toml"));

    let load_started = Instant::now();
    let loaded = AppConfig::load_with_source(&candidates)?;
    let load_duration = load_started.elapsed();
    let mut config = loaded.config;
    apply_overrides(&mut config, &cli)?;

    let command = cli.command.unwrap_or(Commands::Run {
        duration_secs: None,
    });
    if let Commands::Generate { output, .. } = &command {
        if is_stdout(output) {
            config.logging.console = false;
        }
    }
    init_tracing("fops-simd", &config.logging)?;
    info!(
        config_path = %loaded.source.display(),
        load_ms = load_duration.as_millis() as u64,
        "configuration loaded"
    );

    match command {
        Commands::Run { duration_secs } => {
            run_daemon(config, load_duration, duration_secs.map(Duration::from_secs)).await
        }
        Commands::Generate { ticks, output } => generate(config, ticks, &output).await,
    }
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.equipment {
        config.equipment.path = path.clone();
    }
    if let Some(speed) = cli.speed {
        config.simulation.speed_multiplier = speed;
    }
    if let Some(seed) = cli.seed {
        config.simulation.random_seed = Some(seed);
    }
    config
        .validate()
        .context("invalid configuration after command-line overrides")
}

async fn run_daemon(
    config: AppConfig,
    load_duration: Duration,
    duration: Option<Duration>,
) -> Result<()> {
    let registry = new_registry();
    let daemon_metrics = DaemonMetrics::new(registry.clone())?;
    daemon_metrics.observe_config_load(load_duration.as_secs_f64());
    daemon_metrics.inc_start();
    let simulation_metrics = SimulationMetrics::new(registry.clone())?;

    let metrics_server = if config.metrics.enabled {
        let server = spawn_http_server(registry, config.metrics.listen)?;
        info!(address = %server.addr(), "metrics exporter enabled");
        Some(server)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let directory: Arc<dyn EquipmentDirectory> =
        Arc::new(FileDirectory::new(config.equipment.path.clone()));
    let scheduler =
        SimulationScheduler::new(config.simulation, directory).with_metrics(simulation_metrics);
    let event_log = spawn_event_log(&scheduler);
    scheduler
        .start()
        .await
        .context("failed to start simulation")?;

    match duration {
        Some(duration) => {
            info!(duration_secs = duration.as_secs(), "simulation running");
            tokio::select! {
                _ = tokio::time::sleep(duration) => info!("run duration elapsed; shutting down"),
                result = signal::ctrl_c() => {
                    result?;
                    info!("ctrl-c received; shutting down");
                }
            }
        }
        None => {
            info!("simulation running; waiting for termination signal");
            signal::ctrl_c().await?;
            info!("ctrl-c received; shutting down");
        }
    }

    scheduler.shutdown().await;
    if let Err(err) = event_log.await {
        warn!(error = %err, "event log task failed");
    }
    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }
    Ok(())
}

/// Log every published event until the scheduler and its cycles are gone.
fn spawn_event_log(scheduler: &SimulationScheduler) -> JoinHandle<()> {
    let mut events = scheduler.subscribe_all();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SimulationEvent::AlarmRaised(alarm)) => warn!(
                    equipment = %alarm.equipment_id,
                    code = %alarm.code,
                    severity = %alarm.severity,
                    message = %alarm.message,
                    "alarm raised"
                ),
                Ok(SimulationEvent::StatusChanged(change)) => info!(
                    equipment = %change.equipment_id,
                    from = %change.previous_status,
                    to = %change.new_status,
                    "status changed"
                ),
                Ok(event) => debug!(
                    equipment = %event.equipment_id(),
                    kind = %event.kind(),
                    "event"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event log fell behind; events skipped")
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn generate(config: AppConfig, ticks: usize, output: &Path) -> Result<()> {
    let format = OutputFormat::for_path(output)?;
    let directory = FileDirectory::new(config.equipment.path.clone());
    let records = directory.active_equipment().await.with_context(|| {
        format!(
            "failed to load equipment directory {}",
            config.equipment.path.display()
        )
    })?;
    let mut simulation = OfflineSimulation::new(config.simulation, records, Utc::now())
        .context("failed to prepare offline simulation")?;
    let events = simulation.run(ticks);

    let written = if is_stdout(output) {
        let stdout = io::stdout();
        write_events(&events, format, stdout.lock())?
    } else {
        let file = File::create(output)
            .with_context(|| format!("unable to create {}", output.display()))?;
        write_events(&events, format, BufWriter::new(file))?
    };
    info!(
        ticks,
        events = events.len(),
        written,
        output = %output.display(),
        "offline session generated"
    );
    Ok(())
}

/// CSV carries sensor readings only; JSON carries every event, tagged by kind.
fn write_events<W: Write>(
    events: &[SimulationEvent],
    format: OutputFormat,
    mut writer: W,
) -> Result<usize> {
    match format {
        OutputFormat::Csv => {
            let mut csv_writer = csv::Writer::from_writer(writer);
            let mut written = 0;
            for event in events {
                if let SimulationEvent::SensorReading(reading) = event {
                    csv_writer.serialize(reading)?;
                    written += 1;
                }
            }
            csv_writer.flush()?;
            Ok(written)
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, events)?;
            writeln!(writer)?;
            writer.flush()?;
            Ok(events.len())
        }
    }
}
