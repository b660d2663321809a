//! ---
//! fops_section: "03-observability"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Metrics collection and export utilities."
//! fops_version: "v0.0.0-prealpha"
//! fops_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across the workspace.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Spawn an HTTP server that exposes the registry at `/metrics`.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get({
            let registry = registry.clone();
            move || metrics_handler(registry.clone())
        }),
    );

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure metrics listener as non-blocking")?;
    let bound = std_listener
        .local_addr()
        .with_context(|| "failed to read metrics listener address")?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;

    info!(address = %bound, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let service = app.into_make_service();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr: bound,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        ),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; charset=utf-8"),
                )],
                String::from("metrics encoding error"),
            )
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Return the bound address for convenience.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Metrics recorded by the daemon process itself.
#[derive(Clone)]
pub struct DaemonMetrics {
    starts_total: IntCounter,
    config_load_seconds: Histogram,
}

impl DaemonMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "fops_simd_starts_total",
            "Total number of times the simulator daemon has initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.001, 2.0, 16)
            .context("failed to construct histogram buckets")?;
        let config_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "fops_simd_config_load_seconds",
                "Time spent loading and validating configuration",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(config_load_seconds.clone()))?;

        Ok(Self {
            starts_total,
            config_load_seconds,
        })
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn observe_config_load(&self, seconds: f64) {
        self.config_load_seconds.observe(seconds);
    }
}

/// Metrics describing the simulation engine.
#[derive(Clone, Debug)]
pub struct SimulationMetrics {
    events_total: IntCounterVec,
    tick_failures: IntCounterVec,
    tick_duration: HistogramVec,
    tick_jitter: HistogramVec,
    equipment_tracked: IntGauge,
    running: IntGauge,
}

impl SimulationMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let events_total = IntCounterVec::new(
            Opts::new(
                "fops_sim_events_total",
                "Events published by the simulation engine",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(events_total.clone()))?;

        let tick_failures = IntCounterVec::new(
            Opts::new(
                "fops_sim_tick_failures_total",
                "Equipment or whole-tick failures caught inside a simulation cycle",
            ),
            &["cycle"],
        )?;
        registry.register(Box::new(tick_failures.clone()))?;

        let buckets = prometheus::exponential_buckets(0.00005, 2.0, 16)
            .context("failed to construct histogram buckets")?;
        let tick_duration = HistogramVec::new(
            HistogramOpts::new(
                "fops_sim_tick_duration_seconds",
                "Wall-clock time spent processing one simulation tick",
            )
            .buckets(buckets),
            &["cycle"],
        )?;
        registry.register(Box::new(tick_duration.clone()))?;

        let buckets = prometheus::exponential_buckets(0.0001, 2.0, 16)
            .context("failed to construct histogram buckets")?;
        let tick_jitter = HistogramVec::new(
            HistogramOpts::new(
                "fops_sim_tick_jitter_seconds",
                "Deviation of the observed tick spacing from the target period",
            )
            .buckets(buckets),
            &["cycle"],
        )?;
        registry.register(Box::new(tick_jitter.clone()))?;

        let equipment_tracked = IntGauge::with_opts(Opts::new(
            "fops_sim_equipment_tracked",
            "Equipment units seeded into the simulation state store",
        ))?;
        registry.register(Box::new(equipment_tracked.clone()))?;

        let running = IntGauge::with_opts(Opts::new(
            "fops_sim_running",
            "1 while the simulation cycles are active",
        ))?;
        registry.register(Box::new(running.clone()))?;

        Ok(Self {
            events_total,
            tick_failures,
            tick_duration,
            tick_jitter,
            equipment_tracked,
            running,
        })
    }

    pub fn record_events(&self, kind: &str, count: usize) {
        self.events_total
            .with_label_values(&[kind])
            .inc_by(count as u64);
    }

    pub fn record_tick_failures(&self, cycle: &str, count: usize) {
        self.tick_failures
            .with_label_values(&[cycle])
            .inc_by(count as u64);
    }

    pub fn observe_tick(&self, cycle: &str, seconds: f64) {
        self.tick_duration
            .with_label_values(&[cycle])
            .observe(seconds);
    }

    pub fn observe_jitter(&self, cycle: &str, seconds: f64) {
        self.tick_jitter.with_label_values(&[cycle]).observe(seconds);
    }

    pub fn set_equipment_tracked(&self, count: usize) {
        self.equipment_tracked.set(count as i64);
    }

    pub fn set_running(&self, running: bool) {
        self.running.set(i64::from(running));
    }

    pub fn events_recorded(&self, kind: &str) -> u64 {
        self.events_total.with_label_values(&[kind]).get()
    }

    pub fn tick_failures(&self, cycle: &str) -> u64 {
        self.tick_failures.with_label_values(&[cycle]).get()
    }

    pub fn jitter_observations(&self, cycle: &str) -> u64 {
        self.tick_jitter
            .with_label_values(&[cycle])
            .get_sample_count()
    }
}
