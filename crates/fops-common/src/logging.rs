//! ---
//! fops_section: "01-core-functionality"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Shared primitives and utilities for the simulator runtime."
//! fops_version: "v0.0.0-prealpha"
//! fops_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "FOPS_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
static STDOUT_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Available log formats for the daemon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Initialize the tracing subscriber based on configuration and environment variables.
///
/// * `FOPS_LOG` overrides the log filter (e.g. `info`, `fops_sim=debug`). When unset the
///   standard `RUST_LOG` variable is honoured, finally defaulting to `info`. Sensor ticks
///   are chatty at `debug`.
/// * Stdout receives JSON or pretty output depending on `config.format` unless
///   `config.console` is off; a daily rolling JSON file is always written to
///   `config.directory`.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!(
            "unable to create log directory {}",
            config.directory.display()
        )
    })?;
    let prefix = config.file_prefix.as_deref().unwrap_or(service_name);
    let (file_writer, file_guard) =
        tracing_appender::non_blocking(daily(&config.directory, format!("{prefix}.log")));
    let _ = FILE_GUARD.set(file_guard);

    let console_layer = if config.console {
        let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
        let _ = STDOUT_GUARD.set(guard);
        let layer = fmt::layer().with_timer(fmt::time::UtcTime::rfc_3339());
        Some(match config.format {
            LogFormat::StructuredJson => {
                layer.with_target(false).json().with_writer(writer).boxed()
            }
            LogFormat::Pretty => layer.with_target(true).with_writer(writer).boxed(),
        })
    } else {
        None
    };

    let file_layer = fmt::layer()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_writer(file_writer)
        .boxed();

    // A second call (tests, embedded use) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(console_layer)
        .with(file_layer)
        .try_init();

    info!(
        service = %service_name,
        log_dir = %config.directory.display(),
        format = ?config.format,
        console = config.console,
        "tracing initialised"
    );
    Ok(())
}

fn env_filter() -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!(
                "invalid {LOG_ENV} directive {directive:?} ({err}); using {DEFAULT_DIRECTIVE}"
            );
            EnvFilter::new(DEFAULT_DIRECTIVE)
        }),
        Err(_) => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE)),
    }
}
