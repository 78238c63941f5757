use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use time::macros::format_description;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Name of this run's log file, e.g. `SubscriptionsRemoval20240501-063000.log`.
pub fn run_log_file_name(started: chrono::NaiveDateTime) -> String {
    format!("SubscriptionsRemoval{}.log", started.format("%Y%m%d-%H%M%S"))
}

/// Logs to the console and to a fresh file in `log_dir`. `RUST_LOG` wins over
/// the verbosity flag when set.
pub fn setup_logging(verbose: bool, log_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let log_path = log_dir.join(run_log_file_name(chrono::Local::now().naive_local()));
    let log_file = File::options()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let timer = LocalTime::new(format_description!(
        "[year]-[month]-[day]:[hour]:[minute]:[second]"
    ));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_timer(timer.clone()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(timer)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .with_writer(Mutex::new(log_file)),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(log_path)
}
