//! Logging initialization for sam-deploy.
//!
//! Interactive runs: logs to `<state>/logs/sam-deploy-{datetime}.log` so the
//! prompts on stdout/stderr stay readable.
//! Other commands: logs to stderr

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Keeps the file writer alive and remembers where it writes
pub struct LoggingHandle {
    /// Flushes the non-blocking writer on drop
    pub _guard: Option<WorkerGuard>,

    /// Set when logs go to a file
    pub log_file_path: Option<PathBuf>,
}

/// Log file name for a run started at `timestamp`
fn log_file_name(timestamp: chrono::DateTime<chrono::Utc>) -> String {
    format!("sam-deploy-{}.log", timestamp.format("%Y%m%dT%H%M%SZ"))
}

/// Effective filter directive: `--debug` beats the configured level, and
/// `RUST_LOG` beats both when set
fn filter_directive(config: &Config, debug_override: bool, rust_log: Option<String>) -> String {
    let log_level = if debug_override {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    rust_log.unwrap_or(log_level)
}

fn should_log_to_file(config: &Config, interactive: bool) -> bool {
    interactive && config.logging.to_file
}

/// Install the global subscriber.
///
/// `interactive` commands prompt on the terminal, so their logs go to a file
/// under the state directory when `logging.to_file` is on. Hold the returned
/// handle until exit or buffered lines are lost.
pub fn init_logging(
    config: &Config,
    interactive: bool,
    debug_override: bool,
) -> Result<LoggingHandle> {
    let directive = filter_directive(config, debug_override, std::env::var("RUST_LOG").ok());
    let filter = tracing_subscriber::EnvFilter::new(directive);

    if should_log_to_file(config, interactive) {
        let logs_dir = config.logs_path();
        std::fs::create_dir_all(&logs_dir)
            .with_context(|| format!("Failed to create {}", logs_dir.display()))?;

        let log_filename = log_file_name(chrono::Utc::now());
        let log_file_path = logs_dir.join(&log_filename);

        let (non_blocking, guard) = file_writer(&logs_dir, &log_filename);

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(non_blocking),
            )
            .init();

        Ok(LoggingHandle {
            _guard: Some(guard),
            log_file_path: Some(log_file_path),
        })
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();

        Ok(LoggingHandle {
            _guard: None,
            log_file_path: None,
        })
    }
}

fn file_writer(
    logs_dir: &Path,
    log_filename: &str,
) -> (tracing_appender::non_blocking::NonBlocking, WorkerGuard) {
    let file_appender = tracing_appender::rolling::never(logs_dir, log_filename);
    tracing_appender::non_blocking(file_appender)
}
