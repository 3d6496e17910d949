//! Log initialisation.
//!
//! Logs go to a daily-rolling file under the storage root so that `restore
//! --auto` keeps stdout and stderr clean for the invoking shell.
//!
//! - `SESSION_RESTORE_LOG` (or `RUST_LOG`): filter directives, default `info`
//! - `SESSION_RESTORE_DEBUG_LOG=1`: force `debug`
//! - `SESSION_RESTORE_LOG_STDERR=1`: also log to stderr

use std::env;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry};

fn filter() -> EnvFilter {
    if env_flag("SESSION_RESTORE_DEBUG_LOG") {
        return EnvFilter::new("debug");
    }
    match env::var("SESSION_RESTORE_LOG") {
        Ok(level) if !level.trim().is_empty() => EnvFilter::new(level),
        _ => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// Installs the global subscriber. Keep the guard alive until exit so
/// buffered lines are flushed.
pub fn init(log_dir: &Path, file_name: &str) -> Option<WorkerGuard> {
    if let Err(err) = std::fs::create_dir_all(log_dir) {
        eprintln!(
            "Warning: failed to create log directory {}: {}",
            log_dir.display(),
            err
        );
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false);

    if env_flag("SESSION_RESTORE_LOG_STDERR") {
        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false);
        Registry::default()
            .with(filter())
            .with(file_layer)
            .with(stderr_layer)
            .init();
    } else {
        Registry::default().with(filter()).with(file_layer).init();
    }
    Some(guard)
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}
