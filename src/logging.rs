//! # Structured Logging Module
//!
//! Environment-aware structured logging to the console and, when `LOG_DIR` is set,
//! to a JSON log file for post-mortem inspection of event propagation.

use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;

use chrono::Utc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let pid = process::id();

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(build_filter(&log_level));

        let log_dir = std::env::var("LOG_DIR").ok().filter(|d| !d.is_empty());
        let (file_layer, guard, log_path) = match log_dir.map(PathBuf::from) {
            Some(dir) => {
                let file_name = format!(
                    "{}.{}.{}.log",
                    environment,
                    pid,
                    Utc::now().format("%Y%m%d_%H%M%S")
                );
                let log_path = dir.join(&file_name);
                let appender = tracing_appender::rolling::never(&dir, file_name);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(build_filter(&log_level));
                (Some(layer), Some(guard), Some(log_path))
            }
            None => (None, None, None),
        };

        let subscriber = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = pid,
            environment = %environment,
            log_file = ?log_path.as_ref().map(|p| p.display().to_string()),
            "Structured logging initialized"
        );

        guard
    });
}

/// `RUST_LOG` wins over the environment-derived default level
fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("SERVICE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .ok()
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" | "prod" | "release" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log a lifecycle transition of a supervised task
pub fn log_task_lifecycle(task: &str, status: &str, details: Option<&str>) {
    tracing::info!(
        task = %task,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "TASK_LIFECYCLE"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("prod"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
        assert!(LOGGER_INITIALIZED.get().is_some());
    }
}
