use chrono::{DateTime, Local};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{AppError, Result};

pub const LOG_FILE: &str = "termftp.log";

pub fn init_tracing(log_level: &str) -> Result<()> {
    // The REPL owns stdout, so logs go to termftp.log in the current directory
    let file_appender = tracing_appender::rolling::never(".", LOG_FILE);

    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Priority: RUST_LOG env var > command line arg > default (info)
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let fmt_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_target(true)
        .with_thread_names(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| AppError::ConfigError(format!("Failed to initialize tracing: {}", e)))?;

    // Logging lasts for the whole program
    std::mem::forget(_guard);

    Ok(())
}

/// Prefix a message with a `[yyyy-MM-dd hh:mm:ss:zzz]` timestamp.
pub fn timestamped(now: DateTime<Local>, message: &str) -> String {
    format!("[{}] {}", now.format("%Y-%m-%d %H:%M:%S:%3f"), message)
}
