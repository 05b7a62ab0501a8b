//! Log setup: a daily rolling file, never the terminal the queue prints to.

use crate::app::config::{AppConfig, LoggingConfig};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `-v` raises the configured level one step per flag
pub fn effective_level(configured: &str, verbosity: u8) -> &'static str {
    const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    let base = LEVELS
        .iter()
        .position(|l| l.eq_ignore_ascii_case(configured.trim()))
        .unwrap_or(2);
    LEVELS[(base + verbosity as usize).min(LEVELS.len() - 1)]
}

pub fn log_dir(config: &LoggingConfig) -> PathBuf {
    if config.directory.is_empty() {
        AppConfig::get_cache_dir()
    } else {
        PathBuf::from(&config.directory)
    }
}

/// Install the global subscriber. Keep the guard alive until exit or the
/// last lines are lost.
pub fn init(config: &LoggingConfig, verbosity: u8) -> anyhow::Result<WorkerGuard> {
    let dir = log_dir(config);
    std::fs::create_dir_all(&dir)?;

    let appender = tracing_appender::rolling::daily(&dir, "ultiplay.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    // RUST_LOG wins over the config file
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("ultiplay={}", effective_level(&config.level, verbosity)))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()?;

    Ok(guard)
}
