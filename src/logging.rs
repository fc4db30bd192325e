use crate::models::BridgeConfig;
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup logging with a daily rotating file appender.
///
/// The level comes from `config.log_level` (`config.enable_debug_mode` forces DEBUG).
/// Returns `Ok(None)` without touching the global subscriber when
/// `config.enable_logging` is false.
///
/// # Arguments
/// * `config` - Bridge configuration
/// * `log_dir` - Directory for log files (e.g., "logs")
/// * `log_prefix` - Prefix for log files (e.g., "gui-async-bridge")
///
/// # Returns
/// A guard that must be held for the duration of the program to keep logging active
pub fn setup_logging(
    config: &BridgeConfig,
    log_dir: &str,
    log_prefix: &str,
) -> Result<Option<WorkerGuard>> {
    setup_logging_with_console(config, log_dir, log_prefix, false)
}

/// Setup logging with optional console output.
///
/// Fails instead of panicking when a global subscriber is already installed.
pub fn setup_logging_with_console(
    config: &BridgeConfig,
    log_dir: &str,
    log_prefix: &str,
    console_output: bool,
) -> Result<Option<WorkerGuard>> {
    if !config.enable_logging {
        return Ok(None);
    }

    let log_path = Utf8PathBuf::from(log_dir);
    if !log_path.exists() {
        fs::create_dir_all(&log_path)
            .with_context(|| format!("Failed to create log directory: {}", log_dir))?;
    }

    let file_appender = rolling::daily(log_dir, log_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let directive = config.filter_directive();
    let env_filter = EnvFilter::new(directive);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    let init = if console_output {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(console_layer)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .try_init()
    };
    init.context("A global tracing subscriber is already installed")?;

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, level={}, console={}",
        log_dir,
        log_prefix,
        directive,
        console_output
    );

    Ok(Some(guard))
}
