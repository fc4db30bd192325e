//! gui-async-bridge - Headless demonstration of the async GUI façade
//!
//! Main entry point for the demo binary.
//!
//! # Overview
//!
//! The binary plays the part of a GUI application without a toolkit. It initializes:
//! - Configuration ([`ConfigStore`] YAML file or `GUI_ASYNC_BRIDGE_*` environment)
//! - Logging infrastructure (file rotation + console output)
//! - A [`HeadlessDispatcher`] whose queue is pumped by the main thread
//! - The process-wide [`AsyncGui`](gui_async_bridge::AsyncGui) façade
//!
//! The main thread stands in for the GUI thread: it pumps dispatched callables
//! (progress callbacks, shared-timer ticks) while the bridge runs coroutines.
//!
//! # Execution Flow
//!
//! 1. Load configuration (first CLI argument is an optional YAML path)
//! 2. Initialize logging → logs/gui-async-bridge.<date>
//! 3. Install the global façade and acquire the bridge
//! 4. Submit plain, timeout, retry and progress tasks
//! 5. Pump the GUI queue until every task has finished
//! 6. Exercise a circuit breaker
//! 7. Print the health report as YAML and shut down

use anyhow::{Context, Result};
use gui_async_bridge::{
    APP_NAME, BridgeConfig, ConfigStore, HeadlessDispatcher, TaskStatus, VERSION, config, global,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Main entry point for the demo
///
/// # Errors
///
/// This function can fail if:
/// - The configuration file is unreadable or invalid
/// - Logging initialization fails (disk space, permissions)
/// - The bridge cannot be acquired
fn main() -> Result<()> {
    let config = load_config()?;

    // Keep the guard alive until the end of main so buffered lines are flushed
    let _log_guard = gui_async_bridge::logging::setup_logging_with_console(
        &config,
        "logs",
        "gui-async-bridge",
        true,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let dispatcher = Arc::new(HeadlessDispatcher::new());
    // load_config left the chosen configuration in the process-wide slot
    let gui = global::install_default(dispatcher.clone()).context("Failed to create façade")?;
    gui.acquire().context("Failed to acquire the bridge")?;

    tracing::info!("Bridge acquired in {:?} mode", gui.bridge_mode());

    let plain = gui.run(async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok::<_, anyhow::Error>(())
    })?;

    let slow = gui.run_with_timeout(
        async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok::<_, anyhow::Error>(())
        },
        Some(Duration::from_millis(200)),
    )?;

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let flaky = gui.run_with_retry(
        move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    anyhow::bail!("transient failure on attempt {attempt}");
                }
                Ok(attempt)
            }
        },
        Some(3),
        Some(Duration::from_millis(20)),
    )?;

    let progress = gui.run_with_progress(
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, anyhow::Error>(())
        },
        |value| tracing::info!("Progress: {:.0}%", value * 100.0),
    )?;

    // Act as the GUI thread until the bridge is idle
    let drained = dispatcher.pump_until(Duration::from_secs(10), || gui.task_count() == 0);
    if !drained {
        tracing::warn!("Tasks still running after 10s: {}", gui.task_count());
    }
    dispatcher.pump();

    let tasks = [
        ("plain", plain),
        ("timeout", slow),
        ("retry", flaky),
        ("progress", progress),
    ];
    for (label, id) in tasks {
        let status = gui
            .task_record(id)
            .map(|r| r.status)
            .unwrap_or(TaskStatus::Submitted);
        tracing::info!("{} task {} finished as {:?}", label, id, status);
    }

    let breaker = gui.circuit_breaker("demo-service");
    for _ in 0..gui.config().circuit_breaker_threshold {
        let _ = breaker.call(|| Err::<(), _>(anyhow::anyhow!("service unavailable")));
    }
    let rejected = breaker.call(|| Ok::<_, anyhow::Error>(()));
    tracing::info!(
        "Breaker '{}' is {:?}, next call rejected: {}",
        breaker.name(),
        breaker.state(),
        rejected.is_err_and(|e| e.is_rejected())
    );

    let report = gui.health();
    let yaml = serde_yaml_ng::to_string(&report).context("Failed to serialize health report")?;
    println!("{yaml}");

    let joined = gui.shutdown(None);
    tracing::info!("Demo shutdown complete (clean: {})", joined);
    Ok(())
}

/// Configuration from the YAML file named on the command line, or the
/// environment-derived process default
fn load_config() -> Result<BridgeConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let store = ConfigStore::new(path.as_str())?;
            let config = store.load()?;
            config::set_global(config.clone())?;
            Ok(config)
        }
        None => Ok(config::global().as_ref().clone()),
    }
}
