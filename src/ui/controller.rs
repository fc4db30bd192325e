// AsyncGui - Task façade over the event loop bridge
//
// This module contains the AsyncGui which coordinates between:
// - EventLoopBridge (execution context for coroutines)
// - PerformanceMonitor (task records, samples, circuit breakers)
// - TaskRegistry (live task set, queue limit, lifecycle events)
// - UiDispatcher (marshaling callables onto the GUI thread)
//
// Submission is fire-and-forget: scheduling errors are returned to the caller,
// while errors inside a task body only reach the task record, the logs and the
// event stream.

use crate::error::{BridgeError, Result};
use crate::models::{
    BridgeConfig, HealthReport, MonitoringState, TaskId, TaskKind, TaskOutcome, TaskRecord,
};
use crate::monitor::{CircuitBreaker, LoopLatency, PerformanceMonitor, PurgeStats, ResourceProbe};
use crate::state::{TaskEvent, TaskRegistry};
use crate::ui::bridge::{BridgeMode, EventLoopBridge};
use crate::ui::dispatcher::UiDispatcher;
use crate::ui::tasks::{self, Completion, ProgressReporter, TaskHandle};
use futures::FutureExt;
use std::future::Future;
use std::ops::Deref;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, broadcast, oneshot};

/// Entry point for running async work next to a GUI event loop
///
/// Owns one [`EventLoopBridge`] and enforces at most one live acquisition.
/// Every `run*` operation:
/// - assigns a [`TaskId`] and records the start with the monitor
/// - wraps the body with its policy (timeout, retry, progress)
/// - waits for a concurrency slot (`max_concurrent_tasks`) before the body runs
/// - records the terminal outcome exactly once
///
/// # Example
/// ```ignore
/// let dispatcher = Arc::new(HeadlessDispatcher::new());
/// let gui = AsyncGui::new(BridgeConfig::default(), dispatcher.clone())?;
/// gui.acquire()?;
///
/// gui.run_with_progress(
///     async { fetch_index().await },
///     |value| status_bar.set_progress(value),
/// )?;
///
/// dispatcher.pump_for(Duration::from_secs(1));
/// gui.shutdown(None);
/// ```
pub struct AsyncGui {
    config: Arc<BridgeConfig>,
    dispatcher: Arc<dyn UiDispatcher>,
    bridge: EventLoopBridge,
    monitor: Arc<PerformanceMonitor>,
    registry: Arc<TaskRegistry>,
    limiter: Arc<Semaphore>,
}

impl AsyncGui {
    /// Create a façade sampling the current process through `sysinfo`.
    ///
    /// Fails with [`BridgeError::Configuration`] if `config` is invalid.
    pub fn new(config: BridgeConfig, dispatcher: Arc<dyn UiDispatcher>) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let latency = Arc::new(LoopLatency::new());
        let monitor = PerformanceMonitor::with_sysinfo(Arc::clone(&config), Arc::clone(&latency))?;
        Ok(Self::assemble(config, dispatcher, monitor, latency))
    }

    /// Create a façade with a custom resource probe
    pub fn with_probe(
        config: BridgeConfig,
        dispatcher: Arc<dyn UiDispatcher>,
        probe: Arc<dyn ResourceProbe>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let latency = Arc::new(LoopLatency::new());
        let monitor = PerformanceMonitor::new(Arc::clone(&config), probe, Arc::clone(&latency));
        Ok(Self::assemble(config, dispatcher, monitor, latency))
    }

    fn assemble(
        config: Arc<BridgeConfig>,
        dispatcher: Arc<dyn UiDispatcher>,
        monitor: PerformanceMonitor,
        latency: Arc<LoopLatency>,
    ) -> Self {
        let bridge = EventLoopBridge::new(Arc::clone(&config), Arc::clone(&dispatcher), latency);
        let registry = Arc::new(TaskRegistry::new(config.task_queue_size));
        let limiter = Arc::new(Semaphore::new(
            config.max_concurrent_tasks.min(Semaphore::MAX_PERMITS),
        ));

        tracing::debug!(
            "Async GUI façade created (max concurrent {}, queue {})",
            config.max_concurrent_tasks,
            config.task_queue_size
        );

        Self {
            config,
            dispatcher,
            bridge,
            monitor: Arc::new(monitor),
            registry,
            limiter,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    // Lifecycle

    /// Acquire the bridge in the configured mode
    pub fn acquire(&self) -> Result<()> {
        self.acquire_with(BridgeMode::from_config(&self.config))
    }

    /// Acquire the bridge in `mode`.
    ///
    /// Starts periodic sampling when monitoring is enabled in the configuration
    /// or was requested before an execution context existed.
    pub fn acquire_with(&self, mode: BridgeMode) -> Result<()> {
        self.bridge.acquire(mode)?;

        if self.config.enable_performance_monitoring
            || self.monitor.monitoring_state() == MonitoringState::Degraded
        {
            self.start_monitoring();
        }

        if self.config.enable_debug_mode {
            tracing::debug!("Debug mode enabled for async bridge");
        }
        Ok(())
    }

    /// Acquire the bridge for the lifetime of the returned guard.
    ///
    /// Dropping the guard shuts the bridge down, including during unwinding.
    pub fn scoped(&self) -> Result<ScopedBridge<'_>> {
        self.acquire()?;
        Ok(ScopedBridge { gui: self })
    }

    /// Release the bridge with the configured shutdown timeout
    pub fn release(&self) -> bool {
        self.shutdown(None)
    }

    /// Stop monitoring, cancel pending tasks and tear the bridge down.
    ///
    /// Returns whether teardown finished within `timeout`. Never fails;
    /// calling it again is a successful no-op.
    pub fn shutdown(&self, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(self.config.shutdown_timeout);
        let was_active = self.bridge.is_active();

        self.monitor.stop_monitoring();
        let joined = self.bridge.release(timeout);

        let dropped = self.registry.clear();
        if dropped > 0 {
            tracing::debug!("Dropped {} unfinished task entries", dropped);
        }

        if was_active {
            self.monitor.metrics().log_summary();
            tracing::info!("Async bridge shutdown completed (joined: {})", joined);
        }
        joined
    }

    /// Whether a bridge handle is live
    pub fn is_initialized(&self) -> bool {
        self.bridge.is_active()
    }

    pub fn bridge_mode(&self) -> Option<BridgeMode> {
        self.bridge.mode()
    }

    /// Clear the shutdown flag and the live task set so the façade can be acquired again
    pub fn reset_for_testing(&self) {
        self.bridge.reset();
        self.registry.clear();
    }

    // Task submission

    /// Run `fut` on the bridge, fire-and-forget.
    ///
    /// # Errors
    /// - [`BridgeError::EventLoop`] if the bridge is not acquired
    /// - [`BridgeError::ResourceExhausted`] if `task_queue_size` tasks are pending
    pub fn run<F, T, E>(&self, fut: F) -> Result<TaskId>
    where
        F: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        self.submit_tracked(TaskKind::Plain, |_| tasks::outcome_of(fut))
    }

    /// Build the body with `factory` once the task starts
    pub fn run_factory<Fac, F, T, E>(&self, factory: Fac) -> Result<TaskId>
    where
        Fac: FnOnce() -> F + Send + 'static,
        F: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        self.submit_tracked(TaskKind::Plain, |_| async move {
            tasks::outcome_of(factory()).await
        })
    }

    /// Run `fut` and keep a handle to its value
    pub fn run_with_result<F, T, E>(&self, fut: F) -> Result<TaskHandle<T>>
    where
        F: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let id = self.submit_tracked(TaskKind::Plain, |_| tasks::with_result(fut, tx))?;
        Ok(TaskHandle::new(id, rx))
    }

    /// Run `fut`, cancelling it after `timeout` (default `task_timeout`).
    ///
    /// Expiry is recorded on the task as a [`BridgeError::TaskTimeout`].
    pub fn run_with_timeout<F, T, E>(&self, fut: F, timeout: Option<Duration>) -> Result<TaskId>
    where
        F: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        let limit = timeout.unwrap_or(self.config.task_timeout);
        if limit.is_zero() {
            return Err(BridgeError::Configuration(
                "Task timeout must be positive".to_string(),
            ));
        }

        self.submit_tracked(TaskKind::Timeout, |_| tasks::with_timeout(fut, limit))
    }

    /// Run a body built by `factory`, retrying failures.
    ///
    /// Makes up to `max_retries + 1` attempts (default `max_retries` from the
    /// configuration), sleeping `retry_delay` between them. Exhaustion is recorded
    /// as a [`BridgeError::TaskExecution`] carrying the last failure.
    pub fn run_with_retry<Fac, F, T, E>(
        &self,
        factory: Fac,
        max_retries: Option<u32>,
        retry_delay: Option<Duration>,
    ) -> Result<TaskId>
    where
        Fac: FnMut() -> F + Send + 'static,
        F: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        let max_retries = max_retries.unwrap_or(self.config.max_retries);
        let delay = retry_delay.unwrap_or(self.config.retry_delay);
        let monitor = Arc::clone(&self.monitor);

        self.submit_tracked(TaskKind::Retry, move |id| {
            tasks::with_retry(id, factory, max_retries, delay, monitor)
        })
    }

    /// Run `fut`, reporting 0.0 before and 1.0 after it on the GUI thread.
    ///
    /// The second report happens whether the body succeeds, fails or panics.
    pub fn run_with_progress<F, T, E, C>(&self, fut: F, callback: C) -> Result<TaskId>
    where
        F: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
        C: Fn(f32) + Send + Sync + 'static,
    {
        let reporter = ProgressReporter {
            dispatcher: Arc::clone(&self.dispatcher),
            callback: Arc::new(callback),
            monitor: Arc::clone(&self.monitor),
        };

        self.submit_tracked(TaskKind::Progress, |_| tasks::with_progress(fut, reporter))
    }

    /// Queue `callable` to run once on the GUI thread.
    ///
    /// Does not need an acquired bridge. Fails with [`BridgeError::ThreadSafety`]
    /// when no GUI application exists or the dispatcher refuses the job.
    pub fn invoke_on_gui_thread<C>(&self, callable: C) -> Result<()>
    where
        C: FnOnce() + Send + 'static,
    {
        if !self.dispatcher.has_application() {
            return Err(BridgeError::ThreadSafety(
                "No GUI application instance exists".to_string(),
            ));
        }

        self.dispatcher
            .dispatch(Box::new(callable))
            .map_err(|e| {
                tracing::error!("Failed to invoke on GUI thread: {}", e);
                match e {
                    BridgeError::ThreadSafety(_) => e,
                    other => BridgeError::ThreadSafety(other.to_string()),
                }
            })?;

        self.monitor.metrics().record_gui_invocation();
        Ok(())
    }

    fn submit_tracked<B, Fut>(&self, kind: TaskKind, build: B) -> Result<TaskId>
    where
        B: FnOnce(TaskId) -> Fut,
        Fut: Future<Output = TaskOutcome> + Send + 'static,
    {
        if !self.bridge.is_active() {
            return Err(BridgeError::EventLoop(
                "No active bridge; call acquire() first".to_string(),
            ));
        }

        let id = TaskId::new();
        self.registry.admit(id, kind)?;
        self.monitor.record_start(id, kind);

        let body = build(id);
        let completion = Completion::new(id, Arc::clone(&self.monitor), Arc::clone(&self.registry));
        let monitor = Arc::clone(&self.monitor);
        let registry = Arc::clone(&self.registry);
        let limiter = Arc::clone(&self.limiter);

        let task = async move {
            let _permit = limiter.acquire_owned().await.ok();
            monitor.record_running(id);
            registry.mark_started(id);

            let outcome = match AssertUnwindSafe(body).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => TaskOutcome::task_error(tasks::panic_message(panic.as_ref())),
            };
            completion.finish(outcome);
        };

        // On failure the dropped task records itself as cancelled
        self.bridge.submit(task)?;

        tracing::debug!(task_id = %id, ?kind, "Task scheduled");
        Ok(id)
    }

    // Observation

    /// Tasks submitted but not yet finished
    pub fn task_count(&self) -> usize {
        self.registry.count()
    }

    pub fn task_record(&self, id: TaskId) -> Option<TaskRecord> {
        self.monitor.task_record(id)
    }

    /// Receive [`TaskEvent`]s for every task submitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.registry.subscribe()
    }

    /// Monitor health plus bridge state
    pub fn health(&self) -> HealthReport {
        let mut report = self.monitor.health();
        report.initialized = self.is_initialized();
        report.bridge_mode = self.bridge.mode();
        report.active_tasks = self.registry.count();
        report
    }

    /// The breaker registered under `name`, created on first use
    pub fn circuit_breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        self.monitor.circuit_breaker(name)
    }

    // Monitoring

    /// Start periodic sampling on the bridge's scheduler.
    ///
    /// Without a live bridge monitoring is marked degraded and starts on the
    /// next acquisition.
    pub fn start_monitoring(&self) -> MonitoringState {
        if !self.bridge.is_active() {
            tracing::warn!("No execution context for performance monitoring, marking it degraded");
            self.monitor.mark_degraded();
            return MonitoringState::Degraded;
        }

        if let Some(sampling) = self.monitor.sampling_task() {
            if let Err(e) = self.bridge.submit(sampling) {
                tracing::warn!("Could not start sampling loop: {}", e);
                self.monitor.mark_degraded();
            }
        }
        self.monitor.monitoring_state()
    }

    pub fn stop_monitoring(&self) {
        self.monitor.stop_monitoring();
    }

    /// Purge task records and samples older than `task_retention`
    pub fn cleanup_resources(&self) -> PurgeStats {
        self.monitor.purge_stale(self.config.task_retention)
    }
}

/// Guard returned by [`AsyncGui::scoped`]; shuts the bridge down on drop
pub struct ScopedBridge<'a> {
    gui: &'a AsyncGui,
}

impl Deref for ScopedBridge<'_> {
    type Target = AsyncGui;

    fn deref(&self) -> &AsyncGui {
        self.gui
    }
}

impl Drop for ScopedBridge<'_> {
    fn drop(&mut self) {
        self.gui.shutdown(None);
    }
}
