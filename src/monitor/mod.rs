// Performance monitor
//
// Owns:
// - the task-record table (start, running, completion exactly once)
// - a bounded ring of performance samples
// - the named circuit breakers
// - the periodic sampling loop, driven by the bridge's scheduler

pub mod breaker;
pub mod probe;

pub use breaker::{BreakerError, BreakerSettings, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use probe::{ResourceProbe, ResourceUsage, SysinfoProbe};

use crate::error::Result;
use crate::metrics::BridgeMetrics;
use crate::models::{
    BridgeConfig, HealthReport, HealthStatus, MonitoringState, PerformanceSample, TaskId, TaskKind,
    TaskOutcome, TaskRecord, TaskStatus,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::watch;

/// Samples kept in the ring; the oldest is evicted first
pub const SAMPLE_CAPACITY: usize = 1000;

/// Loop latency above which the sampling loop logs a warning
pub const LATENCY_WARNING_MS: f64 = 100.0;

/// Event-loop latency gauge.
///
/// The bridge's idle loop stores how far each idle sleep overshot; the monitor
/// reads the latest value into every sample.
#[derive(Debug, Default)]
pub struct LoopLatency {
    micros: AtomicU64,
}

impl LoopLatency {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, overshoot: Duration) {
        self.micros
            .store(overshoot.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn get(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::Relaxed))
    }

    pub fn millis(&self) -> f64 {
        self.micros.load(Ordering::Relaxed) as f64 / 1000.0
    }
}

/// What a purge removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    pub records: usize,
    pub samples: usize,
}

struct TaskTable {
    records: HashMap<TaskId, TaskRecord>,
    completed_since_sample: u64,
    errors_since_sample: u64,
    window_start: Instant,
}

struct SamplingControl {
    state: MonitoringState,
    stop_tx: Option<watch::Sender<bool>>,
}

pub struct PerformanceMonitor {
    config: Arc<BridgeConfig>,
    probe: Arc<dyn ResourceProbe>,
    latency: Arc<LoopLatency>,
    metrics: BridgeMetrics,
    tasks: Mutex<TaskTable>,
    samples: Mutex<VecDeque<PerformanceSample>>,
    breakers: Mutex<IndexMap<String, Arc<CircuitBreaker>>>,
    sampling: Mutex<SamplingControl>,
    started: Instant,
}

impl PerformanceMonitor {
    pub fn new(
        config: Arc<BridgeConfig>,
        probe: Arc<dyn ResourceProbe>,
        latency: Arc<LoopLatency>,
    ) -> Self {
        Self {
            config,
            probe,
            latency,
            metrics: BridgeMetrics::new(),
            tasks: Mutex::new(TaskTable {
                records: HashMap::new(),
                completed_since_sample: 0,
                errors_since_sample: 0,
                window_start: Instant::now(),
            }),
            samples: Mutex::new(VecDeque::with_capacity(SAMPLE_CAPACITY)),
            breakers: Mutex::new(IndexMap::new()),
            sampling: Mutex::new(SamplingControl {
                state: MonitoringState::Disabled,
                stop_tx: None,
            }),
            started: Instant::now(),
        }
    }

    /// Monitor reading the current process through `sysinfo`
    pub fn with_sysinfo(config: Arc<BridgeConfig>, latency: Arc<LoopLatency>) -> Result<Self> {
        let probe = SysinfoProbe::new()?;
        Ok(Self::new(config, Arc::new(probe), latency))
    }

    pub fn metrics(&self) -> &BridgeMetrics {
        &self.metrics
    }

    pub fn latency(&self) -> &Arc<LoopLatency> {
        &self.latency
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    // Task bookkeeping

    pub fn record_start(&self, id: TaskId, kind: TaskKind) {
        self.tasks
            .lock()
            .records
            .insert(id, TaskRecord::new(id, kind));
        self.metrics.record_submitted();
    }

    pub fn record_running(&self, id: TaskId) {
        if let Some(record) = self.tasks.lock().records.get_mut(&id) {
            if record.status == TaskStatus::Submitted {
                record.status = TaskStatus::Running;
            }
        }
    }

    /// Stamp a task's terminal state.
    ///
    /// Returns false for unknown ids and for tasks that already finished.
    pub fn record_completion(&self, id: TaskId, outcome: &TaskOutcome) -> bool {
        let elapsed = {
            let mut tasks = self.tasks.lock();
            let Some(record) = tasks.records.get_mut(&id) else {
                tracing::debug!(task_id = %id, "Completion for unknown task ignored");
                return false;
            };
            if !record.finish(outcome) {
                return false;
            }
            let elapsed = record.duration.unwrap_or_default();

            tasks.completed_since_sample += 1;
            if !outcome.is_success() {
                tasks.errors_since_sample += 1;
            }
            elapsed
        };

        self.metrics.record_outcome(outcome, elapsed);
        true
    }

    pub fn task_record(&self, id: TaskId) -> Option<TaskRecord> {
        self.tasks.lock().records.get(&id).cloned()
    }

    pub fn task_records(&self) -> Vec<TaskRecord> {
        self.tasks.lock().records.values().cloned().collect()
    }

    /// Records not yet in a terminal state
    pub fn active_count(&self) -> usize {
        self.tasks
            .lock()
            .records
            .values()
            .filter(|r| !r.is_finished())
            .count()
    }

    /// Records that finished successfully
    pub fn completed_count(&self) -> usize {
        self.tasks
            .lock()
            .records
            .values()
            .filter(|r| r.success == Some(true))
            .count()
    }

    // Sampling

    /// Take a sample now and append it to the ring.
    ///
    /// Rates cover the window since the previous sample (at least one second);
    /// the window counters reset afterwards.
    pub fn sample(&self) -> Result<PerformanceSample> {
        self.measure(true)
    }

    /// Read the probe and rates into a sample and append it to the ring.
    ///
    /// `reset_window` starts a new rate window afterwards.
    fn measure(&self, reset_window: bool) -> Result<PerformanceSample> {
        let usage = self.probe.read()?;

        let (active_tasks, task_completion_rate, error_rate) = {
            let mut tasks = self.tasks.lock();
            let window = tasks.window_start.elapsed().as_secs_f64().max(1.0);
            let completion_rate = tasks.completed_since_sample as f64 / window;
            let error_rate = tasks.errors_since_sample as f64 / window;

            if reset_window {
                tasks.completed_since_sample = 0;
                tasks.errors_since_sample = 0;
                tasks.window_start = Instant::now();
            }

            let active = tasks.records.values().filter(|r| !r.is_finished()).count();
            (active, completion_rate, error_rate)
        };

        let sample = PerformanceSample {
            timestamp: SystemTime::now(),
            active_tasks,
            memory_usage_mb: usage.memory_mb(),
            memory_fraction: usage.memory_fraction(),
            cpu_percent: usage.cpu_percent,
            task_completion_rate,
            error_rate,
            event_loop_latency_ms: self.latency.millis(),
        };

        self.record_sample(sample.clone());
        Ok(sample)
    }

    pub fn record_sample(&self, sample: PerformanceSample) {
        let mut samples = self.samples.lock();
        if samples.len() >= SAMPLE_CAPACITY {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    /// The last `n` samples, oldest first
    pub fn recent_samples(&self, n: usize) -> Vec<PerformanceSample> {
        let samples = self.samples.lock();
        let skip = samples.len().saturating_sub(n);
        samples.iter().skip(skip).cloned().collect()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.lock().len()
    }

    /// Health derived from the latest sample.
    ///
    /// Takes a synchronous sample when none exists yet, leaving the rate window
    /// to the next periodic sample. Reports `Unknown` instead of failing when
    /// that is impossible too.
    pub fn health(&self) -> HealthReport {
        let latest = self.samples.lock().back().cloned();
        let latest = match latest {
            Some(sample) => Some(sample),
            None => match self.measure(false) {
                Ok(sample) => Some(sample),
                Err(e) => {
                    tracing::warn!("Could not take a health snapshot: {}", e);
                    None
                }
            },
        };

        let (status, message) = match &latest {
            Some(sample) => HealthStatus::classify(sample),
            None => (HealthStatus::Unknown, "No metrics available"),
        };

        HealthReport {
            status,
            message: message.to_string(),
            sample: latest,
            uptime: self.uptime(),
            active_tasks: self.active_count(),
            completed_tasks: self.completed_count(),
            monitoring: self.monitoring_state(),
            initialized: false,
            bridge_mode: None,
        }
    }

    // Periodic sampling

    pub fn monitoring_state(&self) -> MonitoringState {
        self.sampling.lock().state
    }

    /// Build the sampling loop and mark monitoring active.
    ///
    /// Returns `None` when a loop is already active. The caller spawns the
    /// returned future on a scheduler.
    pub fn sampling_task(self: &Arc<Self>) -> Option<BoxFuture<'static, ()>> {
        let mut control = self.sampling.lock();
        if control.state == MonitoringState::Active {
            return None;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        control.state = MonitoringState::Active;
        control.stop_tx = Some(stop_tx);

        tracing::info!(
            "Performance monitoring started (interval {:.1}s)",
            self.config.metrics_interval.as_secs_f64()
        );
        Some(Arc::clone(self).sampling_loop(stop_rx).boxed())
    }

    /// Monitoring was requested but there is no scheduler to run the loop on
    pub fn mark_degraded(&self) {
        let mut control = self.sampling.lock();
        control.state = MonitoringState::Degraded;
        control.stop_tx = None;
    }

    pub fn stop_monitoring(&self) {
        let mut control = self.sampling.lock();
        if let Some(stop_tx) = control.stop_tx.take() {
            let _ = stop_tx.send(true);
            tracing::info!("Performance monitoring stopped");
        }
        control.state = MonitoringState::Disabled;
    }

    async fn sampling_loop(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let interval = self.config.metrics_interval;

        loop {
            match self.sample() {
                Ok(sample) => self.check_thresholds(&sample),
                Err(e) => tracing::error!("Performance sampling failed: {}", e),
            }
            self.metrics.log_periodic();

            tokio::select! {
                _ = stop.changed() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        tracing::debug!("Sampling loop exited");
    }

    fn check_thresholds(&self, sample: &PerformanceSample) {
        if self.config.enable_memory_monitoring
            && sample.memory_fraction > self.config.memory_warning_threshold
        {
            tracing::warn!(
                "High memory usage: {:.1}% ({:.1} MB)",
                sample.memory_fraction * 100.0,
                sample.memory_usage_mb
            );
        }

        if sample.event_loop_latency_ms > LATENCY_WARNING_MS {
            tracing::warn!(
                "High event loop latency: {:.1}ms",
                sample.event_loop_latency_ms
            );
        }
    }

    // Circuit breakers

    /// The breaker registered under `name`, created on first use
    pub fn circuit_breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        if let Some(breaker) = breakers.get(name) {
            return Arc::clone(breaker);
        }

        let breaker = Arc::new(CircuitBreaker::new(
            name,
            BreakerSettings::from_config(&self.config),
        ));
        breakers.insert(name.to_string(), Arc::clone(&breaker));
        breaker
    }

    /// Snapshots of every breaker, in creation order
    pub fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
        self.breakers
            .lock()
            .values()
            .map(|b| b.snapshot())
            .collect()
    }

    // Retention

    pub fn purge_stale(&self, retention: Duration) -> PurgeStats {
        self.purge_stale_at(SystemTime::now(), retention)
    }

    /// Drop finished records and samples older than `retention` as seen from `now`
    pub fn purge_stale_at(&self, now: SystemTime, retention: Duration) -> PurgeStats {
        let Some(cutoff) = now.checked_sub(retention) else {
            return PurgeStats::default();
        };

        let records = {
            let mut tasks = self.tasks.lock();
            let before = tasks.records.len();
            tasks
                .records
                .retain(|_, r| r.finished_at.is_none_or(|t| t >= cutoff));
            before - tasks.records.len()
        };

        let samples = {
            let mut samples = self.samples.lock();
            let before = samples.len();
            samples.retain(|s| s.timestamp >= cutoff);
            before - samples.len()
        };

        if records > 0 || samples > 0 {
            tracing::debug!("Purged {} task records and {} samples", records, samples);
        }

        PurgeStats { records, samples }
    }
}
