// Bridge metrics module
//
// Lock-free counters for the lifetime of one façade instance

use crate::models::TaskOutcome;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Task and dispatch counters.
///
/// Uses atomic operations so tasks running on the scheduler thread and callers on
/// the GUI thread can update them without locks. Logged on shutdown.
#[derive(Debug)]
pub struct BridgeMetrics {
    /// Tasks accepted for scheduling
    pub tasks_submitted: AtomicU64,

    /// Tasks that completed successfully
    pub tasks_succeeded: AtomicU64,

    /// Tasks that failed (including cancellations)
    pub tasks_failed: AtomicU64,

    /// Tasks that exceeded their timeout
    pub tasks_timed_out: AtomicU64,

    /// Extra attempts made by retrying tasks
    pub retry_attempts: AtomicU64,

    /// Total task run time in milliseconds
    pub total_task_time_ms: AtomicU64,

    /// Progress callbacks that could not be posted to the GUI thread
    pub progress_dispatch_failures: AtomicU64,

    /// Callables posted to the GUI thread
    pub gui_invocations: AtomicU64,

    start_time: Instant,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self {
            tasks_submitted: AtomicU64::new(0),
            tasks_succeeded: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            tasks_timed_out: AtomicU64::new(0),
            retry_attempts: AtomicU64::new(0),
            total_task_time_ms: AtomicU64::new(0),
            progress_dispatch_failures: AtomicU64::new(0),
            gui_invocations: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_submitted(&self) {
        self.tasks_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a terminal outcome and its run time
    pub fn record_outcome(&self, outcome: &TaskOutcome, elapsed: Duration) {
        let counter = match outcome.status() {
            crate::models::TaskStatus::Succeeded => &self.tasks_succeeded,
            crate::models::TaskStatus::TimedOut => &self.tasks_timed_out,
            _ => &self.tasks_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.total_task_time_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retry_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_progress_dispatch_failure(&self) {
        self.progress_dispatch_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gui_invocation(&self) {
        self.gui_invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Tasks that reached any terminal state
    pub fn tasks_finished(&self) -> u64 {
        self.tasks_succeeded.load(Ordering::Relaxed)
            + self.tasks_failed.load(Ordering::Relaxed)
            + self.tasks_timed_out.load(Ordering::Relaxed)
    }

    /// Average run time per finished task in milliseconds
    pub fn avg_task_time_ms(&self) -> f64 {
        let total = self.total_task_time_ms.load(Ordering::Relaxed);
        let count = self.tasks_finished();
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Bridge Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Tasks: {} submitted, {} succeeded, {} failed, {} timed out",
            self.tasks_submitted.load(Ordering::Relaxed),
            self.tasks_succeeded.load(Ordering::Relaxed),
            self.tasks_failed.load(Ordering::Relaxed),
            self.tasks_timed_out.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Average task time: {:.2}ms, retries: {}",
            self.avg_task_time_ms(),
            self.retry_attempts.load(Ordering::Relaxed)
        );
        tracing::info!(
            "GUI invocations: {}, progress dispatch failures: {}",
            self.gui_invocations.load(Ordering::Relaxed),
            self.progress_dispatch_failures.load(Ordering::Relaxed)
        );
    }

    /// One-line summary emitted alongside each periodic sample
    pub fn log_periodic(&self) {
        tracing::debug!(
            "Metrics: {} submitted, {} finished, {} retries, uptime {:.0}s",
            self.tasks_submitted.load(Ordering::Relaxed),
            self.tasks_finished(),
            self.retry_attempts.load(Ordering::Relaxed),
            self.uptime().as_secs_f64()
        );
    }
}

impl Default for BridgeMetrics {
    fn default() -> Self {
        Self::new()
    }
}
