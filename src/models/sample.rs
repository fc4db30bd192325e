use crate::ui::BridgeMode;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Memory fraction above which health is critical
pub const CRITICAL_MEMORY_FRACTION: f64 = 0.9;

/// Memory fraction above which health is a warning
pub const WARNING_MEMORY_FRACTION: f64 = 0.8;

/// Errors per second above which health is a warning
pub const WARNING_ERROR_RATE: f64 = 0.1;

/// One periodic resource-usage snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub timestamp: SystemTime,
    pub active_tasks: usize,
    pub memory_usage_mb: f64,
    /// Resident set size as a fraction of total system memory
    pub memory_fraction: f64,
    pub cpu_percent: f32,
    /// Completions per second since the previous sample
    pub task_completion_rate: f64,
    /// Failures per second since the previous sample
    pub error_rate: f64,
    pub event_loop_latency_ms: f64,
}

impl Default for PerformanceSample {
    fn default() -> Self {
        Self {
            timestamp: SystemTime::now(),
            active_tasks: 0,
            memory_usage_mb: 0.0,
            memory_fraction: 0.0,
            cpu_percent: 0.0,
            task_completion_rate: 0.0,
            error_rate: 0.0,
            event_loop_latency_ms: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    /// No sample could be obtained
    Unknown,
}

impl HealthStatus {
    /// Classify a sample: memory pressure first, then error rate
    pub fn classify(sample: &PerformanceSample) -> (Self, &'static str) {
        if sample.memory_fraction > CRITICAL_MEMORY_FRACTION {
            (HealthStatus::Critical, "Memory usage critical")
        } else if sample.memory_fraction > WARNING_MEMORY_FRACTION {
            (HealthStatus::Warning, "Memory usage high")
        } else if sample.error_rate > WARNING_ERROR_RATE {
            (HealthStatus::Warning, "High error rate")
        } else {
            (HealthStatus::Healthy, "All systems operational")
        }
    }
}

/// Whether periodic sampling is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitoringState {
    Disabled,
    Active,
    /// Requested, but no execution context exists to drive the sampling loop
    Degraded,
}

/// Derived health summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub message: String,
    pub sample: Option<PerformanceSample>,
    pub uptime: Duration,
    pub active_tasks: usize,
    pub completed_tasks: usize,
    pub monitoring: MonitoringState,
    pub initialized: bool,
    pub bridge_mode: Option<BridgeMode>,
}
