//! Data models shared by the bridge, the façade and the monitor.
//!
//! - [`BridgeConfig`]: every tunable knob, validated at construction
//! - [`TaskRecord`]: lifecycle and outcome of one submitted task
//! - [`PerformanceSample`]: one periodic resource-usage snapshot
//! - [`HealthReport`]: status derived from the latest sample plus task counts

pub mod config;
pub mod sample;
pub mod task;

pub use config::BridgeConfig;
pub use sample::{HealthReport, HealthStatus, MonitoringState, PerformanceSample};
pub use task::{TaskId, TaskKind, TaskOutcome, TaskRecord, TaskStatus};
