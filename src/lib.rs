// gui-async-bridge - Run async tasks alongside a GUI event loop
//
// This is the library crate containing the bridge, the task façade, the
// performance monitor and the circuit breakers. The binary crate (main.rs)
// is a headless demonstration of the façade.

pub mod config;
pub mod error;
pub mod global;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::ConfigStore;
pub use error::{BridgeError, ErrorKind, Result};
pub use models::{
    BridgeConfig, HealthReport, HealthStatus, MonitoringState, PerformanceSample, TaskId,
    TaskKind, TaskRecord, TaskStatus,
};
pub use monitor::{BreakerError, CircuitBreaker, CircuitState, PerformanceMonitor, ResourceProbe};
pub use state::{TaskEvent, TaskRegistry};
pub use ui::{AsyncGui, BridgeMode, HeadlessDispatcher, ScopedBridge, TaskHandle, UiDispatcher};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
