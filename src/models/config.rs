use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bridge configuration.
///
/// Every knob consumed by the bridge, the façade, the monitor and the circuit
/// breakers. Durations are written as seconds (floating point) in YAML and in
/// environment overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Interval of the recurring GUI-thread timer in shared-timer mode
    #[serde(with = "secs")]
    pub event_loop_interval: Duration,

    /// Idle slice the scheduler sleeps for on every idle-loop iteration
    #[serde(with = "secs")]
    pub idle_sleep_time: Duration,

    /// Use a dedicated worker thread (true) or a timer on the GUI thread (false)
    pub use_dedicated_thread: bool,

    #[serde(with = "secs")]
    pub initialization_timeout: Duration,

    #[serde(with = "secs")]
    pub shutdown_timeout: Duration,

    /// Default timeout for `run_with_timeout`
    #[serde(with = "secs")]
    pub task_timeout: Duration,

    /// Default retry count for `run_with_retry` (total attempts = max_retries + 1)
    pub max_retries: u32,

    #[serde(with = "secs")]
    pub retry_delay: Duration,

    pub enable_logging: bool,
    pub log_level: String,

    /// Coroutine bodies allowed to run at the same time
    pub max_concurrent_tasks: usize,

    /// Submitted-but-unfinished tasks allowed at the same time
    pub task_queue_size: usize,

    pub enable_debug_mode: bool,
    pub enable_performance_monitoring: bool,

    /// Cadence of the periodic sampling loop
    #[serde(with = "secs")]
    pub metrics_interval: Duration,

    pub enable_memory_monitoring: bool,

    /// Memory fraction (0..=1) above which the sampling loop logs a warning
    pub memory_warning_threshold: f64,

    /// Consecutive failures that open a circuit breaker
    pub circuit_breaker_threshold: u32,

    /// Slow-call threshold for guarded calls
    #[serde(with = "secs")]
    pub circuit_breaker_timeout: Duration,

    /// Time an open breaker waits after the last failure before a trial call
    #[serde(with = "secs")]
    pub circuit_breaker_recovery_time: Duration,

    /// How long completed task records and samples are retained
    #[serde(with = "secs")]
    pub task_retention: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            event_loop_interval: Duration::from_millis(10),
            idle_sleep_time: Duration::from_millis(10),
            use_dedicated_thread: true,
            initialization_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(10),
            task_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
            enable_logging: true,
            log_level: "INFO".to_string(),
            max_concurrent_tasks: 100,
            task_queue_size: 1000,
            enable_debug_mode: false,
            enable_performance_monitoring: false,
            metrics_interval: Duration::from_secs(5),
            enable_memory_monitoring: true,
            memory_warning_threshold: 0.8,
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout: Duration::from_secs(60),
            circuit_breaker_recovery_time: Duration::from_secs(300),
            task_retention: Duration::from_secs(3600),
        }
    }
}

const LOG_LEVELS: &[&str] = &["TRACE", "DEBUG", "INFO", "WARN", "WARNING", "ERROR"];

impl BridgeConfig {
    /// Check every field, failing on the first invalid one.
    ///
    /// All durations and counts must be strictly positive.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("event_loop_interval", self.event_loop_interval),
            ("idle_sleep_time", self.idle_sleep_time),
            ("initialization_timeout", self.initialization_timeout),
            ("shutdown_timeout", self.shutdown_timeout),
            ("task_timeout", self.task_timeout),
            ("retry_delay", self.retry_delay),
            ("metrics_interval", self.metrics_interval),
            ("circuit_breaker_timeout", self.circuit_breaker_timeout),
            (
                "circuit_breaker_recovery_time",
                self.circuit_breaker_recovery_time,
            ),
            ("task_retention", self.task_retention),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(BridgeError::Configuration(format!(
                    "{name} must be positive"
                )));
            }
        }

        let counts = [
            ("max_retries", self.max_retries as usize),
            ("max_concurrent_tasks", self.max_concurrent_tasks),
            ("task_queue_size", self.task_queue_size),
            (
                "circuit_breaker_threshold",
                self.circuit_breaker_threshold as usize,
            ),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(BridgeError::Configuration(format!(
                    "{name} must be positive"
                )));
            }
        }

        if !(self.memory_warning_threshold > 0.0 && self.memory_warning_threshold <= 1.0) {
            return Err(BridgeError::Configuration(format!(
                "memory_warning_threshold must be in (0, 1], got {}",
                self.memory_warning_threshold
            )));
        }

        if !LOG_LEVELS.contains(&self.log_level.to_uppercase().as_str()) {
            return Err(BridgeError::Configuration(format!(
                "unknown log_level: {}",
                self.log_level
            )));
        }

        Ok(())
    }

    /// Directive understood by `tracing_subscriber::EnvFilter`.
    ///
    /// Debug mode forces `debug` regardless of `log_level`.
    pub fn filter_directive(&self) -> &'static str {
        if self.enable_debug_mode {
            return "debug";
        }
        match self.log_level.to_uppercase().as_str() {
            "TRACE" => "trace",
            "DEBUG" => "debug",
            "WARN" | "WARNING" => "warn",
            "ERROR" => "error",
            _ => "info",
        }
    }
}

/// Durations as floating-point seconds
pub(crate) mod secs {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(raw)
            .map_err(|e| D::Error::custom(format!("invalid duration {raw}: {e}")))
    }
}
