use crate::error::{BridgeError, Result};
use crate::models::BridgeConfig;
use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::RwLock;
use serde::Deserialize;
use std::fs;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Prefix of the environment variables that override configuration defaults
pub const ENV_PREFIX: &str = "GUI_ASYNC_BRIDGE";

/// Raw environment overrides, keyed by the lower-cased variable suffix
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    event_loop_interval: Option<String>,
    idle_sleep_time: Option<String>,
    use_dedicated_thread: Option<String>,
    init_timeout: Option<String>,
    shutdown_timeout: Option<String>,
    task_timeout: Option<String>,
    max_retries: Option<String>,
    retry_delay: Option<String>,
    enable_logging: Option<String>,
    log_level: Option<String>,
    max_concurrent_tasks: Option<String>,
    task_queue_size: Option<String>,
    enable_debug_mode: Option<String>,
    enable_performance_monitoring: Option<String>,
}

impl BridgeConfig {
    /// Build a configuration from the defaults plus `GUI_ASYNC_BRIDGE_*` variables.
    ///
    /// Booleans are true only for a case-insensitive `"true"`. Numbers that fail
    /// to parse, and values that fail validation, are configuration errors.
    pub fn from_environment() -> Result<Self> {
        Self::from_env_source(config::Environment::with_prefix(ENV_PREFIX))
    }

    /// Same as [`from_environment`](Self::from_environment) with an explicit source
    pub fn from_env_source(source: config::Environment) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(source)
            .build()
            .map_err(|e| BridgeError::Configuration(format!("Failed to read environment: {e}")))?;

        let overrides: EnvOverrides = settings.try_deserialize().map_err(|e| {
            BridgeError::Configuration(format!("Failed to parse environment overrides: {e}"))
        })?;

        let mut config = BridgeConfig::default();
        apply_overrides(&mut config, overrides)?;
        config.validate()?;

        tracing::debug!("Configuration loaded from environment: {:?}", config);
        Ok(config)
    }
}

fn apply_overrides(config: &mut BridgeConfig, env: EnvOverrides) -> Result<()> {
    if let Some(v) = env.event_loop_interval {
        config.event_loop_interval = parse_secs("EVENT_LOOP_INTERVAL", &v)?;
    }
    if let Some(v) = env.idle_sleep_time {
        config.idle_sleep_time = parse_secs("IDLE_SLEEP_TIME", &v)?;
    }
    if let Some(v) = env.use_dedicated_thread {
        config.use_dedicated_thread = parse_flag(&v);
    }
    if let Some(v) = env.init_timeout {
        config.initialization_timeout = parse_secs("INIT_TIMEOUT", &v)?;
    }
    if let Some(v) = env.shutdown_timeout {
        config.shutdown_timeout = parse_secs("SHUTDOWN_TIMEOUT", &v)?;
    }
    if let Some(v) = env.task_timeout {
        config.task_timeout = parse_secs("TASK_TIMEOUT", &v)?;
    }
    if let Some(v) = env.max_retries {
        config.max_retries = parse_int("MAX_RETRIES", &v)?;
    }
    if let Some(v) = env.retry_delay {
        config.retry_delay = parse_secs("RETRY_DELAY", &v)?;
    }
    if let Some(v) = env.enable_logging {
        config.enable_logging = parse_flag(&v);
    }
    if let Some(v) = env.log_level {
        config.log_level = v.trim().to_uppercase();
    }
    if let Some(v) = env.max_concurrent_tasks {
        config.max_concurrent_tasks = parse_int("MAX_CONCURRENT_TASKS", &v)?;
    }
    if let Some(v) = env.task_queue_size {
        config.task_queue_size = parse_int("TASK_QUEUE_SIZE", &v)?;
    }
    if let Some(v) = env.enable_debug_mode {
        config.enable_debug_mode = parse_flag(&v);
    }
    if let Some(v) = env.enable_performance_monitoring {
        config.enable_performance_monitoring = parse_flag(&v);
    }
    Ok(())
}

fn parse_flag(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}

fn parse_secs(name: &str, raw: &str) -> Result<Duration> {
    let secs: f64 = raw.trim().parse().map_err(|_| {
        BridgeError::Configuration(format!("{ENV_PREFIX}_{name} is not a number: {raw}"))
    })?;
    Duration::try_from_secs_f64(secs).map_err(|_| {
        BridgeError::Configuration(format!("{ENV_PREFIX}_{name} must be positive, got {raw}"))
    })
}

fn parse_int<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        BridgeError::Configuration(format!("{ENV_PREFIX}_{name} is not an integer: {raw}"))
    })
}

/// Loads and saves [`BridgeConfig`] as YAML.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: Utf8PathBuf,
}

impl ConfigStore {
    /// Create a store for the given YAML file.
    ///
    /// The parent directory is created if it doesn't exist.
    pub fn new<P: AsRef<Utf8Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    BridgeError::Configuration(format!(
                        "Failed to create config directory {parent}: {e}"
                    ))
                })?;
            }
        }

        Ok(Self { path })
    }

    /// Load the configuration, or defaults if the file doesn't exist
    pub fn load(&self) -> Result<BridgeConfig> {
        if !self.path.exists() {
            tracing::warn!("Config file not found at {}, using defaults", self.path);
            return Ok(BridgeConfig::default());
        }

        let contents = fs::read_to_string(&self.path).map_err(|e| {
            BridgeError::Configuration(format!("Failed to read config {}: {e}", self.path))
        })?;

        let config: BridgeConfig = serde_yaml_ng::from_str(&contents).map_err(|e| {
            BridgeError::Configuration(format!("Failed to parse config {}: {e}", self.path))
        })?;
        config.validate()?;

        tracing::info!("Loaded config from {}", self.path);
        Ok(config)
    }

    /// Save the configuration after validating it
    pub fn save(&self, config: &BridgeConfig) -> Result<()> {
        config.validate()?;

        let yaml = serde_yaml_ng::to_string(config).map_err(|e| {
            BridgeError::Configuration(format!("Failed to serialize config to YAML: {e}"))
        })?;

        fs::write(&self.path, yaml).map_err(|e| {
            BridgeError::Configuration(format!("Failed to write config {}: {e}", self.path))
        })?;

        tracing::info!("Saved config to {}", self.path);
        Ok(())
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

static GLOBAL_CONFIG: OnceLock<RwLock<Option<Arc<BridgeConfig>>>> = OnceLock::new();

fn global_cell() -> &'static RwLock<Option<Arc<BridgeConfig>>> {
    GLOBAL_CONFIG.get_or_init(|| RwLock::new(None))
}

/// Process-wide default configuration, built from the environment on first use.
///
/// Meant for the composition root; components take their configuration explicitly.
pub fn global() -> Arc<BridgeConfig> {
    if let Some(config) = global_cell().read().as_ref() {
        return config.clone();
    }

    let mut slot = global_cell().write();
    if let Some(config) = slot.as_ref() {
        return config.clone();
    }

    let config = BridgeConfig::from_environment().unwrap_or_else(|e| {
        tracing::warn!("Ignoring invalid environment configuration: {}", e);
        BridgeConfig::default()
    });
    let config = Arc::new(config);
    *slot = Some(config.clone());
    config
}

/// Replace the process-wide configuration wholesale
pub fn set_global(config: BridgeConfig) -> Result<()> {
    config.validate()?;
    *global_cell().write() = Some(Arc::new(config));
    Ok(())
}

/// Forget the process-wide configuration; the next [`global`] call rebuilds it
pub fn reset_global() {
    *global_cell().write() = None;
}
