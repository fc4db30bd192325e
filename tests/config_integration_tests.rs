//! Integration tests for BridgeConfig and configuration file handling
//!
//! These tests verify:
//! - YAML loading and saving through ConfigStore
//! - Partial YAML files fall back to defaults
//! - Validation of loaded and overridden values
//! - Environment overrides
//! - The process-wide configuration

use camino::Utf8PathBuf;
use gui_async_bridge::config::{self, ENV_PREFIX};
use gui_async_bridge::{BridgeConfig, BridgeError, ConfigStore};
use proptest::prelude::*;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

fn env_source(vars: &[(&str, &str)]) -> ::config::Environment {
    let map: ::config::Map<String, String> = vars
        .iter()
        .map(|(k, v)| (format!("{ENV_PREFIX}_{k}"), v.to_string()))
        .collect();
    ::config::Environment::with_prefix(ENV_PREFIX).source(Some(map))
}

#[test]
fn test_defaults_are_valid() {
    let config = BridgeConfig::default();
    config.validate().unwrap();

    assert_eq!(config.idle_sleep_time, Duration::from_millis(10));
    assert!(config.use_dedicated_thread);
    assert_eq!(config.task_timeout, Duration::from_secs(30));
    assert_eq!(config.max_retries, 3);
    assert_eq!(config.task_queue_size, 1000);
    assert!(!config.enable_performance_monitoring);
}

#[test]
fn test_save_and_load_config() {
    let (_temp_dir, dir) = create_test_config_dir();
    let store = ConfigStore::new(dir.join("bridge.yaml")).unwrap();

    let config = BridgeConfig {
        use_dedicated_thread: false,
        task_timeout: Duration::from_millis(2500),
        log_level: "DEBUG".to_string(),
        ..Default::default()
    };
    store.save(&config).unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded, config);
    assert_eq!(store.path(), dir.join("bridge.yaml").as_path());
}

#[test]
fn test_partial_yaml_keeps_defaults() {
    let (_temp_dir, dir) = create_test_config_dir();
    let path = dir.join("partial.yaml");
    fs::write(&path, "task_timeout: 1.5\nmax_retries: 7\n").unwrap();

    let loaded = ConfigStore::new(&path).unwrap().load().unwrap();
    assert_eq!(loaded.task_timeout, Duration::from_secs_f64(1.5));
    assert_eq!(loaded.max_retries, 7);
    assert_eq!(loaded.shutdown_timeout, BridgeConfig::default().shutdown_timeout);
}

#[test]
fn test_durations_written_as_seconds() {
    let (_temp_dir, dir) = create_test_config_dir();
    let store = ConfigStore::new(dir.join("bridge.yaml")).unwrap();
    store.save(&BridgeConfig::default()).unwrap();

    let contents = fs::read_to_string(store.path()).unwrap();
    assert!(contents.contains("task_timeout: 30.0"), "{contents}");
    assert!(contents.contains("retry_delay: 0.1"), "{contents}");
}

#[test]
fn test_invalid_yaml_values_rejected() {
    let (_temp_dir, dir) = create_test_config_dir();

    let path = dir.join("zero.yaml");
    fs::write(&path, "max_concurrent_tasks: 0\n").unwrap();
    let err = ConfigStore::new(&path).unwrap().load().unwrap_err();
    assert!(
        matches!(err, BridgeError::Configuration(ref msg) if msg.contains("max_concurrent_tasks"))
    );

    let path = dir.join("negative.yaml");
    fs::write(&path, "task_timeout: -3.0\n").unwrap();
    assert!(ConfigStore::new(&path).unwrap().load().is_err());

    let path = dir.join("level.yaml");
    fs::write(&path, "log_level: LOUD\n").unwrap();
    assert!(ConfigStore::new(&path).unwrap().load().is_err());
}

#[test]
fn test_save_refuses_invalid_config() {
    let (_temp_dir, dir) = create_test_config_dir();
    let store = ConfigStore::new(dir.join("bridge.yaml")).unwrap();

    let config = BridgeConfig {
        memory_warning_threshold: 1.5,
        ..Default::default()
    };
    assert!(store.save(&config).is_err());
    assert!(!store.path().exists());
}

#[test]
fn test_environment_overrides() {
    let config = BridgeConfig::from_env_source(env_source(&[
        ("EVENT_LOOP_INTERVAL", "0.5"),
        ("MAX_CONCURRENT_TASKS", "4"),
        ("TASK_QUEUE_SIZE", "16"),
        ("ENABLE_DEBUG_MODE", "TRUE"),
        ("ENABLE_LOGGING", "false"),
    ]))
    .unwrap();

    assert_eq!(config.event_loop_interval, Duration::from_millis(500));
    assert_eq!(config.max_concurrent_tasks, 4);
    assert_eq!(config.task_queue_size, 16);
    assert!(config.enable_debug_mode);
    assert!(!config.enable_logging);
    assert_eq!(config.filter_directive(), "debug");
}

#[test]
fn test_environment_rejects_garbage() {
    let err = BridgeConfig::from_env_source(env_source(&[("MAX_RETRIES", "three")])).unwrap_err();
    assert!(matches!(err, BridgeError::Configuration(_)));
}

#[test]
fn test_global_config_replaced_and_reset() {
    let custom = BridgeConfig {
        max_retries: 11,
        ..Default::default()
    };
    config::set_global(custom).unwrap();
    assert_eq!(config::global().max_retries, 11);

    let invalid = BridgeConfig {
        task_queue_size: 0,
        ..Default::default()
    };
    assert!(config::set_global(invalid).is_err());
    assert_eq!(config::global().max_retries, 11);

    config::reset_global();
    assert_ne!(config::global().max_retries, 11);
}

proptest! {
    #[test]
    fn prop_positive_durations_validate(
        idle_ms in 1u64..10_000,
        timeout_ms in 1u64..600_000,
        retries in 1u32..50,
    ) {
        let config = BridgeConfig {
            idle_sleep_time: Duration::from_millis(idle_ms),
            task_timeout: Duration::from_millis(timeout_ms),
            max_retries: retries,
            ..Default::default()
        };
        prop_assert!(config.validate().is_ok());
    }

    #[test]
    fn prop_threshold_outside_unit_interval_rejected(
        threshold in prop_oneof![-10.0f64..=0.0, 1.0001f64..10.0],
    ) {
        let config = BridgeConfig {
            memory_warning_threshold: threshold,
            ..Default::default()
        };
        prop_assert!(matches!(config.validate(), Err(BridgeError::Configuration(_))));
    }

    #[test]
    fn prop_log_level_case_insensitive(
        level in prop::sample::select(vec!["trace", "Debug", "INFO", "warning", "error"]),
    ) {
        let config = BridgeConfig {
            log_level: level.to_string(),
            ..Default::default()
        };
        prop_assert!(config.validate().is_ok());
    }
}
