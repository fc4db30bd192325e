//! Error taxonomy for the bridge.
//!
//! Every failure the library raises is a [`BridgeError`]. Errors produced inside a
//! submitted coroutine never reach the submitter; they are recorded on the task
//! record instead, tagged with the [`ErrorKind`] that ended the task.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the bridge, the task façade, the monitor and the breakers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Acquiring a bridge handle failed, or was attempted while one is live or after shutdown
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// Scheduling or executing work failed at the bridge level
    #[error("Event loop error: {0}")]
    EventLoop(String),

    /// A callable could not be scheduled on the GUI thread
    #[error("Thread safety error: {0}")]
    ThreadSafety(String),

    /// Shutdown failed. Usually reported as `false` from shutdown instead
    #[error("Shutdown failed: {0}")]
    Shutdown(String),

    /// A timeout-wrapped task exceeded its allotted duration
    #[error("Task timed out: {0}")]
    TaskTimeout(String),

    /// A retry-wrapped task exhausted all of its attempts
    #[error("Task execution failed: {0}")]
    TaskExecution(String),

    /// A circuit breaker or a queue limit rejected the request
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Invalid configuration or a missing runtime capability
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Copyable tag identifying which [`BridgeError`] variant occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Initialization,
    EventLoop,
    ThreadSafety,
    Shutdown,
    TaskTimeout,
    TaskExecution,
    ResourceExhausted,
    Configuration,
    /// The coroutine body itself returned an error or panicked
    Task,
}

impl BridgeError {
    /// The kind tag of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Initialization(_) => ErrorKind::Initialization,
            BridgeError::EventLoop(_) => ErrorKind::EventLoop,
            BridgeError::ThreadSafety(_) => ErrorKind::ThreadSafety,
            BridgeError::Shutdown(_) => ErrorKind::Shutdown,
            BridgeError::TaskTimeout(_) => ErrorKind::TaskTimeout,
            BridgeError::TaskExecution(_) => ErrorKind::TaskExecution,
            BridgeError::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            BridgeError::Configuration(_) => ErrorKind::Configuration,
        }
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, BridgeError>;
