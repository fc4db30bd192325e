use crate::error::{BridgeError, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant, SystemTime};
use uuid::Uuid;

/// Opaque identifier of one submitted unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which façade operation submitted a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    Plain,
    Timeout,
    Retry,
    Progress,
}

/// Lifecycle of a task: `Submitted -> Running -> {Succeeded, Failed, TimedOut}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Submitted,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::TimedOut
        )
    }
}

/// How a task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failure { kind: ErrorKind, message: String },
}

impl TaskOutcome {
    /// Failure raised by the coroutine body itself
    pub fn task_error(message: impl Into<String>) -> Self {
        TaskOutcome::Failure {
            kind: ErrorKind::Task,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success)
    }

    /// Terminal status this outcome maps to
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Success => TaskStatus::Succeeded,
            TaskOutcome::Failure {
                kind: ErrorKind::TaskTimeout,
                ..
            } => TaskStatus::TimedOut,
            TaskOutcome::Failure { .. } => TaskStatus::Failed,
        }
    }
}

impl From<BridgeError> for TaskOutcome {
    fn from(err: BridgeError) -> Self {
        TaskOutcome::Failure {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Bookkeeping entry for one submitted task.
///
/// Created on submission, completed exactly once, purged after the retention window.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub started_at: SystemTime,
    pub finished_at: Option<SystemTime>,
    pub duration: Option<Duration>,
    /// `None` while pending
    pub success: Option<bool>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    started: Instant,
}

impl TaskRecord {
    pub fn new(id: TaskId, kind: TaskKind) -> Self {
        Self {
            id,
            kind,
            status: TaskStatus::Submitted,
            started_at: SystemTime::now(),
            finished_at: None,
            duration: None,
            success: None,
            error: None,
            error_kind: None,
            started: Instant::now(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Stamp the terminal state. Returns false if the record was already finished.
    pub fn finish(&mut self, outcome: &TaskOutcome) -> bool {
        if self.is_finished() {
            return false;
        }

        self.status = outcome.status();
        self.finished_at = Some(SystemTime::now());
        self.duration = Some(self.started.elapsed());
        self.success = Some(outcome.is_success());
        if let TaskOutcome::Failure { kind, message } = outcome {
            self.error = Some(message.clone());
            self.error_kind = Some(*kind);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_pending() {
        let record = TaskRecord::new(TaskId::new(), TaskKind::Plain);
        assert_eq!(record.status, TaskStatus::Submitted);
        assert!(record.success.is_none());
        assert!(record.finished_at.is_none());
    }

    #[test]
    fn test_finish_only_once() {
        let mut record = TaskRecord::new(TaskId::new(), TaskKind::Plain);
        assert!(record.finish(&TaskOutcome::Success));
        assert!(!record.finish(&TaskOutcome::task_error("late")));

        assert_eq!(record.status, TaskStatus::Succeeded);
        assert_eq!(record.success, Some(true));
        assert!(record.error.is_none());
        assert!(record.duration.is_some());
    }

    #[test]
    fn test_timeout_outcome_maps_to_timed_out() {
        let outcome: TaskOutcome = BridgeError::TaskTimeout("0.1s".into()).into();
        assert_eq!(outcome.status(), TaskStatus::TimedOut);

        let mut record = TaskRecord::new(TaskId::new(), TaskKind::Timeout);
        record.finish(&outcome);
        assert_eq!(record.success, Some(false));
        assert_eq!(record.error_kind, Some(ErrorKind::TaskTimeout));
    }
}
