// Task registry module
//
// Tracks the set of tasks that have been submitted but not yet finished, enforces the
// queue limit, and emits lifecycle events for GUI code that wants to observe tasks
// without polling.

use crate::error::{BridgeError, Result};
use crate::models::{TaskId, TaskKind, TaskStatus};
use parking_lot::Mutex;
use std::collections::HashSet;
use tokio::sync::broadcast;

/// Lifecycle events emitted by the registry
#[derive(Clone, Debug, PartialEq)]
pub enum TaskEvent {
    /// A task was accepted for scheduling
    Submitted { id: TaskId, kind: TaskKind },

    /// A task acquired a concurrency slot and started running
    Started { id: TaskId },

    /// A task reached a terminal state
    Finished {
        id: TaskId,
        status: TaskStatus,
        error: Option<String>,
    },
}

/// Live task set with event emission
///
/// - [`admit()`](Self::admit) rejects new work once `capacity` tasks are pending
/// - [`subscribe()`](Self::subscribe) returns a receiver for [`TaskEvent`]s
///
/// Sending an event with no subscribers is not an error.
pub struct TaskRegistry {
    active: Mutex<HashSet<TaskId>>,
    capacity: usize,
    events_tx: broadcast::Sender<TaskEvent>,
}

impl TaskRegistry {
    /// Create a registry holding at most `capacity` pending tasks
    pub fn new(capacity: usize) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            active: Mutex::new(HashSet::new()),
            capacity,
            events_tx,
        }
    }

    /// Register a newly submitted task
    pub fn admit(&self, id: TaskId, kind: TaskKind) -> Result<()> {
        {
            let mut active = self.active.lock();
            if active.len() >= self.capacity {
                return Err(BridgeError::ResourceExhausted(format!(
                    "Task queue is full ({} pending)",
                    active.len()
                )));
            }
            active.insert(id);
        }

        let _ = self.events_tx.send(TaskEvent::Submitted { id, kind });
        Ok(())
    }

    pub fn mark_started(&self, id: TaskId) {
        if self.active.lock().contains(&id) {
            let _ = self.events_tx.send(TaskEvent::Started { id });
        }
    }

    /// Remove a task from the live set. Returns false if it was not tracked.
    pub fn finish(&self, id: TaskId, status: TaskStatus, error: Option<String>) -> bool {
        if !self.active.lock().remove(&id) {
            return false;
        }

        let _ = self
            .events_tx
            .send(TaskEvent::Finished { id, status, error });
        true
    }

    pub fn count(&self) -> usize {
        self.active.lock().len()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.active.lock().contains(&id)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forget every tracked task. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut active = self.active.lock();
        let dropped = active.len();
        active.clear();
        dropped
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events_tx.subscribe()
    }
}
