// Task bodies and completion bookkeeping for the façade
//
// Each façade operation turns the caller's future into a future producing a
// TaskOutcome. Completion drives the monitor record and the registry exactly once,
// including for tasks cancelled before they finish.

use crate::error::BridgeError;
use crate::models::{TaskId, TaskOutcome, TaskStatus};
use crate::monitor::PerformanceMonitor;
use crate::state::TaskRegistry;
use crate::ui::dispatcher::UiDispatcher;
use anyhow::anyhow;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("Task panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("Task panicked: {msg}")
    } else {
        "Task panicked".to_string()
    }
}

/// Await a fallible body, turning its error or panic into a failure outcome
pub(crate) async fn outcome_of<F, T, E>(fut: F) -> TaskOutcome
where
    F: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(_)) => TaskOutcome::Success,
        Ok(Err(e)) => TaskOutcome::task_error(format!("{:#}", e.into())),
        Err(panic) => TaskOutcome::task_error(panic_message(panic.as_ref())),
    }
}

/// Cancel the body once `limit` has elapsed
pub(crate) async fn with_timeout<F, T, E>(fut: F, limit: Duration) -> TaskOutcome
where
    F: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    match tokio::time::timeout(limit, outcome_of(fut)).await {
        Ok(outcome) => outcome,
        Err(_) => BridgeError::TaskTimeout(format!(
            "Task exceeded timeout of {:.3}s",
            limit.as_secs_f64()
        ))
        .into(),
    }
}

/// Build and await a fresh body up to `max_retries + 1` times
pub(crate) async fn with_retry<Fac, F, T, E>(
    id: TaskId,
    mut factory: Fac,
    max_retries: u32,
    delay: Duration,
    monitor: Arc<PerformanceMonitor>,
) -> TaskOutcome
where
    Fac: FnMut() -> F,
    F: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    let attempts = max_retries.saturating_add(1);
    let mut attempt = 1;

    loop {
        let message = match outcome_of(factory()).await {
            TaskOutcome::Success => return TaskOutcome::Success,
            TaskOutcome::Failure { message, .. } => message,
        };

        if attempt >= attempts {
            return BridgeError::TaskExecution(format!(
                "Task failed after {attempts} attempts: {message}"
            ))
            .into();
        }

        tracing::warn!(
            task_id = %id,
            "Attempt {}/{} failed: {}; retrying in {:.2}s",
            attempt,
            attempts,
            message,
            delay.as_secs_f64()
        );
        monitor.metrics().record_retry();
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Posts progress values onto the GUI thread
pub(crate) struct ProgressReporter {
    pub(crate) dispatcher: Arc<dyn UiDispatcher>,
    pub(crate) callback: Arc<dyn Fn(f32) + Send + Sync>,
    pub(crate) monitor: Arc<PerformanceMonitor>,
}

impl ProgressReporter {
    fn report(&self, value: f32) {
        let callback = Arc::clone(&self.callback);
        if let Err(e) = self.dispatcher.dispatch(Box::new(move || callback(value))) {
            tracing::warn!("Failed to post progress {:.1} to the GUI thread: {}", value, e);
            self.monitor.metrics().record_progress_dispatch_failure();
        }
    }
}

/// Report 0.0 before the body and 1.0 after it, whatever the outcome
pub(crate) async fn with_progress<F, T, E>(fut: F, reporter: ProgressReporter) -> TaskOutcome
where
    F: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    reporter.report(0.0);
    let outcome = outcome_of(fut).await;
    reporter.report(1.0);
    outcome
}

/// Await the body and hand its value to a [`TaskHandle`]
pub(crate) async fn with_result<F, T, E>(
    fut: F,
    tx: oneshot::Sender<anyhow::Result<T>>,
) -> TaskOutcome
where
    F: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => {
            let _ = tx.send(Ok(value));
            TaskOutcome::Success
        }
        Ok(Err(e)) => {
            let e = e.into();
            let message = format!("{e:#}");
            let _ = tx.send(Err(e));
            TaskOutcome::task_error(message)
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            let _ = tx.send(Err(anyhow!(message.clone())));
            TaskOutcome::task_error(message)
        }
    }
}

/// Awaitable result of a task submitted with `run_with_result`
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: TaskId,
    rx: oneshot::Receiver<anyhow::Result<T>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(id: TaskId, rx: oneshot::Receiver<anyhow::Result<T>>) -> Self {
        Self { id, rx }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Wait for the task's value or error
    pub async fn wait(self) -> anyhow::Result<T> {
        let id = self.id;
        self.rx.await.unwrap_or_else(|_| Err(cancelled(id)))
    }

    /// Block the calling thread until the task finishes.
    ///
    /// Panics if called from within an async context.
    pub fn blocking_wait(self) -> anyhow::Result<T> {
        let id = self.id;
        self.rx.blocking_recv().unwrap_or_else(|_| Err(cancelled(id)))
    }

    /// The result if the task has finished, without waiting
    pub fn try_take(&mut self) -> Option<anyhow::Result<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(cancelled(self.id))),
        }
    }
}

fn cancelled(id: TaskId) -> anyhow::Error {
    anyhow!("Task {id} ended without producing a result")
}

/// Records a task's outcome once; a guard dropped unfinished records a cancellation
pub(crate) struct Completion {
    id: TaskId,
    monitor: Arc<PerformanceMonitor>,
    registry: Arc<TaskRegistry>,
    done: bool,
}

impl Completion {
    pub(crate) fn new(
        id: TaskId,
        monitor: Arc<PerformanceMonitor>,
        registry: Arc<TaskRegistry>,
    ) -> Self {
        Self {
            id,
            monitor,
            registry,
            done: false,
        }
    }

    pub(crate) fn finish(mut self, outcome: TaskOutcome) {
        self.done = true;
        self.record(&outcome);
    }

    fn record(&self, outcome: &TaskOutcome) {
        if !self.monitor.record_completion(self.id, outcome) {
            return;
        }

        let error = match outcome {
            TaskOutcome::Success => {
                tracing::debug!(task_id = %self.id, "Task completed");
                None
            }
            TaskOutcome::Failure { message, .. } => {
                if outcome.status() == TaskStatus::TimedOut {
                    tracing::warn!(task_id = %self.id, "Task timed out: {}", message);
                } else {
                    tracing::error!(task_id = %self.id, "Task failed: {}", message);
                }
                Some(message.clone())
            }
        };

        self.registry.finish(self.id, outcome.status(), error);
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.done {
            let cancelled = BridgeError::EventLoop("Task cancelled before completion".to_string());
            self.record(&cancelled.into());
        }
    }
}
