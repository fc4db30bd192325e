// EventLoopBridge - Runs coroutines alongside the GUI event loop without blocking it
//
// Two strategies share one scheduler abstraction (a current-thread tokio runtime plus
// the set of tasks spawned on it):
// 1. DedicatedThread: a worker thread owns the runtime and runs an idle loop until
//    shutdown is signaled. Submissions from the GUI thread are handed off through
//    the runtime handle.
// 2. SharedTimer: the runtime lives on the GUI thread and a recurring GUI-thread
//    ticker drives it for one idle slice per tick.
//
// Both idle loops record how far each idle sleep overshot into a LoopLatency gauge,
// and both tear down the same way: cancel every tracked task, wait for them to
// unwind within the budget, then shut the runtime down.

use crate::error::{BridgeError, Result};
use crate::models::BridgeConfig;
use crate::monitor::LoopLatency;
use crate::ui::dispatcher::{TickerHandle, TickerStop, UiDispatcher};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, OnceLock, mpsc};
use std::thread::{JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Execution strategy of a bridge handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeMode {
    DedicatedThread,
    SharedTimer,
}

impl BridgeMode {
    pub fn from_config(config: &BridgeConfig) -> Self {
        if config.use_dedicated_thread {
            BridgeMode::DedicatedThread
        } else {
            BridgeMode::SharedTimer
        }
    }
}

struct TaskSet {
    set: JoinSet<()>,
    closed: bool,
}

/// Every task spawned on one scheduler, so shutdown can cancel them
struct TaskTracker {
    inner: Mutex<TaskSet>,
}

impl TaskTracker {
    fn new() -> Self {
        Self {
            inner: Mutex::new(TaskSet {
                set: JoinSet::new(),
                closed: false,
            }),
        }
    }

    fn spawn<F>(&self, fut: F, handle: &Handle) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.inner.lock();
        if tasks.closed {
            return Err(BridgeError::EventLoop("Scheduler is closed".to_string()));
        }

        while tasks.set.try_join_next().is_some() {}
        tasks.set.spawn_on(fut, handle);
        Ok(())
    }

    fn pending(&self) -> usize {
        let mut tasks = self.inner.lock();
        while tasks.set.try_join_next().is_some() {}
        tasks.set.len()
    }

    /// Refuse further spawns and hand back everything still tracked
    fn close(&self) -> JoinSet<()> {
        let mut tasks = self.inner.lock();
        tasks.closed = true;
        std::mem::take(&mut tasks.set)
    }
}

#[derive(Clone)]
struct Scheduler {
    handle: Handle,
    tracker: Arc<TaskTracker>,
}

impl Scheduler {
    fn spawn<F>(&self, fut: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(fut, &self.handle)
    }
}

/// One idle slice: sleep, then record how far the wakeup overshot
async fn idle_slice(idle: Duration, latency: &LoopLatency) {
    let start = Instant::now();
    tokio::time::sleep(idle).await;
    latency.record(start.elapsed().saturating_sub(idle));
}

/// Cancel every task and wait up to `budget` for them to unwind.
///
/// Cancellation and panic results are discarded.
async fn drain(mut tasks: JoinSet<()>, budget: Duration) -> bool {
    if tasks.is_empty() {
        return true;
    }

    let count = tasks.len();
    tasks.abort_all();
    let drained = tokio::time::timeout(budget, async {
        while tasks.join_next().await.is_some() {}
    })
    .await
    .is_ok();

    tracing::debug!("Cancelled {} pending tasks (drained: {})", count, drained);
    drained
}

/// Drain and shut down a runtime owned by the calling thread
fn shutdown_runtime(runtime: Runtime, tasks: JoinSet<()>, budget: Duration) {
    if Handle::try_current().is_ok() {
        // Blocking on a runtime from inside another one panics
        tracing::debug!("Shutting scheduler down in the background");
        drop(tasks);
        runtime.shutdown_background();
        return;
    }

    let deadline = Instant::now() + budget;
    runtime.block_on(drain(tasks, budget));
    runtime.shutdown_timeout(deadline.saturating_duration_since(Instant::now()));
}

struct DedicatedContext {
    thread: JoinHandle<()>,
    thread_id: ThreadId,
    /// `Some(budget)` asks the worker to stop, draining within `budget`
    stop_tx: watch::Sender<Option<Duration>>,
    done_rx: mpsc::Receiver<()>,
}

impl DedicatedContext {
    fn stop(self, timeout: Duration) -> bool {
        let _ = self.stop_tx.send(Some(timeout.mul_f64(0.8)));

        if std::thread::current().id() == self.thread_id {
            tracing::warn!("Bridge released from its own worker thread; not waiting for it");
            return false;
        }

        match self.done_rx.recv_timeout(timeout) {
            Ok(()) => {
                if self.thread.join().is_err() {
                    tracing::warn!("Worker thread panicked during shutdown");
                }
                true
            }
            Err(_) => {
                tracing::warn!(
                    "Worker thread did not stop within {:.1}s, detaching it",
                    timeout.as_secs_f64()
                );
                false
            }
        }
    }
}

struct TimerContext {
    runtime: Arc<Mutex<Option<Runtime>>>,
    ticker: TickerHandle,
}

impl TimerContext {
    fn stop(self, tracker: &TaskTracker, timeout: Duration) -> bool {
        self.ticker.stop();
        let tasks = tracker.close();

        // A tick holds this lock for at most one idle slice
        let Some(mut slot) = self.runtime.try_lock_for(timeout) else {
            tracing::warn!("Scheduler is busy on the GUI thread, leaving it to the ticker");
            return false;
        };

        let runtime = slot.take();
        drop(slot);
        if let Some(runtime) = runtime {
            shutdown_runtime(runtime, tasks, timeout);
        }
        true
    }
}

enum Context {
    Dedicated(DedicatedContext),
    Timer(TimerContext),
}

/// The live execution context
struct BridgeHandle {
    mode: BridgeMode,
    scheduler: Scheduler,
    context: Context,
}

impl BridgeHandle {
    fn shutdown(self, timeout: Duration) -> bool {
        match self.context {
            Context::Dedicated(ctx) => ctx.stop(timeout),
            Context::Timer(ctx) => ctx.stop(&self.scheduler.tracker, timeout),
        }
    }
}

struct BridgeState {
    handle: Option<BridgeHandle>,
    shutdown_called: bool,
}

/// Owner of at most one live execution context
///
/// - [`acquire()`](Self::acquire) starts a context in the requested mode
/// - [`submit()`](Self::submit) spawns a future on it from any thread
/// - [`release()`](Self::release) cancels pending work and tears it down
///
/// Once released, the bridge refuses to start again until [`reset()`](Self::reset).
pub struct EventLoopBridge {
    config: Arc<BridgeConfig>,
    dispatcher: Arc<dyn UiDispatcher>,
    latency: Arc<LoopLatency>,
    state: Mutex<BridgeState>,
}

impl EventLoopBridge {
    pub fn new(
        config: Arc<BridgeConfig>,
        dispatcher: Arc<dyn UiDispatcher>,
        latency: Arc<LoopLatency>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            latency,
            state: Mutex::new(BridgeState {
                handle: None,
                shutdown_called: false,
            }),
        }
    }

    /// Start an execution context.
    ///
    /// # Errors
    /// - [`BridgeError::Initialization`] if a context is live, shutdown already
    ///   happened, or shared-timer mode is requested without a GUI application or
    ///   from a thread already inside a tokio runtime
    /// - [`BridgeError::EventLoop`] if the scheduler cannot be created or does not
    ///   come up within `initialization_timeout`
    pub fn acquire(&self, mode: BridgeMode) -> Result<()> {
        let mut state = self.state.lock();

        if state.shutdown_called {
            return Err(BridgeError::Initialization(
                "Bridge was shut down; reset it before acquiring again".to_string(),
            ));
        }
        if state.handle.is_some() {
            return Err(BridgeError::Initialization(
                "Bridge is already initialized".to_string(),
            ));
        }

        let handle = match mode {
            BridgeMode::DedicatedThread => self.start_dedicated()?,
            BridgeMode::SharedTimer => self.start_timer()?,
        };
        state.handle = Some(handle);

        tracing::info!("Event loop bridge initialized ({:?})", mode);
        Ok(())
    }

    /// Tear down the live context.
    ///
    /// Returns whether teardown finished within `timeout`. The context is gone
    /// either way. Releasing with nothing live succeeds.
    pub fn release(&self, timeout: Duration) -> bool {
        let handle = {
            let mut state = self.state.lock();
            state.shutdown_called = true;
            state.handle.take()
        };

        let Some(handle) = handle else {
            return true;
        };

        let mode = handle.mode;
        let joined = handle.shutdown(timeout);
        tracing::info!("Event loop bridge released ({:?}, joined: {})", mode, joined);
        joined
    }

    /// Spawn `fut` on the live scheduler.
    ///
    /// Fails with [`BridgeError::EventLoop`] if nothing is live or the scheduler
    /// is closing.
    pub fn submit<F>(&self, fut: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let state = self.state.lock();
        let handle = state.handle.as_ref().ok_or_else(|| {
            BridgeError::EventLoop("No active bridge; call acquire() first".to_string())
        })?;
        handle.scheduler.spawn(fut)
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().handle.is_some()
    }

    pub fn mode(&self) -> Option<BridgeMode> {
        self.state.lock().handle.as_ref().map(|h| h.mode)
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown_called
    }

    /// Allow acquiring again after a release
    pub fn reset(&self) {
        self.state.lock().shutdown_called = false;
    }

    /// Tasks spawned on the live scheduler that have not finished
    pub fn pending_tasks(&self) -> usize {
        self.state
            .lock()
            .handle
            .as_ref()
            .map_or(0, |h| h.scheduler.tracker.pending())
    }

    /// Runtime handle of the live scheduler
    pub fn runtime_handle(&self) -> Option<Handle> {
        self.state
            .lock()
            .handle
            .as_ref()
            .map(|h| h.scheduler.handle.clone())
    }

    pub fn latency(&self) -> &Arc<LoopLatency> {
        &self.latency
    }

    fn start_dedicated(&self) -> Result<BridgeHandle> {
        let (ready_tx, ready_rx) = mpsc::channel::<std::result::Result<Handle, String>>();
        let (stop_tx, stop_rx) = watch::channel(None);
        let (done_tx, done_rx) = mpsc::channel();
        let tracker = Arc::new(TaskTracker::new());

        let worker = Worker {
            tracker: Arc::clone(&tracker),
            latency: Arc::clone(&self.latency),
            idle: self.config.idle_sleep_time,
            default_budget: self.config.shutdown_timeout,
        };

        let thread = std::thread::Builder::new()
            .name("gui-async-worker".to_string())
            .spawn(move || worker.run(ready_tx, stop_rx, done_tx))
            .map_err(|e| BridgeError::EventLoop(format!("Failed to spawn worker thread: {e}")))?;
        let thread_id = thread.thread().id();

        let handle = match ready_rx.recv_timeout(self.config.initialization_timeout) {
            Ok(Ok(handle)) => handle,
            Ok(Err(msg)) => {
                let _ = thread.join();
                return Err(BridgeError::EventLoop(format!(
                    "Failed to create scheduler: {msg}"
                )));
            }
            Err(_) => {
                // Dropping stop_tx stops the worker if it ever comes up
                return Err(BridgeError::EventLoop(format!(
                    "Worker scheduler did not start within {:.1}s",
                    self.config.initialization_timeout.as_secs_f64()
                )));
            }
        };

        Ok(BridgeHandle {
            mode: BridgeMode::DedicatedThread,
            scheduler: Scheduler { handle, tracker },
            context: Context::Dedicated(DedicatedContext {
                thread,
                thread_id,
                stop_tx,
                done_rx,
            }),
        })
    }

    fn start_timer(&self) -> Result<BridgeHandle> {
        if !self.dispatcher.has_application() {
            return Err(BridgeError::Initialization(
                "Shared-timer mode requires a GUI application instance".to_string(),
            ));
        }

        // The ticker blocks on the scheduler from the GUI thread, which tokio refuses
        // inside another runtime
        if Handle::try_current().is_ok() {
            return Err(BridgeError::Initialization(
                "Shared-timer mode cannot run on a thread inside a tokio runtime; \
                 use the dedicated-thread mode"
                    .to_string(),
            ));
        }

        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| BridgeError::EventLoop(format!("Failed to create scheduler: {e}")))?;
        let scheduler = Scheduler {
            handle: runtime.handle().clone(),
            tracker: Arc::new(TaskTracker::new()),
        };
        let runtime = Arc::new(Mutex::new(Some(runtime)));

        let tick_runtime = Arc::clone(&runtime);
        let latency = Arc::clone(&self.latency);
        let idle = self.config.idle_sleep_time;
        let stopper: Arc<OnceLock<TickerStop>> = Arc::new(OnceLock::new());
        let tick_stopper = Arc::clone(&stopper);
        let ticker = self.dispatcher.start_ticker(
            self.config.event_loop_interval,
            Box::new(move || {
                // Skip the tick while release holds the runtime
                let Some(slot) = tick_runtime.try_lock() else {
                    return;
                };
                let Some(runtime) = slot.as_ref() else {
                    return;
                };
                if Handle::try_current().is_ok() {
                    tracing::error!(
                        "GUI thread entered a tokio runtime; shared-timer scheduler stopped, \
                         pending tasks will not run"
                    );
                    if let Some(stop) = tick_stopper.get() {
                        stop.stop();
                    }
                    return;
                }
                runtime.block_on(idle_slice(idle, &latency));
            }),
        );

        let ticker = match ticker {
            Ok(ticker) => {
                let _ = stopper.set(ticker.stopper());
                ticker
            }
            Err(e) => {
                if let Some(runtime) = runtime.lock().take() {
                    runtime.shutdown_background();
                }
                return Err(BridgeError::EventLoop(format!(
                    "Failed to start GUI-thread ticker: {e}"
                )));
            }
        };

        Ok(BridgeHandle {
            mode: BridgeMode::SharedTimer,
            scheduler,
            context: Context::Timer(TimerContext { runtime, ticker }),
        })
    }
}

impl Drop for EventLoopBridge {
    fn drop(&mut self) {
        if self.state.get_mut().handle.is_some() {
            self.release(self.config.shutdown_timeout);
        }
    }
}

/// Body of the dedicated worker thread
struct Worker {
    tracker: Arc<TaskTracker>,
    latency: Arc<LoopLatency>,
    idle: Duration,
    default_budget: Duration,
}

impl Worker {
    fn run(
        self,
        ready_tx: mpsc::Sender<std::result::Result<Handle, String>>,
        mut stop_rx: watch::Receiver<Option<Duration>>,
        done_tx: mpsc::Sender<()>,
    ) {
        let runtime = match Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                let _ = ready_tx.send(Err(e.to_string()));
                return;
            }
        };

        if ready_tx.send(Ok(runtime.handle().clone())).is_err() {
            return;
        }
        tracing::debug!("Worker scheduler running");

        runtime.block_on(async {
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = idle_slice(self.idle, &self.latency) => {}
                }
            }
        });

        let budget = (*stop_rx.borrow()).unwrap_or(self.default_budget);
        shutdown_runtime(runtime, self.tracker.close(), budget);

        tracing::debug!("Worker scheduler stopped");
        let _ = done_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::dispatcher::HeadlessDispatcher;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn config() -> Arc<BridgeConfig> {
        Arc::new(BridgeConfig {
            shutdown_timeout: Duration::from_secs(2),
            ..Default::default()
        })
    }

    fn bridge_with(dispatcher: Arc<HeadlessDispatcher>) -> EventLoopBridge {
        EventLoopBridge::new(config(), dispatcher, Arc::new(LoopLatency::new()))
    }

    fn bridge() -> EventLoopBridge {
        bridge_with(Arc::new(HeadlessDispatcher::new()))
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_mode_from_config() {
        let mut config = BridgeConfig::default();
        assert_eq!(BridgeMode::from_config(&config), BridgeMode::DedicatedThread);
        config.use_dedicated_thread = false;
        assert_eq!(BridgeMode::from_config(&config), BridgeMode::SharedTimer);
    }

    #[test]
    fn test_dedicated_runs_submitted_work_off_thread() {
        let bridge = bridge();
        bridge.acquire(BridgeMode::DedicatedThread).unwrap();
        assert_eq!(bridge.mode(), Some(BridgeMode::DedicatedThread));

        let (tx, rx) = mpsc::channel();
        bridge
            .submit(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                let _ = tx.send(std::thread::current().id());
            })
            .unwrap();

        let ran_on = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_ne!(ran_on, std::thread::current().id());
        assert!(bridge.release(Duration::from_secs(2)));
    }

    #[test]
    fn test_submit_without_handle_fails() {
        let bridge = bridge();
        let err = bridge.submit(async {}).unwrap_err();
        assert!(matches!(err, BridgeError::EventLoop(_)));
    }

    #[test]
    fn test_double_acquire_fails() {
        let bridge = bridge();
        bridge.acquire(BridgeMode::DedicatedThread).unwrap();
        let err = bridge.acquire(BridgeMode::DedicatedThread).unwrap_err();
        assert!(matches!(err, BridgeError::Initialization(_)));
        bridge.release(Duration::from_secs(2));
    }

    #[test]
    fn test_release_is_idempotent_and_blocks_reacquire() {
        let bridge = bridge();
        bridge.acquire(BridgeMode::DedicatedThread).unwrap();

        assert!(bridge.release(Duration::from_secs(2)));
        assert!(bridge.release(Duration::from_secs(2)));
        assert!(!bridge.is_active());

        let err = bridge.acquire(BridgeMode::DedicatedThread).unwrap_err();
        assert!(matches!(err, BridgeError::Initialization(_)));

        bridge.reset();
        bridge.acquire(BridgeMode::DedicatedThread).unwrap();
        assert!(bridge.release(Duration::from_secs(2)));
    }

    #[test]
    fn test_release_cancels_pending_work() {
        let bridge = bridge();
        bridge.acquire(BridgeMode::DedicatedThread).unwrap();

        let dropped = Arc::new(AtomicBool::new(false));
        let guard = SetOnDrop(dropped.clone());
        bridge
            .submit(async move {
                let _guard = guard;
                tokio::time::sleep(Duration::from_secs(60)).await;
            })
            .unwrap();
        assert_eq!(bridge.pending_tasks(), 1);

        let started = Instant::now();
        assert!(bridge.release(Duration::from_secs(2)));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_shared_timer_runs_on_pumping_thread() {
        let dispatcher = Arc::new(HeadlessDispatcher::new());
        let bridge = bridge_with(dispatcher.clone());
        bridge.acquire(BridgeMode::SharedTimer).unwrap();

        let ran_on = Arc::new(Mutex::new(None));
        let ran_on_task = ran_on.clone();
        bridge
            .submit(async move {
                *ran_on_task.lock() = Some(std::thread::current().id());
            })
            .unwrap();

        assert!(dispatcher.pump_until(Duration::from_secs(2), || ran_on.lock().is_some()));
        assert_eq!(*ran_on.lock(), Some(std::thread::current().id()));
        assert!(bridge.release(Duration::from_secs(2)));
    }

    #[test]
    fn test_shared_timer_requires_application() {
        let dispatcher = Arc::new(HeadlessDispatcher::new());
        dispatcher.close();
        let bridge = bridge_with(dispatcher);

        let err = bridge.acquire(BridgeMode::SharedTimer).unwrap_err();
        assert!(matches!(err, BridgeError::Initialization(_)));
        assert!(!bridge.is_active());
    }

    #[tokio::test]
    async fn test_shared_timer_refused_inside_runtime() {
        let bridge = bridge();

        let err = bridge.acquire(BridgeMode::SharedTimer).unwrap_err();
        assert!(matches!(err, BridgeError::Initialization(ref msg) if msg.contains("tokio")));
        assert!(!bridge.is_active());

        // The dedicated mode is the way out
        bridge.acquire(BridgeMode::DedicatedThread).unwrap();
        assert!(bridge.release(Duration::from_secs(2)));
    }

    #[test]
    fn test_shared_timer_stops_when_gui_thread_enters_runtime() {
        let dispatcher = Arc::new(HeadlessDispatcher::new());
        let bridge = bridge_with(dispatcher.clone());
        bridge.acquire(BridgeMode::SharedTimer).unwrap();

        let (tx, rx) = mpsc::channel();
        bridge
            .submit(async move {
                let _ = tx.send(());
            })
            .unwrap();

        let host = Builder::new_current_thread().build().unwrap();
        {
            let _entered = host.enter();
            dispatcher.pump_for(Duration::from_millis(100));
        }
        assert!(rx.try_recv().is_err());

        // The ticker is gone, so pumping outside the runtime no longer drives it
        dispatcher.pump_for(Duration::from_millis(100));
        assert!(rx.try_recv().is_err());
        assert_eq!(bridge.pending_tasks(), 1);

        assert!(bridge.release(Duration::from_secs(2)));
        assert_eq!(bridge.pending_tasks(), 0);
    }

    #[tokio::test]
    async fn test_dedicated_release_from_async_context() {
        let bridge = bridge();
        bridge.acquire(BridgeMode::DedicatedThread).unwrap();
        bridge.submit(async {}).unwrap();
        assert!(bridge.release(Duration::from_secs(2)));
    }
}
