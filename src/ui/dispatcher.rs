// UiDispatcher - the single capability the bridge needs from a GUI toolkit
//
// A toolkit binding provides:
// - dispatch: run a callable once on the GUI thread, as soon as possible
// - has_application: whether a GUI application instance exists
// - start_ticker: a recurring callback on the GUI thread (used by shared-timer mode)
//
// HeadlessDispatcher is a queue-backed implementation for hosts without a toolkit
// and for tests: whichever thread pumps it plays the GUI thread.

use crate::error::{BridgeError, Result};
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// A one-shot job to run on the GUI thread
pub type UiJob = Box<dyn FnOnce() + Send + 'static>;

/// A recurring tick callback
pub type TickFn = Box<dyn FnMut() + Send + 'static>;

/// Capability interface over the GUI toolkit's dispatcher
pub trait UiDispatcher: Send + Sync {
    /// Queue `job` to run once on the GUI thread.
    ///
    /// Fails with [`BridgeError::ThreadSafety`] if the job cannot be scheduled.
    fn dispatch(&self, job: UiJob) -> Result<()>;

    /// Whether a GUI application instance currently exists
    fn has_application(&self) -> bool;

    /// Invoke `tick` on the GUI thread every `interval` until the handle is stopped
    fn start_ticker(&self, interval: Duration, tick: TickFn) -> Result<TickerHandle>;
}

/// Stops a ticker when stopped or dropped
#[derive(Debug)]
pub struct TickerHandle {
    stopped: Arc<AtomicBool>,
}

impl TickerHandle {
    pub fn new(stopped: Arc<AtomicBool>) -> Self {
        Self { stopped }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// A detached switch that stops this ticker, usable from inside the tick
    pub fn stopper(&self) -> TickerStop {
        TickerStop(Arc::clone(&self.stopped))
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Stops a ticker without owning it
#[derive(Debug, Clone)]
pub struct TickerStop(Arc<AtomicBool>);

impl TickerStop {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Ticker built only on a dispatch function.
///
/// A pacing thread posts one tick onto the GUI thread per interval. At most one
/// tick is queued at a time, so a busy GUI thread never accumulates a backlog.
pub fn spawn_pacing_ticker<D>(
    dispatch: D,
    interval: Duration,
    tick: TickFn,
) -> Result<TickerHandle>
where
    D: Fn(UiJob) -> Result<()> + Send + 'static,
{
    let stopped = Arc::new(AtomicBool::new(false));
    let queued = Arc::new(AtomicBool::new(false));
    let tick = Arc::new(Mutex::new(tick));

    let thread_stopped = stopped.clone();
    std::thread::Builder::new()
        .name("gui-async-ticker".to_string())
        .spawn(move || {
            tracing::debug!("Pacing ticker started ({:?})", interval);

            while !thread_stopped.load(Ordering::SeqCst) {
                std::thread::sleep(interval);

                if queued.swap(true, Ordering::SeqCst) {
                    continue;
                }

                let tick = tick.clone();
                let queued = queued.clone();
                let job_stopped = thread_stopped.clone();
                let job: UiJob = Box::new(move || {
                    queued.store(false, Ordering::SeqCst);
                    if !job_stopped.load(Ordering::SeqCst) {
                        (tick.lock())();
                    }
                });

                if let Err(e) = dispatch(job) {
                    tracing::warn!("Pacing ticker stopped, dispatch failed: {}", e);
                    break;
                }
            }

            tracing::debug!("Pacing ticker terminated");
        })
        .map_err(|e| BridgeError::ThreadSafety(format!("Failed to spawn ticker thread: {e}")))?;

    Ok(TickerHandle::new(stopped))
}

/// Queue-backed dispatcher with no toolkit behind it.
///
/// Jobs run when a thread calls [`pump`](Self::pump) or one of its variants; that
/// thread acts as the GUI thread.
pub struct HeadlessDispatcher {
    tx: mpsc::Sender<UiJob>,
    rx: Mutex<mpsc::Receiver<UiJob>>,
    closed: Arc<AtomicBool>,
}

impl HeadlessDispatcher {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run queued jobs until the queue is empty. Returns how many ran.
    ///
    /// A panicking job is logged and does not stop the jobs queued after it.
    pub fn pump(&self) -> usize {
        let mut count = 0;
        loop {
            // Release the receiver before running, jobs may dispatch more jobs
            let job = self.rx.lock().try_recv();
            let Ok(job) = job else {
                return count;
            };
            run_job(job);
            count += 1;
        }
    }

    /// Keep running jobs as they arrive for `duration`
    pub fn pump_for(&self, duration: Duration) -> usize {
        let deadline = Instant::now() + duration;
        let mut count = 0;
        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            if let Some(job) = self.next_job(remaining.min(Duration::from_millis(5))) {
                run_job(job);
                count += 1;
            }
        }
        count
    }

    /// Run jobs until `done` returns true or `timeout` elapses. Returns `done()`.
    pub fn pump_until<F: Fn() -> bool>(&self, timeout: Duration, done: F) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if done() {
                return true;
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return done();
            };
            if let Some(job) = self.next_job(remaining.min(Duration::from_millis(5))) {
                run_job(job);
            }
        }
    }

    /// Refuse further dispatches, as if the application had quit
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn next_job(&self, wait: Duration) -> Option<UiJob> {
        self.rx.lock().recv_timeout(wait).ok()
    }
}

fn run_job(job: UiJob) {
    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(job)) {
        let msg = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!("GUI job panicked: {}", msg);
    }
}

impl Default for HeadlessDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl UiDispatcher for HeadlessDispatcher {
    fn dispatch(&self, job: UiJob) -> Result<()> {
        if self.is_closed() {
            return Err(BridgeError::ThreadSafety(
                "GUI dispatcher is closed".to_string(),
            ));
        }
        self.tx
            .send(job)
            .map_err(|_| BridgeError::ThreadSafety("GUI dispatcher queue is gone".to_string()))
    }

    fn has_application(&self) -> bool {
        !self.is_closed()
    }

    fn start_ticker(&self, interval: Duration, tick: TickFn) -> Result<TickerHandle> {
        let tx = self.tx.clone();
        let closed = self.closed.clone();
        spawn_pacing_ticker(
            move |job| {
                if closed.load(Ordering::SeqCst) {
                    return Err(BridgeError::ThreadSafety(
                        "GUI dispatcher is closed".to_string(),
                    ));
                }
                tx.send(job).map_err(|_| {
                    BridgeError::ThreadSafety("GUI dispatcher queue is gone".to_string())
                })
            },
            interval,
            tick,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn test_dispatch_runs_on_pumping_thread() {
        let dispatcher = Arc::new(HeadlessDispatcher::new());
        let ran_on = Arc::new(Mutex::new(None));

        let worker_dispatcher = dispatcher.clone();
        let ran_on_clone = ran_on.clone();
        thread::spawn(move || {
            worker_dispatcher
                .dispatch(Box::new(move || {
                    *ran_on_clone.lock() = Some(thread::current().id());
                }))
                .unwrap();
        })
        .join()
        .unwrap();

        assert_eq!(dispatcher.pump(), 1);
        assert_eq!(*ran_on.lock(), Some(thread::current().id()));
    }

    #[test]
    fn test_jobs_run_in_dispatch_order() {
        let dispatcher = HeadlessDispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = order.clone();
            dispatcher
                .dispatch(Box::new(move || order.lock().push(i)))
                .unwrap();
        }
        dispatcher.pump();
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_closed_dispatcher_rejects() {
        let dispatcher = HeadlessDispatcher::new();
        dispatcher.close();
        assert!(!dispatcher.has_application());
        let err = dispatcher.dispatch(Box::new(|| {})).unwrap_err();
        assert!(matches!(err, BridgeError::ThreadSafety(_)));
    }

    #[test]
    fn test_ticker_ticks_until_stopped() {
        let dispatcher = HeadlessDispatcher::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticks_clone = ticks.clone();

        let handle = dispatcher
            .start_ticker(
                Duration::from_millis(5),
                Box::new(move || {
                    ticks_clone.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        assert!(
            dispatcher.pump_until(Duration::from_secs(2), || ticks.load(Ordering::SeqCst) >= 3)
        );

        handle.stop();
        dispatcher.pump_for(Duration::from_millis(30));
        let after_stop = ticks.load(Ordering::SeqCst);
        dispatcher.pump_for(Duration::from_millis(30));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_panicking_job_does_not_drop_later_jobs() {
        let dispatcher = HeadlessDispatcher::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let before = ran.clone();
        dispatcher
            .dispatch(Box::new(move || {
                before.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        dispatcher
            .dispatch(Box::new(|| panic!("progress callback blew up")))
            .unwrap();
        let after = ran.clone();
        dispatcher
            .dispatch(Box::new(move || {
                after.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        assert_eq!(dispatcher.pump(), 3);
        assert_eq!(ran.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.pump(), 0);
    }

    #[test]
    fn test_stopper_halts_ticker_from_inside_tick() {
        let dispatcher = HeadlessDispatcher::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<TickerStop>>> = Arc::new(Mutex::new(None));

        let tick_count = ticks.clone();
        let tick_slot = slot.clone();
        let handle = dispatcher
            .start_ticker(
                Duration::from_millis(5),
                Box::new(move || {
                    tick_count.fetch_add(1, Ordering::SeqCst);
                    if let Some(stop) = tick_slot.lock().as_ref() {
                        stop.stop();
                    }
                }),
            )
            .unwrap();
        *slot.lock() = Some(handle.stopper());

        assert!(dispatcher.pump_until(Duration::from_secs(2), || handle.is_stopped()));
        let after_stop = ticks.load(Ordering::SeqCst);
        dispatcher.pump_for(Duration::from_millis(30));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }
}
