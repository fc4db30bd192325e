// SlintDispatcher - UiDispatcher backed by the Slint event loop
//
// - dispatch maps onto slint::invoke_from_event_loop
// - start_ticker re-arms a slint::Timer::single_shot on the event-loop thread
//
// Slint has no "does an application exist" query, so the host marks the dispatcher
// closed when its event loop exits.

use crate::error::{BridgeError, Result};
use crate::ui::dispatcher::{TickFn, TickerHandle, UiDispatcher, UiJob};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct SlintDispatcher {
    closed: AtomicBool,
}

impl SlintDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call once `slint::run_event_loop` has returned
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl UiDispatcher for SlintDispatcher {
    fn dispatch(&self, job: UiJob) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BridgeError::ThreadSafety(
                "Slint event loop has exited".to_string(),
            ));
        }

        slint::invoke_from_event_loop(job).map_err(|e| {
            BridgeError::ThreadSafety(format!("Failed to queue job to event loop: {e:?}"))
        })
    }

    fn has_application(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn start_ticker(&self, interval: Duration, tick: TickFn) -> Result<TickerHandle> {
        let stopped = Arc::new(AtomicBool::new(false));
        let timer_stopped = stopped.clone();

        self.dispatch(Box::new(move || {
            arm(interval, Rc::new(RefCell::new(tick)), timer_stopped);
        }))?;

        Ok(TickerHandle::new(stopped))
    }
}

/// Schedule the next tick; runs on the event-loop thread
fn arm(interval: Duration, tick: Rc<RefCell<TickFn>>, stopped: Arc<AtomicBool>) {
    slint::Timer::single_shot(interval, move || {
        if stopped.load(Ordering::SeqCst) {
            tracing::debug!("Slint ticker stopped");
            return;
        }
        (tick.borrow_mut())();
        arm(interval, tick, stopped);
    });
}
