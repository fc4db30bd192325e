// UI module - GUI-side integration of the async bridge
//
// This module contains:
// - UiDispatcher: the one capability needed from a GUI toolkit (run on the GUI thread)
// - EventLoopBridge: the execution context running coroutines beside the GUI loop
// - AsyncGui: the task façade (run, timeout, retry, progress, GUI-thread invocation)

pub mod bridge;
pub mod controller;
pub mod dispatcher;
#[cfg(feature = "slint")]
pub mod slint_dispatcher;
pub mod tasks;

pub use bridge::{BridgeMode, EventLoopBridge};
pub use controller::{AsyncGui, ScopedBridge};
pub use dispatcher::{
    HeadlessDispatcher, TickerHandle, TickerStop, UiDispatcher, UiJob, spawn_pacing_ticker,
};
#[cfg(feature = "slint")]
pub use slint_dispatcher::SlintDispatcher;
pub use tasks::TaskHandle;
