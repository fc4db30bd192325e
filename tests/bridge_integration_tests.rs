//! Integration tests for EventLoopBridge and the GUI dispatchers
//!
//! These tests verify:
//! - Both bridge modes run submitted work on the expected thread
//! - Release cancels pending work and is idempotent
//! - The idle loop feeds the latency gauge
//! - Pacing tickers stop when their handle is dropped

use gui_async_bridge::monitor::LoopLatency;
use gui_async_bridge::ui::{EventLoopBridge, TickerHandle, spawn_pacing_ticker};
use gui_async_bridge::{BridgeConfig, BridgeError, BridgeMode, HeadlessDispatcher, UiDispatcher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Duration;

fn create_bridge(dispatcher: Arc<HeadlessDispatcher>) -> EventLoopBridge {
    let config = BridgeConfig {
        shutdown_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    EventLoopBridge::new(Arc::new(config), dispatcher, Arc::new(LoopLatency::new()))
}

#[test]
fn test_dedicated_mode_survives_many_submissions() {
    let bridge = create_bridge(Arc::new(HeadlessDispatcher::new()));
    bridge.acquire(BridgeMode::DedicatedThread).unwrap();

    let counter = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();
    for _ in 0..100 {
        let counter = counter.clone();
        let tx = tx.clone();
        bridge
            .submit(async move {
                tokio::task::yield_now().await;
                if counter.fetch_add(1, Ordering::SeqCst) + 1 == 100 {
                    let _ = tx.send(());
                }
            })
            .unwrap();
    }

    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 100);
    assert!(bridge.release(Duration::from_secs(2)));
}

#[test]
fn test_worker_thread_is_named() {
    let bridge = create_bridge(Arc::new(HeadlessDispatcher::new()));
    bridge.acquire(BridgeMode::DedicatedThread).unwrap();

    let (tx, rx) = mpsc::channel();
    bridge
        .submit(async move {
            let _ = tx.send(std::thread::current().name().map(str::to_string));
        })
        .unwrap();

    let name = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(name.as_deref(), Some("gui-async-worker"));
    bridge.release(Duration::from_secs(2));
}

#[test]
fn test_submit_after_release_fails() {
    let bridge = create_bridge(Arc::new(HeadlessDispatcher::new()));
    bridge.acquire(BridgeMode::DedicatedThread).unwrap();
    assert!(bridge.release(Duration::from_secs(2)));

    let err = bridge.submit(async {}).unwrap_err();
    assert!(matches!(err, BridgeError::EventLoop(_)));
    assert!(bridge.is_shutdown());
    assert!(bridge.runtime_handle().is_none());
}

#[test]
fn test_idle_loop_updates_latency_gauge() {
    let latency = Arc::new(LoopLatency::new());
    let bridge = EventLoopBridge::new(
        Arc::new(BridgeConfig::default()),
        Arc::new(HeadlessDispatcher::new()),
        latency.clone(),
    );
    bridge.acquire(BridgeMode::DedicatedThread).unwrap();

    // Any real sleep overshoots by at least a few microseconds
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while latency.get().is_zero() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(!latency.get().is_zero());

    bridge.release(Duration::from_secs(2));
}

#[test]
fn test_shared_timer_release_cancels_pending_work() {
    let dispatcher = Arc::new(HeadlessDispatcher::new());
    let bridge = create_bridge(dispatcher.clone());
    bridge.acquire(BridgeMode::SharedTimer).unwrap();

    bridge
        .submit(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        })
        .unwrap();
    dispatcher.pump_for(Duration::from_millis(50));
    assert_eq!(bridge.pending_tasks(), 1);

    assert!(bridge.release(Duration::from_secs(2)));
    assert_eq!(bridge.pending_tasks(), 0);
    assert!(!bridge.is_active());
}

#[test]
fn test_shared_timer_needs_pumping() {
    let dispatcher = Arc::new(HeadlessDispatcher::new());
    let bridge = create_bridge(dispatcher.clone());
    bridge.acquire(BridgeMode::SharedTimer).unwrap();

    let (tx, rx) = mpsc::channel();
    bridge
        .submit(async move {
            let _ = tx.send(());
        })
        .unwrap();

    // Nothing drives the scheduler until the GUI thread processes ticks
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    assert!(dispatcher.pump_until(Duration::from_secs(2), || rx.try_recv().is_ok()));
    bridge.release(Duration::from_secs(2));
}

#[test]
fn test_pacing_ticker_stops_on_drop() {
    let dispatcher = Arc::new(HeadlessDispatcher::new());
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = ticks.clone();

    let handle: TickerHandle = dispatcher
        .start_ticker(
            Duration::from_millis(5),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

    assert!(dispatcher.pump_until(Duration::from_secs(2), || ticks.load(Ordering::SeqCst) >= 3));

    drop(handle);
    dispatcher.pump_for(Duration::from_millis(30));
    let after_stop = ticks.load(Ordering::SeqCst);
    dispatcher.pump_for(Duration::from_millis(50));
    assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
}

#[test]
fn test_pacing_ticker_keeps_one_tick_queued() {
    let (tx, rx) = mpsc::channel();
    let handle = spawn_pacing_ticker(
        move |job| tx.send(job).map_err(|e| BridgeError::ThreadSafety(e.to_string())),
        Duration::from_millis(2),
        Box::new(|| {}),
    )
    .unwrap();

    // Nobody runs the queued tick, so the pacing thread must not queue more
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(rx.try_iter().count(), 1);

    handle.stop();
    assert!(handle.is_stopped());
}
