//! Micro-benchmarks for the circuit breaker and the monitor's bookkeeping
//!
//! Both sit on the hot path of every guarded call and every submitted task.

use criterion::{Criterion, criterion_group, criterion_main};
use gui_async_bridge::models::{BridgeConfig, TaskId, TaskKind, TaskOutcome};
use gui_async_bridge::monitor::{
    BreakerSettings, CircuitBreaker, LoopLatency, PerformanceMonitor, ResourceProbe,
    ResourceUsage,
};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

struct FixedProbe;

impl ResourceProbe for FixedProbe {
    fn read(&self) -> gui_async_bridge::Result<ResourceUsage> {
        Ok(ResourceUsage {
            rss_bytes: 64 * 1024 * 1024,
            total_memory_bytes: 8 * 1024 * 1024 * 1024,
            cpu_percent: 1.0,
        })
    }
}

fn settings() -> BreakerSettings {
    BreakerSettings {
        threshold: 5,
        slow_call: Duration::from_secs(60),
        recovery_time: Duration::from_secs(300),
    }
}

// =============================================================================
// Circuit Breaker
// =============================================================================

fn bench_breaker(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker");

    group.bench_function("closed_success", |b| {
        let breaker = CircuitBreaker::new("bench", settings());
        b.iter(|| black_box(breaker.call(|| Ok::<_, ()>(black_box(1_u32)))));
    });

    group.bench_function("open_rejection", |b| {
        let breaker = CircuitBreaker::new("bench", settings());
        for _ in 0..5 {
            let _ = breaker.call(|| Err::<(), _>(()));
        }
        b.iter(|| black_box(breaker.call(|| Ok::<_, ()>(()))));
    });

    group.bench_function("snapshot", |b| {
        let breaker = CircuitBreaker::new("bench", settings());
        b.iter(|| black_box(breaker.snapshot()));
    });

    group.finish();
}

// =============================================================================
// Monitor bookkeeping
// =============================================================================

fn bench_monitor(c: &mut Criterion) {
    let mut group = c.benchmark_group("monitor");

    let monitor = PerformanceMonitor::new(
        Arc::new(BridgeConfig::default()),
        Arc::new(FixedProbe),
        Arc::new(LoopLatency::new()),
    );

    group.bench_function("task_lifecycle", |b| {
        b.iter(|| {
            let id = TaskId::new();
            monitor.record_start(id, TaskKind::Plain);
            monitor.record_running(id);
            black_box(monitor.record_completion(id, &TaskOutcome::Success))
        });
    });

    group.bench_function("breaker_lookup", |b| {
        monitor.circuit_breaker("lookup");
        b.iter(|| black_box(monitor.circuit_breaker(black_box("lookup"))));
    });

    group.bench_function("sample", |b| {
        b.iter(|| black_box(monitor.sample()));
    });

    group.finish();
}

criterion_group!(benches, bench_breaker, bench_monitor);
criterion_main!(benches);
