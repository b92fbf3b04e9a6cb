//! Immediate and queued dispatch benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fsmkit_core::{AdvanceResult, AllocationPolicy, Event, Subject, Table};
use fsmkit_runtime::{Config, DispatchMode, Machine, Runtime};
use std::sync::Arc;
use tokio::runtime::Runtime as TokioRuntime;
use tokio::sync::{mpsc, Mutex};

const BATCH: usize = 100;

struct Switch;

impl Subject for Switch {
    fn class_id(&self) -> &str {
        "SWITCH"
    }
}

fn switch_table(allocation: AllocationPolicy) -> Table {
    let mut table = Table::new("SWITCH");
    let off = table.add_state("Off").unwrap();
    let on = table.add_state("On").unwrap();
    table.add_transition(off, "toggle", on).unwrap();
    table.add_transition(on, "toggle", off).unwrap();
    table.set_initial_state(off).unwrap();
    table.set_allocation_policy(allocation);
    table
}

fn bench_immediate(c: &mut Criterion) {
    let rt = TokioRuntime::new().unwrap();
    let runtime = Runtime::new(Config::default());
    runtime
        .register_table(switch_table(AllocationPolicy::PerInstance))
        .unwrap();
    let machine = runtime
        .create_subject("SWITCH", "bench", Switch, DispatchMode::Immediate)
        .unwrap();

    let mut group = c.benchmark_group("dispatch_immediate");
    group.throughput(Throughput::Elements(1));
    group.bench_function("post", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(machine.post(Event::new("toggle")).await.unwrap()) });
    });
    group.bench_function("try_post", |b| {
        b.iter(|| black_box(machine.try_post(Event::new("toggle")).unwrap()));
    });
    group.finish();
}

/// Posts a batch and waits until every event has completed.
async fn post_batch(machine: &Arc<Machine>, done: &Mutex<mpsc::UnboundedReceiver<AdvanceResult>>) {
    for _ in 0..BATCH {
        machine
            .post(Event::new("toggle").notify_on_completion())
            .await
            .unwrap();
    }
    let mut done = done.lock().await;
    for _ in 0..BATCH {
        done.recv().await.unwrap();
    }
}

fn bench_queued(c: &mut Criterion) {
    let rt = TokioRuntime::new().unwrap();

    let mut group = c.benchmark_group("dispatch_queued");
    group.throughput(Throughput::Elements(BATCH as u64));

    for (label, allocation) in [
        ("per_instance", AllocationPolicy::PerInstance),
        ("per_class", AllocationPolicy::PerClass),
    ] {
        let (runtime, machine, done) = rt.block_on(async {
            let runtime = Runtime::new(Config::default());
            runtime.register_table(switch_table(allocation)).unwrap();
            let machine = runtime
                .create_subject("SWITCH", label, Switch, DispatchMode::Queued)
                .unwrap();
            let (tx, rx) = mpsc::unbounded_channel();
            machine
                .on_completion(move |result| {
                    let _ = tx.send(result.clone());
                })
                .unwrap();
            (runtime, machine, Mutex::new(rx))
        });

        group.bench_with_input(BenchmarkId::new("batch", label), &label, |b, _| {
            b.to_async(&rt).iter(|| post_batch(&machine, &done));
        });

        rt.block_on(runtime.shutdown());
    }

    group.finish();
}

criterion_group!(benches, bench_immediate, bench_queued);
criterion_main!(benches);
