//! Action throughput benchmark
//!
//! Benchmarks the critical path: action request -> state transition -> park.
//! Also measures full create/start/complete cycles and parallel fan-out.

use std::sync::Arc;
use std::time::{Duration, Instant};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;

use everruns_workflow::prelude::*;

async fn bump(instance: Arc<WorkflowInstance<()>>) -> Result<()> {
    instance.require_argument("Counter")?.update(|n: i64| n + 1)?;
    Ok(())
}

/// Run one approval from Open to Accepted
async fn approve(engine: &WorkflowEngine) {
    let instance = engine.create_workflow(ApprovalWorkflow);
    instance.start(Vec::new()).await.unwrap();
    instance
        .action(ActionRequest::new("Assign").argument(Argument::new("AssignTo", "bench")))
        .await
        .unwrap();
    instance.action("Approve").await.unwrap();
    instance.action("Accept").await.unwrap();
    instance.wait().await.unwrap();
}

/// Round trips against one parked instance (Reassign keeps it in Assigned)
fn bench_action_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("action_throughput/round_trip");
    group.throughput(Throughput::Elements(1));

    group.bench_function("reassign", |b| {
        b.to_async(&rt).iter_custom(|iters| async move {
            let engine = WorkflowEngine::new();
            let instance = engine.create_workflow(ApprovalWorkflow);
            instance.start(Vec::new()).await.unwrap();
            instance
                .action(ActionRequest::new("Assign").argument(Argument::new("AssignTo", "a")))
                .await
                .unwrap();

            let start = Instant::now();
            for _ in 0..iters {
                instance
                    .action(
                        ActionRequest::new("Reassign").argument(Argument::new("AssignTo", "b")),
                    )
                    .await
                    .unwrap();
            }
            let elapsed = start.elapsed();

            instance.cancel().await.unwrap();
            elapsed
        });
    });

    group.finish();
}

/// Full create/start/act/complete cycles
fn bench_lifecycle(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("action_throughput/lifecycle");

    for store in [false, true] {
        let label = if store { "in_memory_store" } else { "no_store" };
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("approval", label), &store, |b, &store| {
            b.to_async(&rt).iter_custom(|iters| async move {
                let config = EngineConfig::default().with_remove_completed_immediately(true);
                let engine = if store {
                    WorkflowEngine::with_store(config, Arc::new(InMemoryWorkflowStore::new()))
                } else {
                    WorkflowEngine::with_config(config)
                };

                let start = Instant::now();
                for _ in 0..iters {
                    approve(&engine).await;
                }
                start.elapsed()
            });
        });
    }

    group.finish();
}

/// Concurrent approvals on one engine
fn bench_concurrent_workflows(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("action_throughput/concurrent");

    for workflow_count in [10usize, 100] {
        group.throughput(Throughput::Elements(workflow_count as u64));
        group.bench_with_input(
            BenchmarkId::new("approvals", workflow_count),
            &workflow_count,
            |b, &workflow_count| {
                b.to_async(&rt).iter_custom(|iters| async move {
                    let mut total = Duration::ZERO;
                    for _ in 0..iters {
                        let engine = Arc::new(WorkflowEngine::with_config(
                            EngineConfig::default().with_remove_completed_immediately(true),
                        ));

                        let start = Instant::now();
                        let handles: Vec<_> = (0..workflow_count)
                            .map(|_| {
                                let engine = engine.clone();
                                tokio::spawn(async move { approve(&engine).await })
                            })
                            .collect();
                        for handle in handles {
                            handle.await.unwrap();
                        }
                        total += start.elapsed();
                    }
                    total
                });
            },
        );
    }

    group.finish();
}

/// Parallel fan-out of sequential children
fn bench_parallel_fan_out(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("action_throughput/parallel");

    for children in [4usize, 32] {
        group.throughput(Throughput::Elements(children as u64));
        group.bench_with_input(
            BenchmarkId::new("children", children),
            &children,
            |b, &children| {
                b.to_async(&rt).iter(|| async move {
                    let engine = WorkflowEngine::new();
                    let mut parallel = Parallel::new();
                    for _ in 0..children {
                        parallel.add(Sequential::new(bump), Vec::new());
                    }

                    let instance = engine.create_workflow(parallel);
                    instance
                        .start(vec![Argument::new("Counter", 0)])
                        .await
                        .unwrap();
                    instance.wait().await.unwrap();
                    assert_eq!(
                        instance.argument_value::<i64>("Counter").unwrap(),
                        children as i64
                    );
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_action_round_trip,
    bench_lifecycle,
    bench_concurrent_workflows,
    bench_parallel_fan_out,
);

criterion_main!(benches);
