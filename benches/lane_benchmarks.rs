use criterion::{criterion_group, criterion_main, Criterion, BenchmarkId, Throughput};
use async_lanes::{Batch, Config, Executors, WorkerPool};
use tokio::time::Duration;
use std::hint::black_box;

fn create_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()
        .unwrap()
}

// Benchmark 1: lane submission, one key vs. spread over keys
fn bench_lane_submit(c: &mut Criterion) {
    let mut group = c.benchmark_group("lane_submit");

    for size in [100, 1000, 10000] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(
            BenchmarkId::new("single_key", size),
            &size,
            |b, &size| {
                let rt = create_runtime();
                let executors = Executors::new(Config::default());

                b.to_async(&rt).iter(|| {
                    let executors = &executors;
                    async move {
                        let handles: Vec<_> = (0..size)
                            .map(|i| executors.lanes().submit("bench", async move { black_box(i) }))
                            .collect();

                        for handle in handles {
                            black_box(handle.await.unwrap());
                        }
                    }
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("sixteen_keys", size),
            &size,
            |b, &size| {
                let rt = create_runtime();
                let executors = Executors::new(Config::default());
                let keys: Vec<String> = (0..16).map(|k| format!("bench-{}", k)).collect();

                b.to_async(&rt).iter(|| {
                    let executors = &executors;
                    let keys = &keys;
                    async move {
                        let handles: Vec<_> = (0..size)
                            .map(|i| executors.lanes().submit(&keys[i % 16], async move { black_box(i) }))
                            .collect();

                        for handle in handles {
                            black_box(handle.await.unwrap());
                        }
                    }
                });
            },
        );
    }

    group.finish();
}

// Benchmark 2: shared pool spawn overhead
fn bench_pool_spawn(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_spawn");

    for size in [100, 1000, 10000] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(
            BenchmarkId::new("spawn", size),
            &size,
            |b, &size| {
                let rt = create_runtime();
                let pool = rt.block_on(async { WorkerPool::new(num_cpus::get()) });

                b.to_async(&rt).iter(|| {
                    let pool = &pool;
                    async move {
                        let handles = pool.spawn_many((0..size).map(|i| async move { black_box(i) }));
                        for handle in handles {
                            black_box(handle.await.unwrap());
                        }
                    }
                });
            },
        );
    }

    group.finish();
}

// Benchmark 3: batch setup and teardown
fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");

    for cap in [1, 8, 64] {
        group.bench_with_input(
            BenchmarkId::new("run_1000", cap),
            &cap,
            |b, &cap| {
                let rt = create_runtime();

                b.to_async(&rt).iter(|| async move {
                    let results = Batch::new((0..1000).map(|i| async move { black_box(i) }))
                        .max_concurrency(cap)
                        .timeout(Duration::from_secs(10))
                        .run()
                        .await
                        .unwrap();
                    black_box(results);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_lane_submit, bench_pool_spawn, bench_batch);
criterion_main!(benches);
