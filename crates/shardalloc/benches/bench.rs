use core::hint::black_box;
use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use shardalloc::{AddressSpaceConfig, AllocationService, SeedStore, compute_anchor};
use std::{
    sync::{Arc, Barrier},
    thread::scope,
    time::Instant,
};
use tempfile::TempDir;

// Number of seeds registered per benchmark iteration.
const TOTAL_SEEDS: usize = 256;

fn service_in(dir: &TempDir, fsync: bool) -> AllocationService {
    let store = SeedStore::new(dir.path().join("seeds.db"), AddressSpaceConfig::default())
        .with_fsync(fsync);
    AllocationService::new(store)
}

/// Pure anchor arithmetic across every partition index.
fn bench_compute_anchor(c: &mut Criterion) {
    let config = AddressSpaceConfig::default();
    let mut group = c.benchmark_group("compute_anchor");
    group.throughput(Throughput::Elements(config.shard_count()));

    group.bench_function(format!("indices/{}", config.shard_count()), |b| {
        b.iter(|| {
            for index in 0..config.shard_count() {
                black_box(compute_anchor(black_box(index), &config));
            }
        });
    });

    group.finish();
}

/// Lookups of seeds that are already registered; these skip the writer lock.
fn bench_warm_lookup(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let service = service_in(&dir, false);
    for i in 0..TOTAL_SEEDS {
        service.allocate(&format!("node-{i}")).unwrap();
    }

    let mut group = c.benchmark_group("warm_lookup");
    group.throughput(Throughput::Elements(1));
    group.bench_function(format!("seeds/{TOTAL_SEEDS}"), |b| {
        b.iter(|| black_box(service.allocate(black_box("node-128")).unwrap()));
    });
    group.finish();
}

/// First-time registrations; each one rewrites the whole file.
fn bench_first_time_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("first_time_allocation");
    group.sample_size(10);
    group.throughput(Throughput::Elements(TOTAL_SEEDS as u64));

    for fsync in [false, true] {
        group.bench_function(format!("seeds/{TOTAL_SEEDS}/fsync/{fsync}"), |b| {
            b.iter_batched(
                || TempDir::new().unwrap(),
                |dir| {
                    let service = service_in(&dir, fsync);
                    for i in 0..TOTAL_SEEDS {
                        black_box(service.allocate(&format!("node-{i}")).unwrap());
                    }
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

/// Contended first-time registrations from several threads at once.
fn bench_contended_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_allocation");
    group.sample_size(10);

    for thread_count in [1, 2, 4, 8] {
        let seeds_per_thread = TOTAL_SEEDS / thread_count;
        group.throughput(Throughput::Elements(TOTAL_SEEDS as u64));
        group.bench_function(
            format!("seeds/{TOTAL_SEEDS}/threads/{thread_count}"),
            |b| {
                b.iter_custom(|iters| {
                    let mut total = core::time::Duration::ZERO;
                    for _ in 0..iters {
                        let dir = TempDir::new().unwrap();
                        let service = service_in(&dir, false);
                        let barrier = Arc::new(Barrier::new(thread_count));
                        let start = Instant::now();
                        scope(|s| {
                            for t in 0..thread_count {
                                let service = service.clone();
                                let barrier = Arc::clone(&barrier);
                                s.spawn(move || {
                                    barrier.wait();
                                    for i in 0..seeds_per_thread {
                                        black_box(
                                            service.allocate(&format!("node-{t}-{i}")).unwrap(),
                                        );
                                    }
                                });
                            }
                        });
                        total += start.elapsed();
                    }
                    total
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_compute_anchor,
    bench_warm_lookup,
    bench_first_time_allocation,
    bench_contended_allocation,
);

criterion_main!(benches);
