use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use smr_proxy::{Config, Proxy};

fn manual_config(queue_size: u32) -> Config {
    Config {
        queue_size,
        polltime_ms: 0, // manual reclamation only: no background poller
        ..Config::default()
    }
}

/// Manual `reclaim_now` performance with varying garbage counts.
fn bench_manual_collection(c: &mut Criterion) {
    let mut group = c.benchmark_group("manual_collection");

    for garbage_count in [10, 50, 100, 500, 1000, 5000].iter() {
        group.bench_with_input(
            BenchmarkId::new("collect_n_garbage", garbage_count),
            garbage_count,
            |b, &garbage_count| {
                b.iter(|| {
                    let proxy = Proxy::create(Some(manual_config(garbage_count as u32 + 1))).unwrap();

                    for i in 0..garbage_count {
                        proxy.retire(Box::new(i as u64));
                    }

                    proxy.reclaim_now();
                    black_box(&proxy);
                });
            },
        );
    }

    group.finish();
}

/// Reclaim-cycle overhead scanning an increasing number of active readers.
fn bench_collection_with_readers(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_with_readers");

    for num_readers in [0, 2, 4, 8, 16].iter() {
        group.bench_with_input(
            BenchmarkId::new("readers", num_readers),
            num_readers,
            |b, &num_readers| {
                b.iter(|| {
                    let proxy = Proxy::create(Some(manual_config(101))).unwrap();

                    let references: Vec<_> = (0..num_readers).map(|_| proxy.create_reference()).collect();
                    let _guards: Vec<_> = references.iter().map(|r| r.pin()).collect();

                    for i in 0..100 {
                        proxy.retire(Box::new(i as u64));
                    }

                    proxy.reclaim_now();
                    black_box(&proxy);
                });
            },
        );
    }

    group.finish();
}

/// Repeated reclaim cycles in sequence.
fn bench_multiple_collections(c: &mut Criterion) {
    let mut group = c.benchmark_group("multiple_collections");

    for num_cycles in [5, 10, 20, 50].iter() {
        group.bench_with_input(
            BenchmarkId::new("cycles", num_cycles),
            num_cycles,
            |b, &num_cycles| {
                b.iter(|| {
                    let proxy = Proxy::create(Some(manual_config(21))).unwrap();

                    for cycle in 0..num_cycles {
                        for i in 0..20u64 {
                            proxy.retire(Box::new(cycle as u64 * 100 + i));
                        }
                        proxy.reclaim_now();
                    }

                    black_box(&proxy);
                });
            },
        );
    }

    group.finish();
}

/// Single reclaim-cycle latency with a fixed amount of garbage.
fn bench_collection_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_latency");
    group.sample_size(100);

    group.bench_function("collect_100_objects", |b| {
        b.iter(|| {
            let proxy = Proxy::create(Some(manual_config(101))).unwrap();

            for i in 0..100u64 {
                proxy.retire(Box::new(i));
            }

            proxy.reclaim_now();
            black_box(&proxy);
        });
    });

    group.finish();
}

/// Background-poller reclamation versus an explicit `reclaim_now` call.
fn bench_auto_vs_manual(c: &mut Criterion) {
    let mut group = c.benchmark_group("auto_vs_manual");

    group.bench_function("background_poller_default_interval", |b| {
        b.iter(|| {
            let proxy = Proxy::create(Some(Config {
                queue_size: 201,
                ..Config::default()
            }))
            .unwrap();

            for i in 0..200u64 {
                proxy.retire(Box::new(i));
            }

            black_box(&proxy);
        });
    });

    group.bench_function("manual_collection_200_objects", |b| {
        b.iter(|| {
            let proxy = Proxy::create(Some(manual_config(201))).unwrap();

            for i in 0..200u64 {
                proxy.retire(Box::new(i));
            }

            proxy.reclaim_now();
            black_box(&proxy);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_manual_collection,
    bench_collection_with_readers,
    bench_multiple_collections,
    bench_collection_latency,
    bench_auto_vs_manual
);
criterion_main!(benches);
