//! Copy-on-write tree benchmarks for cowstore.
//!
//! Benchmarks for:
//! - Transactional insert operations
//! - Snapshot point lookups
//! - Snapshot range scans
//! - Small commits on a large tree, with and without cleanup

use cowstore_bench::utils::{generate_kv_pairs, generate_sequential_pairs, populated_tree};
use cowstore_common::config::TreeConfig;
use cowstore_storage::cowtree::{CowTree, ReadView};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn bench_config() -> TreeConfig {
    TreeConfig::default().with_node_budget(1 << 20)
}

/// Benchmark sequential inserts in one transaction.
fn bench_insert_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("cowtree/insert_sequential");

    for size in [1000, 10_000, 50_000].iter() {
        let pairs = generate_sequential_pairs(*size, 32);

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let tree = populated_tree(bench_config(), &pairs).unwrap();
                black_box(tree.node_count())
            });
        });
    }

    group.finish();
}

/// Benchmark random inserts in one transaction.
fn bench_insert_random(c: &mut Criterion) {
    let mut group = c.benchmark_group("cowtree/insert_random");

    for size in [1000, 10_000, 50_000].iter() {
        let pairs = generate_kv_pairs(*size, 32);

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let tree = populated_tree(bench_config(), &pairs).unwrap();
                black_box(tree.node_count())
            });
        });
    }

    group.finish();
}

/// Benchmark point lookups through a snapshot.
fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("cowtree/find");

    for size in [1000, 10_000, 50_000].iter() {
        let pairs = generate_sequential_pairs(*size, 32);
        let tree = populated_tree(bench_config(), &pairs).unwrap();
        let snapshot = tree.snapshot().unwrap();

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut found = 0;
                for (key, _) in &pairs {
                    if snapshot.find(key).unwrap().is_some() {
                        found += 1;
                    }
                }
                black_box(found)
            });
        });
    }

    group.finish();
}

/// Benchmark range scans through a snapshot.
fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("cowtree/scan");

    let pairs = generate_sequential_pairs(10_000, 32);
    let tree = populated_tree(bench_config(), &pairs).unwrap();
    let snapshot = tree.snapshot().unwrap();

    for scan_size in [100u64, 500, 1000].iter() {
        group.throughput(Throughput::Elements(*scan_size));
        group.bench_with_input(
            BenchmarkId::from_parameter(scan_size),
            scan_size,
            |b, &size| {
                b.iter(|| {
                    let results = snapshot.scan(5000..5000 + size).unwrap();
                    black_box(results.len())
                });
            },
        );
    }

    group.finish();
}

/// Benchmark small transactions against a large tree.
fn bench_small_commits(c: &mut Criterion) {
    let mut group = c.benchmark_group("cowtree/small_commits");

    let pairs = generate_sequential_pairs(10_000, 32);

    for cleanup in [false, true] {
        let name = if cleanup { "with_cleanup" } else { "no_cleanup" };
        group.bench_function(name, |b| {
            let tree: CowTree<u64, String> = populated_tree(bench_config(), &pairs).unwrap();
            let mut rng = StdRng::seed_from_u64(123);

            b.iter(|| {
                let mut txn = tree.transaction().unwrap();
                for _ in 0..8 {
                    let key = rng.gen_range(0..20_000u64);
                    if rng.gen_ratio(80, 100) {
                        txn.assign(key, String::from("updated")).unwrap();
                    } else {
                        txn.remove(&key).unwrap();
                    }
                }
                txn.commit().unwrap();

                if cleanup {
                    tree.cleanup_snapshots().unwrap();
                }
                black_box(tree.node_count())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_insert_sequential,
    bench_insert_random,
    bench_find,
    bench_scan,
    bench_small_commits,
);
criterion_main!(benches);
