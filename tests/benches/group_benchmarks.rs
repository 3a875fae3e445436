//! # Peer Group Benchmarks
//!
//! | Operation | What is measured |
//! |-----------|------------------|
//! | Subgroup lifecycle | Build a standard child, start it, release it |
//! | Convergence | Root construction with a chain of K waiting services |
//! | Store search | Attribute lookup in an in-memory store of N records |

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use peer_group::{ContentStore, GroupBuilder, InMemoryContentStore, PeerGroupApi, DEFAULT_LIFETIME};
use pg_tests::fixtures::{Harness, ProbeSpec};
use shared_types::{AdvertisementKind, ModuleClassId, ModuleImplAdvertisement, ModuleSpecId, ATTR_MSID};

// ============================================================================
// Group lifecycle
// ============================================================================

fn bench_subgroup_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("subgroup-lifecycle");
    group.measurement_time(Duration::from_secs(10));

    let harness = Harness::new();
    let root = harness.root().expect("root group");

    group.bench_function("build_and_release_child", |b| {
        b.iter(|| {
            let child = GroupBuilder::child(&root).build().expect("child group");
            black_box(child.running_modules().len())
        })
    });

    group.finish();
}

// ============================================================================
// Startup convergence
// ============================================================================

/// A harness whose extra services each wait on the one listed after them,
/// so every round starts exactly one of them.
fn chained_harness(length: usize) -> Harness {
    let harness = Harness::new();
    let classes: Vec<ModuleClassId> = (0..length).map(|_| ModuleClassId::new()).collect();
    for (i, class_id) in classes.iter().enumerate() {
        let mut probe = ProbeSpec::ok(&format!("link-{i}"));
        if let Some(next) = classes.get(i + 1) {
            probe = probe.waits_for(*next);
        }
        harness.with_service_as(*class_id, &probe);
    }
    harness
}

fn bench_convergence(c: &mut Criterion) {
    let mut group = c.benchmark_group("convergence");

    for length in [1usize, 4, 16] {
        let harness = chained_harness(length);
        group.bench_with_input(BenchmarkId::new("dependency_chain", length), &harness, |b, h| {
            b.iter(|| {
                let root = h.root().expect("root group");
                black_box(root.start_order().len())
            })
        });
    }

    group.finish();
}

// ============================================================================
// Content store
// ============================================================================

fn bench_store_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("content-store");

    for size in [100usize, 1_000, 10_000] {
        let store = Arc::new(InMemoryContentStore::new());
        let specs: Vec<ModuleSpecId> = (0..size).map(|_| ModuleSpecId::new(ModuleClassId::new())).collect();
        for (i, spec_id) in specs.iter().enumerate() {
            let adv = ModuleImplAdvertisement::new(*spec_id, format!("bench.impl.{i}"));
            store.publish(adv.into(), DEFAULT_LIFETIME).expect("publish");
        }
        let target = specs[size / 2].to_string();

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("search_by_spec", size), &target, |b, value| {
            b.iter(|| {
                let found = store
                    .search(AdvertisementKind::ModuleImpl, ATTR_MSID, black_box(value))
                    .expect("search");
                black_box(found.len())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_subgroup_lifecycle, bench_convergence, bench_store_search);

criterion_main!(benches);
