//! Performance benchmarks for the revision store.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lineage::{
    EntityId, EntityInput, ListOptions, RevisionId, RevisionSelector, RevisionStore,
    SnapshotInput, StoreConfig, TypeTag,
};
use serde_json::json;
use tempfile::TempDir;

fn create_store(dir: &TempDir) -> RevisionStore {
    RevisionStore::create(StoreConfig {
        path: dir.path().join("ledger"),
        journal_sync_interval: 10_000,
        ..Default::default()
    })
    .unwrap()
}

fn lineage_of_depth(store: &RevisionStore, depth: usize) -> (EntityId, Vec<RevisionId>) {
    let entity = store
        .create_entity(EntityInput::new(TypeTag::base("Doc"), json!({"v": 0})))
        .unwrap();
    let ids = (0..depth)
        .map(|i| {
            store
                .append(entity.id, SnapshotInput::new(json!({"v": i})))
                .unwrap()
                .id
        })
        .collect();
    (entity.id, ids)
}

/// Benchmark revision append
fn bench_append(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let store = create_store(&dir);
    let (lineage, _) = lineage_of_depth(&store, 0);

    c.bench_function("revision_append", |b| {
        b.iter(|| {
            let input = SnapshotInput::new(json!({"data": "test"}));
            black_box(store.append(lineage, input).unwrap());
        });
    });
}

/// Benchmark append while many branches still point at the live row
fn bench_append_with_forks(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_with_forks");

    for forks in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("forks", forks), &forks, |b, &forks| {
            let dir = TempDir::new().unwrap();
            let store = create_store(&dir);
            let (source, _) = lineage_of_depth(&store, 0);

            b.iter_batched(
                || {
                    for _ in 0..forks {
                        store.branch(source, json!({})).unwrap();
                    }
                },
                |_| black_box(store.append(source, SnapshotInput::new(json!({}))).unwrap()),
                criterion::BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

/// Benchmark selector resolution with varying lineage depth
fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    for depth in [10, 100, 1000] {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir);
        let (lineage, _) = lineage_of_depth(&store, depth);

        for (name, selector) in [
            ("last", RevisionSelector::Last),
            ("previous", RevisionSelector::Previous),
            ("back_half", RevisionSelector::Back(depth as u64 / 2)),
        ] {
            group.bench_with_input(BenchmarkId::new(name, depth), &selector, |b, selector| {
                b.iter(|| {
                    black_box(
                        store
                            .resolve(lineage, selector, &ListOptions::default())
                            .unwrap(),
                    );
                });
            });
        }
    }

    group.finish();
}

/// Benchmark ancestor listing from the newest revision
fn bench_ancestors(c: &mut Criterion) {
    let mut group = c.benchmark_group("ancestors");

    for depth in [10, 100, 1000] {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir);
        let (_, ids) = lineage_of_depth(&store, depth);
        let newest = *ids.last().unwrap();

        group.bench_with_input(BenchmarkId::new("depth", depth), &newest, |b, &newest| {
            b.iter(|| {
                black_box(store.ancestors_of(newest, &ListOptions::default()).unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_append,
    bench_append_with_forks,
    bench_resolve,
    bench_ancestors,
);

criterion_main!(benches);
