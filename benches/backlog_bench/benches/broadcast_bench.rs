//! Change-detection and fan-out benchmarks
//!
//! Measures snapshot comparison, JSON encoding and one broadcast round over
//! a growing number of subscribers.

use backlog_core::{Broadcaster, Row, Snapshot, SnapshotStore, SubscriberRegistry};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

fn backlog(rows: usize, offset: i64) -> Snapshot {
    (0..rows as i64)
        .rev()
        .map(|id| {
            Row::new()
                .with("idBackLog", id + offset)
                .with("title", format!("Item {}", id))
                .with("estimate", id as f64 * 0.5)
                .with("done", id % 3 == 0)
                .with("owner", Option::<String>::None)
        })
        .collect()
}

/// Comparing the stored snapshot against a fresh query result
fn bench_change_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("change_detection");

    for rows in [10usize, 100, 1000] {
        let store = SnapshotStore::with_initial(backlog(rows, 0));

        group.bench_with_input(BenchmarkId::new("unchanged", rows), &rows, |b, &rows| {
            b.iter_batched(
                || backlog(rows, 0),
                |next| black_box(store.replace_if_changed(next)),
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

/// Encoding a snapshot as the event payload
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_json");

    for rows in [10usize, 100, 1000] {
        let snapshot = backlog(rows, 0);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &snapshot, |b, s| {
            b.iter(|| black_box(s.to_json()))
        });
    }

    group.finish();
}

/// One broadcast round, with every subscriber draining its buffer
fn bench_broadcast(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    let mut group = c.benchmark_group("broadcast_round");
    let snapshot = Arc::new(backlog(100, 1));

    for subscribers in [1usize, 10, 100, 1000] {
        let registry = SubscriberRegistry::new();
        let mut subs: Vec<_> = (0..subscribers).map(|_| registry.register()).collect();
        let broadcaster = Broadcaster::new(registry);

        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, _| {
                b.iter(|| {
                    let report = runtime.block_on(broadcaster.broadcast(snapshot.clone()));
                    for sub in subs.iter_mut() {
                        black_box(sub.try_recv());
                    }
                    black_box(report)
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_change_detection, bench_encode, bench_broadcast);
criterion_main!(benches);
