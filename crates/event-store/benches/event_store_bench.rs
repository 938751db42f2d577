use common::OrderId;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use event_store::{EventStore, EventStoreExt, InMemoryEventStore};

const PAYLOAD: &[u8] = br#"{"id":"o1","product":{"id":"p1","name":"Gaming Laptop","quantity":2},"amount":50.0,"status":"Processing","version":1,"timestamp":"2024-01-01T00:00:00Z"}"#;

async fn populated_store(records: usize) -> InMemoryEventStore {
    let store = InMemoryEventStore::new();
    for i in 0..records {
        store
            .store_failed(
                OrderId::new(format!("o{i}")),
                "order.created",
                PAYLOAD.to_vec(),
            )
            .await
            .unwrap();
    }
    store
}

fn bench_store_failed(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/store_failed", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                store
                    .store_failed(OrderId::new("o1"), "order.created", PAYLOAD.to_vec())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_fetch_replayable(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("event_store/fetch_replayable");

    for size in [100, 1_000, 10_000] {
        let store = rt.block_on(populated_store(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &store, |b, store| {
            b.iter(|| {
                rt.block_on(async {
                    store.fetch_replayable(100).await.unwrap();
                });
            });
        });
    }

    group.finish();
}

fn bench_replay_lifecycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/replay_lifecycle", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                let record = store
                    .store_pending(OrderId::new("o1"), "order.created", PAYLOAD.to_vec())
                    .await
                    .unwrap();
                store.mark_replaying(record.id).await.unwrap();
                store.mark_completed(record.id).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_store_failed,
    bench_fetch_replayable,
    bench_replay_lifecycle
);
criterion_main!(benches);
