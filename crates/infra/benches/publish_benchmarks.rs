use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use civicgate_events::handler_fn;
use civicgate_infra::event_store::{EventFilter, EventRecordStore, InMemoryEventStore};
use civicgate_infra::IntegrationBus;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn bus_with_handlers(handlers: usize) -> IntegrationBus<Arc<InMemoryEventStore>> {
    let bus = IntegrationBus::new(Arc::new(InMemoryEventStore::new()));
    let counter = Arc::new(AtomicU64::new(0));
    for _ in 0..handlers {
        let counter = counter.clone();
        bus.subscribe("notification", "document.issued", handler_fn(move |_, _| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }))
        .unwrap();
    }
    bus
}

fn bench_publish_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_fan_out");
    group.throughput(Throughput::Elements(1));
    let rt = runtime();

    for handlers in [0usize, 1, 4, 16].iter() {
        group.bench_with_input(BenchmarkId::new("handlers", handlers), handlers, |b, &n| {
            let bus = bus_with_handlers(n);
            b.iter(|| {
                let record = rt
                    .block_on(bus.publish(
                        "document.issued",
                        json!({"citizen_id": 42, "document_type": "passport", "document_id": "P-001"}),
                        "documents",
                    ))
                    .unwrap();
                black_box(record);
            });
        });
    }

    group.finish();
}

fn bench_query_latest(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_latest");
    let rt = runtime();

    for stored in [100usize, 1_000, 10_000].iter() {
        let store = Arc::new(InMemoryEventStore::new());
        rt.block_on(async {
            let bus = IntegrationBus::new(store.clone());
            for i in 0..*stored {
                let event_type = if i % 3 == 0 { "document.issued" } else { "address.changed" };
                bus.publish(event_type, json!({"n": i}), "documents").await.unwrap();
            }
        });

        group.bench_with_input(BenchmarkId::new("stored", stored), stored, |b, _| {
            let filter = EventFilter::latest(100)
                .with_event_type("document.issued".parse().unwrap());
            b.iter(|| black_box(rt.block_on(store.query(&filter)).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_publish_fan_out, bench_query_latest);
criterion_main!(benches);
