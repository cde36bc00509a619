//! Merger and materializer benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use market_stream::classifier::classify;
use market_stream::events::{ChannelKind, ChannelMessage};
use market_stream::order_book::{OrderBookStore, UpdateRecord};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use types::instrument::Instrument;

fn snapshot_records(levels: i64) -> Vec<UpdateRecord> {
    (0..levels)
        .flat_map(|i| {
            [
                UpdateRecord::new(Decimal::new(10_000 - i, 1), 1, Decimal::new(i + 1, 2)),
                UpdateRecord::new(Decimal::new(10_001 + i, 1), 1, -Decimal::new(i + 1, 2)),
            ]
        })
        .collect()
}

fn update_records(count: i64) -> Vec<UpdateRecord> {
    (0..count)
        .map(|i| {
            let price = Decimal::new(9_950 + (i % 100), 1);
            let count = if i % 7 == 0 { 0 } else { 3 };
            UpdateRecord::new(price, count, Decimal::new(i % 50 + 1, 2))
        })
        .collect()
}

fn bench_apply(c: &mut Criterion) {
    let instrument = Instrument::from_codes("BTC", "USD").unwrap();
    let mut group = c.benchmark_group("merge");

    for &levels in &[25i64, 100, 250] {
        let records = snapshot_records(levels);
        group.bench_with_input(BenchmarkId::new("snapshot", levels), &records, |b, records| {
            b.iter(|| {
                let mut store = OrderBookStore::new();
                store.apply_snapshot(&instrument, black_box(records)).unwrap();
                black_box(store.len())
            });
        });
    }

    let snapshot = snapshot_records(250);
    let updates = update_records(10_000);
    group.bench_function("updates_10k", |b| {
        b.iter(|| {
            let mut store = OrderBookStore::new();
            store.apply_snapshot(&instrument, &snapshot).unwrap();
            for record in &updates {
                store.apply_update(&instrument, black_box(record)).unwrap();
            }
            black_box(store.materialize(&instrument, 25))
        });
    });

    group.finish();
}

fn bench_classify_and_decode(c: &mut Criterion) {
    let payloads: Vec<Value> = (0..1_000)
        .map(|i| json!([17082, [7254.7 + f64::from(i % 10), 3, if i % 2 == 0 { 0.5 } else { -0.5 }]]))
        .collect();

    c.bench_function("classify_decode_1k", |b| {
        b.iter(|| {
            for payload in &payloads {
                if let Ok(ChannelMessage::BookUpdate(entry)) = classify(ChannelKind::Book, payload) {
                    black_box(UpdateRecord::decode(entry).unwrap());
                }
            }
        });
    });
}

criterion_group!(benches, bench_apply, bench_classify_and_decode);
criterion_main!(benches);
