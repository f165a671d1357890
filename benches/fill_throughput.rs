//! Benchmarks for the unpack → fill → evaluate hot path
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use livesort_rs::{
    Axis, Event, EventSet, FieldKind, HistKind, Orientation, Result, RowWriter, Schema,
};
use std::sync::Arc;

fn bench_events(histograms: usize) -> Arc<Event> {
    let mut schema = Schema::new();
    let e = schema.register("e", FieldKind::F64).unwrap();
    let adc = schema.register_array("adc", FieldKind::F64, 4).unwrap();

    let mut events = EventSet::new();
    let event = events
        .register_event(
            1,
            "bench",
            schema,
            Box::new(move |payload: &[u8], row: &mut RowWriter<'_>| -> Result<()> {
                let value = f64::from_le_bytes(payload[0..8].try_into().unwrap());
                row.set(e, value)?;
                for i in 0..4 {
                    row.set_index(adc, i, value * (i + 1) as f64)?;
                }
                Ok(())
            }),
        )
        .unwrap();

    let manager = event.manager();
    for i in 0..histograms {
        let kind = match i % 3 {
            0 => HistKind::Standard,
            1 => HistKind::Gamma,
            _ => HistKind::Summary {
                orientation: Orientation::Vertical,
            },
        };
        let params = match kind {
            HistKind::Gamma => "adc",
            HistKind::Summary { .. } => "adc[0-3]",
            _ => "e",
        };
        manager
            .create(
                livesort_rs::HistSpec::new(format!("h{}", i), "bench", params)
                    .with_gate("e > 0.5")
                    .with_kind(kind)
                    .with_axis(Axis::new(100, 0.0, 100.0).unwrap()),
            )
            .unwrap();
    }

    event
}

fn bench_process(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_event");
    for histograms in [1usize, 8, 32] {
        let event = bench_events(histograms);
        let payload = 7.25f64.to_le_bytes().to_vec();
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(histograms),
            &payload,
            |b, payload| {
                b.iter(|| {
                    black_box(event.process(black_box(payload)));
                })
            },
        );
    }
    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let event = bench_events(8);
    let payload = 7.25f64.to_le_bytes().to_vec();
    event.process(&payload);
    let hist = event.manager().histograms().pop().unwrap();

    c.bench_function("snapshot", |b| {
        b.iter(|| {
            black_box(hist.snapshot());
        })
    });
}

criterion_group!(benches, bench_process, bench_snapshot);
criterion_main!(benches);
