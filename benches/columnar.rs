//! Columnar codec benchmarks
//!
//! Packing and unpacking compound row datasets and ragged arrays, the hot
//! paths of every list-of-records save and load.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nodestash::codec::columnar::{self, Column};
use nodestash::types::{ArrayValue, ScalarType};
use nodestash::Container;

fn columns(rows: usize) -> Vec<(String, Column)> {
    vec![
        (
            "position".to_string(),
            Column::Scalar(ArrayValue::F64((0..rows).map(|i| i as f64 * 0.25).collect())),
        ),
        (
            "count".to_string(),
            Column::Scalar(ArrayValue::I64((0..rows as i64).collect())),
        ),
        (
            "label".to_string(),
            Column::Text((0..rows).map(|i| format!("peak-{}", i)).collect()),
        ),
    ]
}

fn bench_encode_columns(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_columns");
    for rows in [16usize, 1_024, 65_536] {
        let input = columns(rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &input, |b, input| {
            b.iter(|| columnar::encode_columns("/bench", rows, black_box(input)))
        });
    }
    group.finish();
}

fn bench_decode_columns(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_columns");
    for rows in [16usize, 1_024, 65_536] {
        let Ok(dataset) = columnar::encode_columns("/bench", rows, &columns(rows)) else {
            continue;
        };
        group.bench_with_input(BenchmarkId::from_parameter(rows), &dataset, |b, dataset| {
            b.iter(|| columnar::read_columns(black_box(dataset), "/bench"))
        });
    }
    group.finish();
}

fn bench_ragged(c: &mut Criterion) {
    let mut group = c.benchmark_group("ragged");
    let rows: Vec<ArrayValue> = (0..512)
        .map(|len| ArrayValue::F32((0..len % 64).map(|i| i as f32).collect()))
        .collect();
    let node = Container::in_memory().root();

    group.bench_function("write", |b| {
        b.iter(|| columnar::write_ragged(&node, "traces", ScalarType::F32, black_box(&rows)))
    });
    if columnar::write_ragged(&node, "traces", ScalarType::F32, &rows).is_ok() {
        group.bench_function("read", |b| b.iter(|| columnar::read_ragged(&node, "traces")));
    }
    group.finish();
}

criterion_group!(benches, bench_encode_columns, bench_decode_columns, bench_ragged);
criterion_main!(benches);
