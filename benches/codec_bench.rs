//! Benchmarks for query compilation and CRDB decoding
//!
//! Run with: cargo bench

use crashq::crdb::{decode, RawResponse};
use crashq::query::{FoldOp, QueryBuilder, QueryOptions};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use serde_json::{json, Value};

/// Object-mode response: `groups` groups of `runs` runs, 8 ids per run
fn object_response(groups: usize, runs: usize) -> RawResponse {
    let mut objects = Vec::new();
    let mut values = Vec::new();

    for g in 0..groups {
        let label = format!("fp{}", g);
        let base = (g * runs * 16) as u64;
        let id_runs: Vec<Value> = (0..runs).map(|r| json!([base + r as u64 * 16, 7])).collect();
        objects.push(json!([label, id_runs]));

        let host_runs: Vec<Value> = (0..runs).map(|r| json!([format!("host-{}", r), 8])).collect();
        values.push(json!([label, host_runs]));
        values.push(json!([label, [[1024, runs * 8]]]));
    }

    serde_json::from_value(json!({
        "columns": ["hostname", "size"],
        "objects": objects,
        "values": values
    }))
    .unwrap()
}

/// Aggregate-mode response with one entry per group
fn aggregate_response(groups: usize) -> RawResponse {
    let values: Vec<Value> = (0..groups)
        .map(|g| json!([format!("fp{}", g), [[g % 7], [100, 200 + g]], g + 1]))
        .collect();

    serde_json::from_value(json!({
        "columns": ["hostname;unique", "timestamp;range"],
        "values": values
    }))
    .unwrap()
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for groups in [10, 100, 1000] {
        let objects = object_response(groups, 4);
        group.throughput(Throughput::Elements((groups * 32) as u64));
        group.bench_function(format!("objects_{}", groups), |b| {
            b.iter(|| decode(black_box(&objects)).unwrap())
        });

        let aggregates = aggregate_response(groups);
        group.throughput(Throughput::Elements(groups as u64));
        group.bench_function(format!("aggregate_{}", groups), |b| {
            b.iter(|| decode(black_box(&aggregates)).unwrap())
        });
    }

    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    let options = QueryOptions {
        filters: (0..20).map(|i| format!("attr{},equal,value{}", i, i)).collect(),
        sort: vec!["-count".to_string()],
        factor: Some("fingerprint".to_string()),
        folds: vec![
            (FoldOp::Unique, "hostname".to_string()),
            (FoldOp::Bin, "timestamp".to_string()),
        ],
        quantize_uint: vec!["day,timestamp,1d".to_string()],
        age: Some("7d".to_string()),
        ..Default::default()
    };

    group.bench_function("build_20_filters", |b| {
        b.iter(|| QueryBuilder::new(black_box(options.clone())).build().unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_compile);
criterion_main!(benches);
