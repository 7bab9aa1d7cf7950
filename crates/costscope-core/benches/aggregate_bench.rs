//! Performance benchmarks for cost tree aggregation and hints
//!
//! Targets:
//! - aggregate(100K records) → <50ms
//! - generate_hints(tree of 100K records) → <5ms
//! - Session::record → <2µs per call

use chrono::Utc;
use costscope_core::{
    aggregate, generate_hints, CallRecord, HintConfig, RecordFlags, ScopePath, Session,
    StaticPricing, UsageEvent,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const SCOPES: &[&str] = &["pipeline", "fetch", "rank", "generate", "review", "tool"];
const MODELS: &[&str] = &["gpt-4o", "gpt-4o-mini", "claude-sonnet-4-6", "o3-mini"];

/// Deterministic synthetic log with paths up to depth 4
fn generate_records(count: usize) -> Vec<CallRecord> {
    let now = Utc::now();
    (0..count)
        .map(|i| {
            let depth = i % 5;
            let path: Vec<String> = (0..depth)
                .map(|d| SCOPES[(i / (d + 1)) % SCOPES.len()].to_string())
                .collect();
            CallRecord {
                seq: i as u64 + 1,
                scope_path: ScopePath::from(path),
                model: MODELS[i % MODELS.len()].to_string(),
                provider: None,
                input_tokens: 500 + (i as u64 % 8_000),
                output_tokens: 50 + (i as u64 % 1_500),
                cost_usd: 0.0001 * (i % 97) as f64,
                timestamp: now,
                duration_seconds: 0.4,
                flags: RecordFlags::default(),
            }
        })
        .collect()
}

fn aggregate_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");

    for count in [1_000, 10_000, 100_000] {
        let records = generate_records(count);
        group.bench_with_input(BenchmarkId::new("records", count), &records, |b, records| {
            b.iter(|| black_box(aggregate(records)));
        });
    }

    group.finish();
}

fn hints_benchmark(c: &mut Criterion) {
    let tree = aggregate(&generate_records(100_000));
    let pricing = StaticPricing::new();
    let config = HintConfig::default();

    c.bench_function("generate_hints_100k", |b| {
        b.iter(|| black_box(generate_hints(&tree, &pricing, &config, 3_600.0)));
    });
}

fn record_benchmark(c: &mut Criterion) {
    let session = Session::new("bench");
    let path = ScopePath::new(["pipeline", "generate"]);

    c.bench_function("session_record", |b| {
        b.iter(|| {
            black_box(session.record(UsageEvent::new("gpt-4o", 1_200, 300), path.clone()));
        });
    });
}

criterion_group!(benches, aggregate_benchmark, hints_benchmark, record_benchmark);
criterion_main!(benches);
