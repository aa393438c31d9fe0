//! Benchmarks for the tracing pipeline
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rhai::{Array, Dynamic, Map};
use serde_json::json;
use vistrace::analysis::{ChangeFilter, VisualizationClassifier};
use vistrace::config::{AnalysisConfig, ClassifierSettings, FilterSettings};
use vistrace::session::FamilyEvents;
use vistrace::tracer::{Canonicalizer, StructureSnapshot};
use vistrace::{Analyzer, OperationTag, StructureFamily, TraceEvent};

fn binary_tree(depth: usize, next: &mut i64) -> Dynamic {
    let mut node = Map::new();
    *next += 1;
    node.insert("value".into(), Dynamic::from(*next));
    if depth == 0 {
        node.insert("left".into(), Dynamic::UNIT);
        node.insert("right".into(), Dynamic::UNIT);
    } else {
        node.insert("left".into(), binary_tree(depth - 1, next));
        node.insert("right".into(), binary_tree(depth - 1, next));
    }
    Dynamic::from_map(node)
}

fn sequence_events(count: usize) -> FamilyEvents {
    let mut events = FamilyEvents::default();
    for i in 0..count {
        // Consecutive pairs share a length
        let len = (i / 2 % 50) as i64;
        let items = (0..len).map(|v| json!(v)).collect();
        let operation = if i % 2 == 0 {
            OperationTag::Append
        } else {
            OperationTag::Update
        };
        events.push(TraceEvent::new(
            format!("arr{}", i % 3),
            operation,
            StructureSnapshot::Sequence(items),
            i as f64,
            i + 1,
            "",
        ));
    }
    events
}

fn bench_canonicalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("canonicalize");
    let canonicalizer = Canonicalizer::new(64);

    for depth in [4usize, 8, 12] {
        let tree = binary_tree(depth, &mut 0);
        group.bench_with_input(BenchmarkId::new("binary_tree", depth), &tree, |b, tree| {
            b.iter(|| black_box(canonicalizer.canonicalize(StructureFamily::Tree, tree)));
        });
    }

    let array: Array = (0..10_000).map(Dynamic::from::<i64>).collect();
    let array = Dynamic::from_array(array);
    group.bench_function("sequence_10k", |b| {
        b.iter(|| black_box(canonicalizer.canonicalize(StructureFamily::Sequence, &array)));
    });

    group.finish();
}

fn bench_change_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("change_filter");
    let filter = ChangeFilter::new(FilterSettings::default());

    for count in [100usize, 1_000, 10_000] {
        let events = sequence_events(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("sequences", count), &events, |b, events| {
            b.iter(|| black_box(filter.filter(events)));
        });
    }

    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let classifier = VisualizationClassifier::new(ClassifierSettings::default());
    let events = ChangeFilter::new(FilterSettings::default()).filter(&sequence_events(1_000));

    c.bench_function("classify_sequences", |b| {
        b.iter(|| black_box(classifier.classify_all(&events)));
    });
}

fn bench_analyze(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze");
    group.sample_size(20);
    let analyzer = Analyzer::new(AnalysisConfig::default());

    for pushes in [10usize, 100, 500] {
        let source = format!(
            "let arr = [];\nfor i in 0..{} {{\n    arr.push(i);\n}}\narr.sort();\n",
            pushes
        );
        group.bench_with_input(BenchmarkId::new("push_loop", pushes), &source, |b, source| {
            b.iter(|| black_box(analyzer.analyze(source)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_canonicalize,
    bench_change_filter,
    bench_classify,
    bench_analyze
);
criterion_main!(benches);
