//! Benchmarks for feature engineering and window scoring

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;
use uavwatch::scorer::align;
use uavwatch::{FeaturePipeline, FeatureSet, Frame, LofParams, ModelBundle, Scorer, TelemetryRecord};
use uavwatch_sim::{generate_batch, BatchConfig};

fn batch(cycles: usize, seed: u64) -> Vec<TelemetryRecord> {
    generate_batch(
        &BatchConfig::default()
            .with_cycles(cycles)
            .with_points_per_cycle(600)
            .with_seed(seed),
    )
    .into_records()
}

fn bench_engineering(c: &mut Criterion) {
    let mut group = c.benchmark_group("engineering");

    let records = batch(1, 1);
    let window: Vec<TelemetryRecord> = records.iter().rev().take(150).cloned().collect();
    let pipeline = FeaturePipeline::standard();

    group.throughput(Throughput::Elements(window.len() as u64));
    group.bench_function("standard_pipeline_150", |b| {
        b.iter(|| {
            let engineered = pipeline.run(&Frame::from_records(black_box(&window)));
            black_box(engineered);
        })
    });

    group.finish();
}

fn bench_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("scoring");
    group.sample_size(20);

    // Train on nominal rows only
    let training: Vec<TelemetryRecord> = batch(2, 2)
        .into_iter()
        .filter(|r| !r.has_event())
        .collect();
    let features = FeatureSet::standard();
    let engineered = FeaturePipeline::standard().run(&Frame::from_records(&training));
    let x = align(engineered.frame(), &features).unwrap().matrix;
    let bundle = ModelBundle::fit(features, &x, &LofParams::default()).unwrap();
    let scorer = Scorer::new(Arc::new(bundle));

    let live = batch(2, 3);
    for size in [150usize, 1000] {
        let window: Vec<TelemetryRecord> = live.iter().take(size).cloned().collect();
        group.throughput(Throughput::Elements(window.len() as u64));
        group.bench_function(format!("score_records_{}", size), |b| {
            b.iter(|| {
                let scored = scorer.score_records(black_box(&window));
                black_box(scored)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_engineering, bench_scoring);
criterion_main!(benches);
