//! Criterion benchmarks for abstraction and refinement
//!
//! Run with: cargo bench -p arnn-abstraction

use arnn_abstraction::{
    abstract_network, preprocess, refine_network, CompleteAbstractionLeftToRight, RefineByMaxLoss,
    RefineByMaxLossClustered, RefinementContext,
};
use arnn_core::{random_network, Network};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn preprocessed(width: usize) -> Network {
    let network = random_network(8, &[width, width, width], 2, 42).unwrap();
    preprocess(&network).unwrap()
}

// ============================================================================
// Preprocessing and abstraction
// ============================================================================

fn bench_preprocess(c: &mut Criterion) {
    let mut group = c.benchmark_group("Preprocess");
    for width in [16, 64, 128] {
        let network = random_network(8, &[width, width, width], 2, 42).unwrap();
        group.throughput(Throughput::Elements((3 * width) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), &network, |b, network| {
            b.iter(|| preprocess(black_box(network)))
        });
    }
    group.finish();
}

fn bench_complete_abstraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("Abstraction/Complete");
    for width in [16, 64, 128] {
        let network = preprocessed(width);
        group.throughput(Throughput::Elements(network.info().hidden_nodes as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), &network, |b, network| {
            b.iter(|| abstract_network(black_box(network), &mut CompleteAbstractionLeftToRight::new()))
        });
    }
    group.finish();
}

// ============================================================================
// Refinement
// ============================================================================

fn bench_refinement(c: &mut Criterion) {
    let mut group = c.benchmark_group("Refinement");
    for width in [16, 64] {
        let network = preprocessed(width);
        let abstracted = abstract_network(&network, &mut CompleteAbstractionLeftToRight::new()).unwrap();

        group.bench_with_input(BenchmarkId::new("max_loss", width), &abstracted, |b, abstracted| {
            b.iter(|| refine_network(&RefinementContext::new(black_box(abstracted)), &mut RefineByMaxLoss::new(4)))
        });
        group.bench_with_input(BenchmarkId::new("max_loss_clustered", width), &abstracted, |b, abstracted| {
            b.iter(|| {
                refine_network(
                    &RefinementContext::new(black_box(abstracted)),
                    &mut RefineByMaxLossClustered::new(8),
                )
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_preprocess, bench_complete_abstraction, bench_refinement);
criterion_main!(benches);
