use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kmsvm::{
    Evaluate, Evaluator, EvaluatorConfig, Format, HostAccelerator, KernelSpec, Problem,
    SequentialEvaluator, SlicedLayout, SparseVector, TrainedModel,
};
use std::sync::Arc;

fn histograms(n: usize, dim: usize) -> Problem {
    let elements: Vec<SparseVector> = (0..n)
        .map(|i| {
            let nnz = 4 + (i * 7) % 28;
            let mut indices: Vec<usize> = (0..nnz).map(|k| (i * 11 + k * 17) % dim).collect();
            indices.sort_unstable();
            indices.dedup();
            let raw: Vec<f32> = (0..indices.len())
                .map(|k| 1.0 + ((i + k * 5) % 13) as f32)
                .collect();
            let total: f32 = raw.iter().sum();
            SparseVector::new(indices, raw.into_iter().map(|v| v / total).collect())
        })
        .collect();
    let labels = (0..n).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
    Problem::new(elements, labels).unwrap()
}

fn model(problem: &Problem) -> TrainedModel {
    let n = problem.len();
    let alpha = (0..n).map(|i| 0.05 + (i % 5) as f32 * 0.1).collect();
    TrainedModel::from_problem(problem, (0..n).collect(), alpha, 0.1).unwrap()
}

fn benchmark_layouts(c: &mut Criterion) {
    let problem = histograms(2000, 512);
    let mut group = c.benchmark_group("layout");

    for (format, prefetch) in [(Format::SlicedEllpack, 1), (Format::Sertilp, 4)] {
        group.bench_with_input(
            BenchmarkId::new("build", format.name()),
            &format,
            |b, &format| {
                b.iter(|| {
                    SlicedLayout::build(black_box(problem.elements()), format, 4, 64, prefetch)
                        .unwrap()
                })
            },
        );
    }

    group.finish();
}

fn benchmark_decisions(c: &mut Criterion) {
    let problem = histograms(1000, 512);
    let model = model(&problem);
    let queries = histograms(64, 512);
    let query = &queries.elements()[0];
    let mut group = c.benchmark_group("decision");

    for spec in [
        KernelSpec::Linear,
        KernelSpec::Rbf { gamma: 0.5 },
        KernelSpec::NormChiSquared,
        KernelSpec::ExpChiSquared { gamma: 0.5 },
    ] {
        let mut sequential = SequentialEvaluator::new(spec, &model, problem.labels()).unwrap();
        group.bench_function(BenchmarkId::new("sequential", spec.name()), |b| {
            b.iter(|| sequential.decision_value(black_box(query)).unwrap())
        });

        for format in [Format::SlicedEllpack, Format::Sertilp] {
            let config = EvaluatorConfig::default()
                .with_format(format)
                .with_threads_per_row(4)
                .with_slice_size(64)
                .with_prefetch_size(4);
            let mut evaluator = Evaluator::new(spec, config, Arc::new(HostAccelerator::new()));
            evaluator.init(&model, problem.labels()).unwrap();

            let id = format!("{}{}", spec.name(), format.name());
            group.bench_function(BenchmarkId::new("device", id), |b| {
                b.iter(|| evaluator.decision_value(black_box(query)).unwrap())
            });
        }
    }

    group.finish();
}

fn benchmark_batch(c: &mut Criterion) {
    let problem = histograms(1000, 512);
    let model = model(&problem);
    let queries = histograms(256, 512);
    let spec = KernelSpec::ExpChiSquared { gamma: 0.5 };
    let mut group = c.benchmark_group("predict_batch");

    for parallel in [false, true] {
        let config = EvaluatorConfig::default()
            .with_format(Format::Sertilp)
            .with_prefetch_size(2)
            .with_parallel_batch(parallel);
        let mut evaluator = Evaluator::new(spec, config, Arc::new(HostAccelerator::new()));
        evaluator.init(&model, problem.labels()).unwrap();

        let name = if parallel { "parallel" } else { "serial" };
        group.bench_function(name, |b| {
            b.iter(|| evaluator.predict_batch(black_box(queries.elements())).unwrap())
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_layouts,
    benchmark_decisions,
    benchmark_batch
);
criterion_main!(benches);
