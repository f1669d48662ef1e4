use std::hint::black_box;

use criterion::criterion_group;
use criterion::criterion_main;
use criterion::BenchmarkId;
use criterion::Criterion;
use perfrisk::covariance::CovarianceEstimator;
use perfrisk::covariance::CovarianceMethod;
use perfrisk::data::synthetic_universe;
use perfrisk::data::AlignedPanel;
use perfrisk::data::AlignmentPolicy;
use perfrisk::frontier::FrontierOptimizer;
use perfrisk::frontier::WeightConstraints;

fn inputs(n_assets: usize) -> (perfrisk::covariance::CovarianceMatrix, Vec<f64>) {
  let universe = synthetic_universe(n_assets, 120, 42).unwrap();
  let panel = AlignedPanel::align(&universe.assets, AlignmentPolicy::DropIncomplete).unwrap();
  let cov = CovarianceEstimator::new(CovarianceMethod::Sample, 1e-10)
    .estimate(&panel, None)
    .unwrap()
    .scaled(12.0);
  let mu = (0..panel.n_assets())
    .map(|i| panel.column(i).mean().unwrap_or(0.0) * 12.0)
    .collect();
  (cov, mu)
}

fn bench_sweep(c: &mut Criterion) {
  let mut group = c.benchmark_group("frontier_sweep");

  for &n in &[5, 10, 25] {
    let (cov, mu) = inputs(n);
    for (label, constraints) in [
      ("long_only", WeightConstraints::LongOnly),
      ("unconstrained", WeightConstraints::Unconstrained),
    ] {
      let optimizer = FrontierOptimizer::default().with_constraints(constraints);
      group.bench_with_input(BenchmarkId::new(label, n), &n, |b, _| {
        b.iter(|| black_box(optimizer.sweep(&cov, &mu).unwrap()))
      });
    }
  }

  group.finish();
}

fn bench_min_variance(c: &mut Criterion) {
  let (cov, mu) = inputs(25);
  let optimizer = FrontierOptimizer::default();
  c.bench_function("min_variance_25", |b| {
    b.iter(|| black_box(optimizer.min_variance(&cov, &mu).unwrap()))
  });
}

criterion_group!(benches, bench_sweep, bench_min_variance);
criterion_main!(benches);
