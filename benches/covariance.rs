use std::hint::black_box;

use criterion::criterion_group;
use criterion::criterion_main;
use criterion::BenchmarkId;
use criterion::Criterion;
use perfrisk::covariance::CovarianceCache;
use perfrisk::covariance::CovarianceEstimator;
use perfrisk::covariance::CovarianceMethod;
use perfrisk::data::synthetic_universe;
use perfrisk::data::AlignedPanel;
use perfrisk::data::AlignmentPolicy;

fn bench_estimators(c: &mut Criterion) {
  let mut group = c.benchmark_group("covariance");
  let universe = synthetic_universe(50, 240, 3).unwrap();
  let panel = AlignedPanel::align(&universe.assets, AlignmentPolicy::DropIncomplete).unwrap();

  for (label, method) in [
    ("sample", CovarianceMethod::Sample),
    ("ewma", CovarianceMethod::Ewma { decay: 0.94 }),
    ("shrinkage", CovarianceMethod::Shrinkage),
  ] {
    let estimator = CovarianceEstimator::new(method, 1e-10);
    group.bench_with_input(BenchmarkId::new(label, 50), &panel, |b, panel| {
      b.iter(|| black_box(estimator.estimate(panel, None).unwrap()))
    });
  }

  group.finish();
}

fn bench_cache_hit(c: &mut Criterion) {
  let universe = synthetic_universe(50, 240, 3).unwrap();
  let panel = AlignedPanel::align(&universe.assets, AlignmentPolicy::DropIncomplete).unwrap();
  let estimator = CovarianceEstimator::new(CovarianceMethod::Shrinkage, 1e-10);
  let cache = CovarianceCache::new();
  cache.get_or_estimate(&estimator, &panel, Some(60)).unwrap();

  c.bench_function("covariance_cache_hit", |b| {
    b.iter(|| black_box(cache.get_or_estimate(&estimator, &panel, Some(60)).unwrap()))
  });
}

criterion_group!(benches, bench_estimators, bench_cache_hit);
criterion_main!(benches);
