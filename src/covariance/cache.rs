use std::collections::HashMap;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use chrono::NaiveDate;

use super::estimator::CovarianceEstimator;
use super::estimator::CovarianceMatrix;
use super::estimator::CovarianceMethod;
use crate::data::AlignedPanel;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum MethodKey {
  Sample,
  Ewma(u64),
  Shrinkage,
}

impl From<CovarianceMethod> for MethodKey {
  fn from(method: CovarianceMethod) -> Self {
    match method {
      CovarianceMethod::Sample => Self::Sample,
      CovarianceMethod::Ewma { decay } => Self::Ewma(decay.to_bits()),
      CovarianceMethod::Shrinkage => Self::Shrinkage,
    }
  }
}

/// Cache key: asset set (in column order), window dates and estimation method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CovarianceKey {
  assets: Vec<String>,
  start: NaiveDate,
  end: NaiveDate,
  observations: usize,
  method: MethodKey,
}

impl CovarianceKey {
  pub fn for_panel(panel: &AlignedPanel, method: CovarianceMethod) -> Option<Self> {
    Some(Self {
      assets: panel.names().to_vec(),
      start: panel.first_date()?,
      end: panel.last_date()?,
      observations: panel.n_obs(),
      method: method.into(),
    })
  }
}

/// Shared map of immutable covariance matrices.
///
/// A matrix is published only after estimation (including the
/// positive-semidefiniteness check) has completed, so concurrent readers see
/// either the full entry or nothing.
#[derive(Debug, Default)]
pub struct CovarianceCache {
  entries: RwLock<HashMap<CovarianceKey, Arc<CovarianceMatrix>>>,
}

impl CovarianceCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, key: &CovarianceKey) -> Option<Arc<CovarianceMatrix>> {
    self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(key)
      .cloned()
  }

  /// Cached matrix for the estimator's window over `panel`, estimating on a miss.
  ///
  /// The estimate runs outside the lock; if another thread published the same
  /// key in the meantime its entry wins and is returned.
  pub fn get_or_estimate(
    &self,
    estimator: &CovarianceEstimator,
    panel: &AlignedPanel,
    window: Option<usize>,
  ) -> Result<Arc<CovarianceMatrix>> {
    let sliced = CovarianceEstimator::window_slice(panel, window)?;
    let key = CovarianceKey::for_panel(&sliced, estimator.method());

    if let Some(hit) = key.as_ref().and_then(|k| self.get(k)) {
      tracing::trace!("covariance cache hit");
      return Ok(hit);
    }

    let estimated = Arc::new(estimator.estimate(&sliced, None)?);
    let Some(key) = key else {
      return Ok(estimated);
    };

    let mut entries = self
      .entries
      .write()
      .unwrap_or_else(PoisonError::into_inner);
    Ok(entries.entry(key).or_insert(estimated).clone())
  }

  pub fn len(&self) -> usize {
    self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn clear(&self) {
    self
      .entries
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .clear();
  }
}

#[cfg(test)]
mod tests {
  use rayon::prelude::*;

  use super::*;
  use crate::data::testing::monthly;
  use crate::data::AlignmentPolicy;

  fn panel() -> AlignedPanel {
    AlignedPanel::align(
      &[
        monthly("a", &[0.01, -0.02, 0.03, 0.005, -0.01, 0.02]),
        monthly("b", &[0.02, -0.01, 0.01, 0.0, -0.02, 0.01]),
      ],
      AlignmentPolicy::DropIncomplete,
    )
    .unwrap()
  }

  #[test]
  fn second_lookup_hits_the_same_entry() {
    let cache = CovarianceCache::new();
    let est = CovarianceEstimator::new(CovarianceMethod::Sample, 1e-10);
    let p = panel();

    let first = cache.get_or_estimate(&est, &p, None).unwrap();
    let second = cache.get_or_estimate(&est, &p, None).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len(), 1);
  }

  #[test]
  fn different_windows_and_methods_are_distinct_keys() {
    let cache = CovarianceCache::new();
    let p = panel();
    let sample = CovarianceEstimator::new(CovarianceMethod::Sample, 1e-10);
    let ewma = CovarianceEstimator::new(CovarianceMethod::Ewma { decay: 0.9 }, 1e-10);

    cache.get_or_estimate(&sample, &p, None).unwrap();
    cache.get_or_estimate(&sample, &p, Some(4)).unwrap();
    cache.get_or_estimate(&ewma, &p, None).unwrap();
    assert_eq!(cache.len(), 3);

    cache.clear();
    assert!(cache.is_empty());
  }

  #[test]
  fn failed_estimates_are_never_published() {
    let cache = CovarianceCache::new();
    let est = CovarianceEstimator::new(CovarianceMethod::Sample, 1e-10);
    let short = panel().tail(1);
    assert!(cache.get_or_estimate(&est, &short, None).is_err());
    assert!(cache.is_empty());
  }

  #[test]
  fn concurrent_readers_share_one_entry() {
    let cache = CovarianceCache::new();
    let est = CovarianceEstimator::new(CovarianceMethod::Sample, 1e-10);
    let p = panel();

    let results: Vec<_> = (0..16)
      .into_par_iter()
      .map(|_| cache.get_or_estimate(&est, &p, None).unwrap())
      .collect();

    assert_eq!(cache.len(), 1);
    let published = cache
      .get(&CovarianceKey::for_panel(&p, CovarianceMethod::Sample).unwrap())
      .unwrap();
    for r in &results {
      assert_eq!(r.matrix(), published.matrix());
    }
  }
}
