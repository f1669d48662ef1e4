//! # Linear algebra helpers
//!
//! $$
//! \kappa(\Sigma)=\frac{\lambda_{\max}}{\lambda_{\min}},\qquad
//! \Sigma_\delta=\Sigma+\delta I
//! $$
//!
//! Eigenvalue diagnostics and diagonal loading shared by the covariance
//! estimators and the frontier optimizer.

use nalgebra::DMatrix;

/// Extreme eigenvalues `(min, max)` of a symmetric matrix.
pub fn eigen_bounds(m: &DMatrix<f64>) -> (f64, f64) {
  if m.is_empty() {
    return (0.0, 0.0);
  }
  let eig = m.clone().symmetric_eigenvalues();
  let min = eig.iter().copied().fold(f64::INFINITY, f64::min);
  let max = eig.iter().copied().fold(f64::NEG_INFINITY, f64::max);
  (min, max)
}

/// Spectral condition number; infinite when the smallest eigenvalue is not positive.
pub fn condition_number(m: &DMatrix<f64>) -> f64 {
  let (min, max) = eigen_bounds(m);
  if min <= 0.0 {
    f64::INFINITY
  } else {
    max / min
  }
}

/// `(m + mᵀ) / 2`.
pub fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
  (m + m.transpose()) * 0.5
}

pub fn load_diagonal(m: &DMatrix<f64>, delta: f64) -> DMatrix<f64> {
  let mut out = m.clone();
  for i in 0..out.nrows() {
    out[(i, i)] += delta;
  }
  out
}

/// Smallest diagonal load making `m` positive semidefinite.
///
/// Returns `None` when `m` already is. Otherwise the load is `-λmin + epsilon`.
pub fn psd_loading(m: &DMatrix<f64>, epsilon: f64) -> Option<f64> {
  let (min, _) = eigen_bounds(m);
  if min >= 0.0 {
    None
  } else {
    Some(-min + epsilon)
  }
}

/// Smallest diagonal load bringing the condition number to at most `max_condition`.
///
/// Returns `None` when `m` is already well conditioned. Solving
/// `(λmax + δ) / (λmin + δ) = κ` for `δ`, plus `epsilon`.
pub fn conditioning_loading(m: &DMatrix<f64>, max_condition: f64, epsilon: f64) -> Option<f64> {
  let (min, max) = eigen_bounds(m);
  if min > 0.0 && max / min <= max_condition {
    return None;
  }
  let delta = ((max - max_condition * min) / (max_condition - 1.0)).max(0.0);
  Some(delta + epsilon)
}

/// Cholesky succeeds, i.e. `m` is numerically positive definite.
pub fn is_positive_definite(m: &DMatrix<f64>) -> bool {
  m.clone().cholesky().is_some()
}
