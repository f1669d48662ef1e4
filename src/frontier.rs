//! # Efficient frontier
//!
//! $$
//! \min_w\ w^\top\Sigma w\quad\text{s.t.}\quad \mathbf 1^\top w=1,\ \ \mu^\top w=t,\ \ l\le w\le u
//! $$
//!
//! Swept over target returns from the minimum-variance portfolio to the
//! largest return the constraints allow.

pub mod qp;
pub mod sweep;

pub use sweep::CancellationToken;
pub use sweep::Frontier;
pub use sweep::FrontierOptimizer;
pub use sweep::FrontierPoint;
pub use sweep::SkippedTarget;

use serde::Deserialize;
use serde::Serialize;

use crate::error::AnalyticsError;
use crate::error::Result;

/// Weight constraints applied on top of the budget `Σw = 1`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WeightConstraints {
  /// `0 <= w_i <= 1`.
  #[default]
  LongOnly,
  /// The same `[lower, upper]` for every asset.
  Box { lower: f64, upper: f64 },
  /// Budget only, short positions allowed.
  Unconstrained,
  /// One `[lower[i], upper[i]]` per asset, in covariance order.
  PerAsset { lower: Vec<f64>, upper: Vec<f64> },
}

const FILL_TOLERANCE: f64 = 1e-14;

/// Per-asset bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintSet {
  lower: Vec<f64>,
  upper: Vec<f64>,
}

impl ConstraintSet {
  pub fn from_constraints(constraints: &WeightConstraints, n_assets: usize) -> Result<Self> {
    match constraints {
      WeightConstraints::LongOnly => {
        Self::with_bounds(vec![0.0; n_assets], vec![1.0; n_assets])
      }
      WeightConstraints::Box { lower, upper } => {
        Self::with_bounds(vec![*lower; n_assets], vec![*upper; n_assets])
      }
      WeightConstraints::PerAsset { lower, upper } => {
        if lower.len() != n_assets || upper.len() != n_assets {
          return Err(AnalyticsError::InvalidInput(format!(
            "per-asset bounds cover {} / {} assets, expected {n_assets}",
            lower.len(),
            upper.len()
          )));
        }
        Self::with_bounds(lower.clone(), upper.clone())
      }
      WeightConstraints::Unconstrained => Ok(Self {
        lower: vec![f64::NEG_INFINITY; n_assets],
        upper: vec![f64::INFINITY; n_assets],
      }),
    }
  }

  /// Finite bounds per asset; the budget must be reachable.
  pub fn with_bounds(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self> {
    if lower.len() != upper.len() || lower.is_empty() {
      return Err(AnalyticsError::InvalidInput(
        "bounds need one (lower, upper) pair per asset".into(),
      ));
    }
    if lower
      .iter()
      .zip(&upper)
      .any(|(l, u)| !l.is_finite() || !u.is_finite() || l > u)
    {
      return Err(AnalyticsError::InvalidInput(
        "bounds must be finite with lower <= upper".into(),
      ));
    }
    let (lo, hi): (f64, f64) = (lower.iter().sum(), upper.iter().sum());
    if lo > 1.0 + 1e-12 || hi < 1.0 - 1e-12 {
      return Err(AnalyticsError::InvalidInput(format!(
        "bounds cannot hold a fully invested portfolio (sum of lower {lo}, sum of upper {hi})"
      )));
    }
    Ok(Self { lower, upper })
  }

  pub fn len(&self) -> usize {
    self.lower.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lower.is_empty()
  }

  pub fn lower(&self) -> &[f64] {
    &self.lower
  }

  pub fn upper(&self) -> &[f64] {
    &self.upper
  }

  /// Any finite bound, i.e. inequality constraints exist.
  pub fn is_bounded(&self) -> bool {
    self
      .lower
      .iter()
      .chain(&self.upper)
      .any(|b| b.is_finite())
  }

  pub fn contains(&self, weights: &[f64], tol: f64) -> bool {
    weights.len() == self.len()
      && (weights.iter().sum::<f64>() - 1.0).abs() <= tol
      && weights
        .iter()
        .enumerate()
        .all(|(i, w)| *w >= self.lower[i] - tol && *w <= self.upper[i] + tol)
  }

  /// Fully invested vertex with the smallest (`descending = false`) or
  /// largest expected return, filling assets in return order.
  ///
  /// Also returns the return of the marginal asset that received the last
  /// positive fill. `None` when unbounded.
  pub fn greedy_vertex(&self, mu: &[f64], descending: bool) -> Option<(Vec<f64>, f64)> {
    if !self.is_bounded() || mu.len() != self.len() {
      return None;
    }
    let mut order: Vec<usize> = (0..mu.len()).collect();
    order.sort_by_key(|&i| ordered_float::OrderedFloat(mu[i]));
    if descending {
      order.reverse();
    }

    let mut w = self.lower.clone();
    let mut remaining = 1.0 - w.iter().sum::<f64>();
    let mut marginal = mu[order[0]];
    for &i in &order {
      if remaining <= FILL_TOLERANCE {
        break;
      }
      let fill = remaining.min(self.upper[i] - self.lower[i]);
      if fill > FILL_TOLERANCE {
        w[i] += fill;
        remaining -= fill;
        marginal = mu[i];
      }
    }
    Some((w, marginal))
  }

  /// Lowest and highest expected return of a feasible portfolio.
  pub fn return_range(&self, mu: &[f64]) -> Option<(f64, f64)> {
    let (lo, _) = self.greedy_vertex(mu, false)?;
    let (hi, _) = self.greedy_vertex(mu, true)?;
    Some((dot(&lo, mu), dot(&hi, mu)))
  }
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
  a.iter().zip(b).map(|(x, y)| x * y).sum()
}
