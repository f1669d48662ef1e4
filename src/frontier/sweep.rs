use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use nalgebra::DMatrix;
use nalgebra::DVector;
use rayon::prelude::*;
use serde::Deserialize;
use serde::Serialize;

use super::dot;
use super::qp::QuadraticProgram;
use super::ConstraintSet;
use super::WeightConstraints;
use crate::config::AnalyticsConfig;
use crate::covariance::CovarianceMatrix;
use crate::error::AnalyticsError;
use crate::error::ErrorKind;
use crate::error::Result;
use crate::linalg;

const RANGE_TOLERANCE: f64 = 1e-10;

/// Shared flag checked between target levels of a sweep.
///
/// A solve that has started always finishes.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
  pub target_return: f64,
  pub weights: Vec<f64>,
  /// `wᵀΣw` under the matrix the optimizer used.
  pub variance: f64,
  /// `μᵀw`.
  pub expected_return: f64,
  /// Σ was diagonally loaded before solving.
  pub regularized: bool,
}

impl FrontierPoint {
  pub fn volatility(&self) -> f64 {
    self.variance.max(0.0).sqrt()
  }
}

/// Target level dropped from the sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedTarget {
  pub target_return: f64,
  pub kind: ErrorKind,
  pub message: String,
}

/// Points ordered by target return, minimum-variance portfolio first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frontier {
  pub assets: Vec<String>,
  pub points: Vec<FrontierPoint>,
  pub skipped: Vec<SkippedTarget>,
  pub regularized: bool,
  /// Diagonal load added to Σ, zero when none.
  pub loading: f64,
  /// The sweep stopped early; `points` holds what finished.
  pub cancelled: bool,
}

impl Frontier {
  pub fn min_variance(&self) -> Option<&FrontierPoint> {
    self.points.first()
  }

  pub fn max_return(&self) -> Option<&FrontierPoint> {
    self.points.last()
  }

  /// Point with the highest `(E[r] - rf) / σ` among those computed.
  pub fn tangency(&self, risk_free: f64, epsilon: f64) -> Result<&FrontierPoint> {
    self
      .points
      .iter()
      .filter(|p| p.volatility() > epsilon)
      .map(|p| (p, (p.expected_return - risk_free) / p.volatility()))
      .max_by(|a, b| a.1.total_cmp(&b.1))
      .map(|(p, _)| p)
      .ok_or_else(|| AnalyticsError::ZeroDivisionGuard {
        metric: "tangency_sharpe".into(),
        denominator: self
          .points
          .iter()
          .map(FrontierPoint::volatility)
          .fold(0.0, f64::max),
        epsilon,
      })
  }
}

/// Mean-variance frontier under weight constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontierOptimizer {
  points: usize,
  max_condition_number: f64,
  loading_epsilon: f64,
  max_iterations: usize,
  constraints: WeightConstraints,
}

impl Default for FrontierOptimizer {
  fn default() -> Self {
    Self::from_config(&AnalyticsConfig::default())
  }
}

impl FrontierOptimizer {
  pub fn from_config(cfg: &AnalyticsConfig) -> Self {
    Self {
      points: cfg.frontier.points,
      max_condition_number: cfg.frontier.max_condition_number,
      loading_epsilon: cfg.diagonal_loading_epsilon,
      max_iterations: cfg.frontier.max_iterations,
      constraints: cfg.frontier.constraints.clone(),
    }
  }

  pub fn with_points(mut self, points: usize) -> Self {
    self.points = points;
    self
  }

  pub fn with_constraints(mut self, constraints: WeightConstraints) -> Self {
    self.constraints = constraints;
    self
  }

  pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
    self.max_iterations = max_iterations;
    self
  }

  pub fn min_variance(&self, cov: &CovarianceMatrix, mu: &[f64]) -> Result<FrontierPoint> {
    self.prepare(cov, mu)?.min_variance()
  }

  /// Minimum-variance portfolio returning exactly `target`.
  pub fn solve_target(
    &self,
    cov: &CovarianceMatrix,
    mu: &[f64],
    target: f64,
  ) -> Result<FrontierPoint> {
    self.prepare(cov, mu)?.target(target)
  }

  pub fn sweep(&self, cov: &CovarianceMatrix, mu: &[f64]) -> Result<Frontier> {
    self.sweep_with_cancellation(cov, mu, &CancellationToken::new())
  }

  /// Sweep `points` evenly spaced targets from the minimum-variance return
  /// to the maximum feasible return. Targets that fail are skipped.
  pub fn sweep_with_cancellation(
    &self,
    cov: &CovarianceMatrix,
    mu: &[f64],
    token: &CancellationToken,
  ) -> Result<Frontier> {
    if self.points < 2 {
      return Err(AnalyticsError::InvalidInput(format!(
        "frontier needs at least 2 points, got {}",
        self.points
      )));
    }
    let problem = self.prepare(cov, mu)?;
    let mv = problem.min_variance()?;
    let r_mv = mv.expected_return;
    let r_max = problem.max_return();

    let mut frontier = Frontier {
      assets: cov.assets().to_vec(),
      points: vec![mv],
      skipped: Vec::new(),
      regularized: problem.regularized,
      loading: problem.loading,
      cancelled: false,
    };

    let span = r_max - r_mv;
    if span <= RANGE_TOLERANCE * (1.0 + r_max.abs()) {
      return Ok(frontier);
    }

    let last = (self.points - 1) as f64;
    let targets: Vec<f64> = (1..self.points)
      .map(|k| r_mv + k as f64 / last * span)
      .collect();

    let solved: Vec<(f64, Option<Result<FrontierPoint>>)> = targets
      .par_iter()
      .map(|&t| {
        if token.is_cancelled() {
          (t, None)
        } else {
          (t, Some(problem.target(t)))
        }
      })
      .collect();

    for (t, outcome) in solved {
      match outcome {
        Some(Ok(point)) => frontier.points.push(point),
        Some(Err(err)) => {
          if err.is_recoverable_for_sweep() {
            tracing::warn!(target_return = t, %err, "skipping frontier target");
          } else {
            tracing::error!(target_return = t, %err, "frontier target failed");
          }
          frontier.skipped.push(SkippedTarget {
            target_return: t,
            kind: err.kind(),
            message: err.to_string(),
          });
        }
        None => frontier.cancelled = true,
      }
    }

    if frontier.cancelled {
      tracing::info!(
        computed = frontier.points.len(),
        "frontier sweep cancelled"
      );
    }
    Ok(frontier)
  }

  fn prepare(&self, cov: &CovarianceMatrix, mu: &[f64]) -> Result<Problem> {
    let n = cov.dim();
    if n == 0 {
      return Err(AnalyticsError::InvalidInput("empty covariance matrix".into()));
    }
    if mu.len() != n {
      return Err(AnalyticsError::InvalidInput(format!(
        "expected {n} expected returns, got {}",
        mu.len()
      )));
    }
    if mu.iter().any(|m| !m.is_finite()) {
      return Err(AnalyticsError::InvalidInput(
        "expected returns must be finite".into(),
      ));
    }

    let bounds = ConstraintSet::from_constraints(&self.constraints, n)?;
    let condition = cov.condition_number();
    let mut sigma = cov.matrix().clone();
    let mut loading = 0.0;
    if let Some(delta) =
      linalg::conditioning_loading(&sigma, self.max_condition_number, self.loading_epsilon)
    {
      sigma = linalg::load_diagonal(&sigma, delta);
      loading = delta;
    }
    let regularized = loading > 0.0 || cov.adjusted();
    if regularized {
      tracing::warn!(
        condition,
        loading,
        adjusted = cov.adjusted(),
        "near-singular covariance, frontier solved on a regularized matrix"
      );
    }

    Ok(Problem {
      sigma,
      mu: mu.to_vec(),
      bounds,
      regularized,
      loading,
      max_iterations: self.max_iterations,
    })
  }
}

struct Problem {
  sigma: DMatrix<f64>,
  mu: Vec<f64>,
  bounds: ConstraintSet,
  regularized: bool,
  loading: f64,
  max_iterations: usize,
}

impl Problem {
  fn n(&self) -> usize {
    self.mu.len()
  }

  fn tolerance(&self) -> f64 {
    let scale = self.mu.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
    RANGE_TOLERANCE * (1.0 + scale)
  }

  fn point(&self, target_return: f64, weights: DVector<f64>) -> FrontierPoint {
    let variance = (weights.transpose() * &self.sigma * &weights)[(0, 0)];
    let weights: Vec<f64> = weights.iter().copied().collect();
    FrontierPoint {
      target_return,
      expected_return: dot(&weights, &self.mu),
      weights,
      variance,
      regularized: self.regularized,
    }
  }

  fn qp(&self, eq: DMatrix<f64>, rhs: DVector<f64>) -> QuadraticProgram<'_> {
    QuadraticProgram::new(
      &self.sigma,
      eq,
      rhs,
      self.bounds.lower(),
      self.bounds.upper(),
    )
    .with_max_iterations(self.max_iterations)
  }

  /// Any fully invested feasible portfolio.
  fn feasible_start(&self) -> DVector<f64> {
    match self.bounds.greedy_vertex(&self.mu, false) {
      Some((w, _)) => DVector::from_vec(w),
      None => DVector::from_element(self.n(), 1.0 / self.n() as f64),
    }
  }

  fn min_variance(&self) -> Result<FrontierPoint> {
    let n = self.n();
    let sol = self
      .qp(DMatrix::from_element(n, 1, 1.0), DVector::from_element(1, 1.0))
      .solve(self.feasible_start())?;
    let mut point = self.point(0.0, sol.weights);
    point.target_return = point.expected_return;
    Ok(point)
  }

  fn max_return(&self) -> f64 {
    match self.bounds.return_range(&self.mu) {
      Some((_, hi)) => hi,
      None => self.mu.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
  }

  fn target(&self, t: f64) -> Result<FrontierPoint> {
    let n = self.n();
    let tol = self.tolerance();
    let mut eq = DMatrix::from_element(n, 2, 1.0);
    eq.set_column(1, &DVector::from_column_slice(&self.mu));
    let rhs = DVector::from_vec(vec![1.0, t]);

    let Some((lo, hi)) = self.bounds.return_range(&self.mu) else {
      return self.unbounded_target(t, eq, rhs);
    };
    if t < lo - tol || t > hi + tol {
      return Err(AnalyticsError::InfeasibleConstraint {
        target: t,
        min: lo,
        max: hi,
      });
    }
    if hi - lo <= tol {
      let mut point = self.min_variance()?;
      point.target_return = t;
      return Ok(point);
    }
    if t >= hi - tol {
      return self.extreme(t, true);
    }
    if t <= lo + tol {
      return self.extreme(t, false);
    }

    let theta = (t - lo) / (hi - lo);
    let (w_lo, w_hi) = match (
      self.bounds.greedy_vertex(&self.mu, false),
      self.bounds.greedy_vertex(&self.mu, true),
    ) {
      (Some((a, _)), Some((b, _))) => (DVector::from_vec(a), DVector::from_vec(b)),
      _ => return self.unbounded_target(t, eq, rhs),
    };
    let start = w_lo * (1.0 - theta) + w_hi * theta;
    let sol = self.qp(eq, rhs).solve(start)?;
    Ok(self.point(t, sol.weights))
  }

  fn unbounded_target(
    &self,
    t: f64,
    eq: DMatrix<f64>,
    rhs: DVector<f64>,
  ) -> Result<FrontierPoint> {
    let (i_min, i_max) = extreme_indices(&self.mu);
    let (m_lo, m_hi) = (self.mu[i_min], self.mu[i_max]);
    if m_hi - m_lo <= self.tolerance() {
      if (t - m_lo).abs() > self.tolerance() {
        return Err(AnalyticsError::InfeasibleConstraint {
          target: t,
          min: m_lo,
          max: m_hi,
        });
      }
      let mut point = self.min_variance()?;
      point.target_return = t;
      return Ok(point);
    }
    // two-asset mix hitting the target exactly
    let mut start = DVector::zeros(self.n());
    start[i_min] = (m_hi - t) / (m_hi - m_lo);
    start[i_max] = 1.0 - start[i_min];
    let sol = self.qp(eq, rhs).solve(start)?;
    Ok(self.point(t, sol.weights))
  }

  /// Target at an end of the feasible return range. Only assets tied with
  /// the marginal return remain free; the rest sit at the bound the greedy
  /// fill put them on.
  fn extreme(&self, t: f64, descending: bool) -> Result<FrontierPoint> {
    let Some((vertex, marginal)) = self.bounds.greedy_vertex(&self.mu, descending) else {
      return Err(AnalyticsError::InvalidInput(
        "extreme portfolio needs bounded weights".into(),
      ));
    };
    let tie = RANGE_TOLERANCE * (1.0 + marginal.abs());
    let group: Vec<usize> = (0..self.n())
      .filter(|&i| (self.mu[i] - marginal).abs() <= tie)
      .collect();
    if group.len() <= 1 {
      return Ok(self.point(t, DVector::from_vec(vertex)));
    }

    let fixed: Vec<usize> = (0..self.n()).filter(|i| !group.contains(i)).collect();
    let g = group.len();
    let sigma_g = DMatrix::from_fn(g, g, |a, b| self.sigma[(group[a], group[b])]);
    let linear = DVector::from_fn(g, |a, _| {
      fixed
        .iter()
        .map(|&j| self.sigma[(group[a], j)] * vertex[j])
        .sum::<f64>()
    });
    let budget = 1.0 - fixed.iter().map(|&j| vertex[j]).sum::<f64>();
    let lower: Vec<f64> = group.iter().map(|&i| self.bounds.lower()[i]).collect();
    let upper: Vec<f64> = group.iter().map(|&i| self.bounds.upper()[i]).collect();
    let start = DVector::from_fn(g, |a, _| vertex[group[a]]);

    let sol = QuadraticProgram::new(
      &sigma_g,
      DMatrix::from_element(g, 1, 1.0),
      DVector::from_element(1, budget),
      &lower,
      &upper,
    )
    .with_linear(linear)
    .with_max_iterations(self.max_iterations)
    .solve(start)?;

    let mut weights = DVector::from_vec(vertex);
    for (a, &i) in group.iter().enumerate() {
      weights[i] = sol.weights[a];
    }
    Ok(self.point(t, weights))
  }
}

fn extreme_indices(mu: &[f64]) -> (usize, usize) {
  let mut lo = 0;
  let mut hi = 0;
  for (i, m) in mu.iter().enumerate() {
    if *m < mu[lo] {
      lo = i;
    }
    if *m > mu[hi] {
      hi = i;
    }
  }
  (lo, hi)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use approx::assert_relative_eq;
  use ndarray::Array2;

  use super::*;
  use crate::covariance::CovarianceEstimator;
  use crate::covariance::CovarianceMethod;
  use crate::data::testing::month_starts;
  use crate::data::AlignedPanel;
  use crate::data::Periodicity;
  use crate::data::ReturnKind;

  const MU: [f64; 3] = [0.05, 0.08, 0.12];

  fn panel(cols: &[(&str, &[f64])]) -> AlignedPanel {
    let n = cols[0].1.len();
    let values = Array2::from_shape_fn((n, cols.len()), |(t, j)| cols[j].1[t]);
    AlignedPanel::from_array(
      cols.iter().map(|(name, _)| name.to_string()).collect(),
      month_starts(n),
      values,
      Periodicity::Monthly,
      ReturnKind::Simple,
    )
    .unwrap()
  }

  fn three_assets() -> CovarianceMatrix {
    let a = [0.02, -0.01, 0.03, -0.02, 0.01, 0.015, -0.005, 0.0];
    let b = [0.01, 0.02, -0.03, 0.04, -0.01, 0.0, 0.02, -0.02];
    let c = [0.05, -0.04, 0.02, 0.06, -0.05, 0.03, -0.02, 0.01];
    CovarianceEstimator::new(CovarianceMethod::Sample, 1e-10)
      .estimate(&panel(&[("a", &a), ("b", &b), ("c", &c)]), None)
      .unwrap()
  }

  fn optimizer(points: usize) -> FrontierOptimizer {
    FrontierOptimizer::default().with_points(points)
  }

  #[test]
  fn min_variance_point_has_lowest_variance() {
    let frontier = optimizer(25).sweep(&three_assets(), &MU).unwrap();
    let mv = frontier.min_variance().unwrap();
    assert!(frontier.points.len() > 1);
    for p in &frontier.points {
      assert!(mv.variance <= p.variance + 1e-14, "{} > {}", mv.variance, p.variance);
    }
    assert!(!frontier.regularized);
    assert!(frontier.skipped.is_empty());
  }

  #[test]
  fn long_only_points_are_fully_invested_and_non_negative() {
    let frontier = optimizer(20).sweep(&three_assets(), &MU).unwrap();
    assert_eq!(frontier.points.len(), 20);
    for p in &frontier.points {
      assert_abs_diff_eq!(p.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-10);
      assert!(p.weights.iter().all(|w| *w >= -1e-12));
      assert_abs_diff_eq!(p.expected_return, p.target_return, epsilon = 1e-10);
    }
    for pair in frontier.points.windows(2) {
      assert!(pair[1].target_return > pair[0].target_return);
    }
    let top = frontier.max_return().unwrap();
    assert_abs_diff_eq!(top.expected_return, 0.12, epsilon = 1e-10);
    assert_abs_diff_eq!(top.weights[2], 1.0, epsilon = 1e-10);
  }

  #[test]
  fn collinear_assets_are_regularized() {
    let a = [0.01, -0.01, 0.02, -0.02, 0.01];
    let b = [0.02, -0.02, 0.04, -0.04, 0.02];
    let cov = CovarianceEstimator::new(CovarianceMethod::Sample, 1e-10)
      .estimate(&panel(&[("a", &a), ("b", &b)]), None)
      .unwrap();
    let frontier = optimizer(5).sweep(&cov, &[0.002, 0.004]).unwrap();
    assert!(frontier.regularized);
    assert!(!frontier.points.is_empty());
    assert!(frontier.points.iter().all(|p| p.regularized));
  }

  #[test]
  fn infeasible_target_is_reported() {
    let err = optimizer(10)
      .solve_target(&three_assets(), &MU, 0.2)
      .unwrap_err();
    assert!(matches!(
      err,
      AnalyticsError::InfeasibleConstraint { max, .. } if (max - 0.12).abs() < 1e-12
    ));
  }

  #[test]
  fn failing_targets_are_skipped_not_fatal() {
    let cov = diagonal_cov(&[0.04, 0.09, 0.16]);
    let frontier = optimizer(10)
      .with_max_iterations(0)
      .sweep(&cov, &MU)
      .unwrap();
    assert!(!frontier.skipped.is_empty());
    assert!(frontier
      .skipped
      .iter()
      .all(|s| s.kind == ErrorKind::NonConvergence));
    assert_eq!(frontier.points.len() + frontier.skipped.len(), 10);
  }

  #[test]
  fn cancelled_sweep_keeps_finished_points() {
    let token = CancellationToken::new();
    token.cancel();
    let frontier = optimizer(10)
      .sweep_with_cancellation(&three_assets(), &MU, &token)
      .unwrap();
    assert!(frontier.cancelled);
    assert_eq!(frontier.points.len(), 1);
  }

  #[test]
  fn unconstrained_points_match_analytic_frontier() {
    let cov = three_assets();
    let frontier = optimizer(6)
      .with_constraints(WeightConstraints::Unconstrained)
      .sweep(&cov, &MU)
      .unwrap();

    let inv = cov.matrix().clone().try_inverse().unwrap();
    let ones = DVector::from_element(3, 1.0);
    let mu = DVector::from_column_slice(&MU);
    let a = (ones.transpose() * &inv * &ones)[(0, 0)];
    let b = (ones.transpose() * &inv * &mu)[(0, 0)];
    let c = (mu.transpose() * &inv * &mu)[(0, 0)];
    for p in &frontier.points {
      let t = p.target_return;
      let analytic = (a * t * t - 2.0 * b * t + c) / (a * c - b * b);
      assert_relative_eq!(p.variance, analytic, max_relative = 1e-8);
    }
    assert_abs_diff_eq!(frontier.max_return().unwrap().expected_return, 0.12, epsilon = 1e-10);
  }

  #[test]
  fn box_constraints_are_respected() {
    let frontier = optimizer(10)
      .with_constraints(WeightConstraints::Box {
        lower: 0.1,
        upper: 0.6,
      })
      .sweep(&three_assets(), &MU)
      .unwrap();
    for p in &frontier.points {
      assert!(p.weights.iter().all(|w| *w >= 0.1 - 1e-10 && *w <= 0.6 + 1e-10));
    }
    // 0.1 * 0.05 + 0.3 * 0.08 + 0.6 * 0.12
    assert_abs_diff_eq!(
      frontier.max_return().unwrap().expected_return,
      0.101,
      epsilon = 1e-10
    );
  }

  #[test]
  fn per_asset_caps_bind_each_asset_separately() {
    let lower = [0.05, 0.0, 0.1];
    let upper = [0.7, 0.25, 0.4];
    let frontier = optimizer(12)
      .with_constraints(WeightConstraints::PerAsset {
        lower: lower.to_vec(),
        upper: upper.to_vec(),
      })
      .sweep(&three_assets(), &MU)
      .unwrap();
    assert!(frontier.points.len() > 1);
    for p in &frontier.points {
      assert_abs_diff_eq!(p.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-10);
      for (i, w) in p.weights.iter().enumerate() {
        assert!(
          *w >= lower[i] - 1e-10 && *w <= upper[i] + 1e-10,
          "asset {i} weight {w} outside [{}, {}]",
          lower[i],
          upper[i]
        );
      }
    }
    // 0.35 * 0.05 + 0.25 * 0.08 + 0.4 * 0.12
    assert_abs_diff_eq!(
      frontier.max_return().unwrap().expected_return,
      0.0855,
      epsilon = 1e-10
    );
  }

  #[test]
  fn tangency_maximizes_sharpe_over_points() {
    let frontier = optimizer(30).sweep(&three_assets(), &MU).unwrap();
    let tan = frontier.tangency(0.02, 1e-12).unwrap();
    let best = (tan.expected_return - 0.02) / tan.volatility();
    for p in &frontier.points {
      assert!((p.expected_return - 0.02) / p.volatility() <= best + 1e-12);
    }
  }

  /// Independent assets: ±s on disjoint row pairs, zero elsewhere.
  fn diagonal_cov(variances: &[f64]) -> CovarianceMatrix {
    let n = variances.len();
    let rows = 2 * n;
    let cols: Vec<Vec<f64>> = (0..n)
      .map(|j| {
        let s = (variances[j] * (rows - 1) as f64 / 2.0).sqrt();
        (0..rows)
          .map(|t| match t {
            t if t == 2 * j => s,
            t if t == 2 * j + 1 => -s,
            _ => 0.0,
          })
          .collect()
      })
      .collect();
    let names: Vec<String> = (0..n).map(|j| format!("x{j}")).collect();
    let named: Vec<(&str, &[f64])> = names
      .iter()
      .zip(&cols)
      .map(|(nm, c)| (nm.as_str(), c.as_slice()))
      .collect();
    CovarianceEstimator::new(CovarianceMethod::Sample, 1e-10)
      .estimate(&panel(&named), None)
      .unwrap()
  }
}
