use chrono::NaiveDate;
use nalgebra::DMatrix;
use ndarray::Array2;
use ndarray::Axis;
use serde::Deserialize;
use serde::Serialize;

use crate::config::AnalyticsConfig;
use crate::data::AlignedPanel;
use crate::error::AnalyticsError;
use crate::error::Result;
use crate::linalg;

/// Covariance estimation method.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CovarianceMethod {
  /// Unbiased sample covariance (divide by `T - 1`).
  #[default]
  Sample,
  /// Observation `i` of `T` weighted by `λ^(T-1-i)`, weights normalized to one.
  Ewma { decay: f64 },
  /// Ledoit-Wolf shrinkage toward a scaled identity.
  Shrinkage,
}

/// Dates and sample size a matrix was estimated over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EstimationWindow {
  pub start: NaiveDate,
  pub end: NaiveDate,
  pub observations: usize,
}

/// Symmetric positive-semidefinite covariance over a fixed asset order.
///
/// Immutable once produced. `adjusted` is set when diagonal loading was needed
/// to restore positive semidefiniteness.
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceMatrix {
  assets: Vec<String>,
  matrix: DMatrix<f64>,
  method: CovarianceMethod,
  window: EstimationWindow,
  adjusted: bool,
  loading: f64,
  shrinkage_intensity: Option<f64>,
}

impl CovarianceMatrix {
  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn matrix(&self) -> &DMatrix<f64> {
    &self.matrix
  }

  pub fn dim(&self) -> usize {
    self.matrix.nrows()
  }

  pub fn method(&self) -> CovarianceMethod {
    self.method
  }

  pub fn window(&self) -> EstimationWindow {
    self.window
  }

  pub fn adjusted(&self) -> bool {
    self.adjusted
  }

  /// Diagonal load applied during estimation (0 when not adjusted).
  pub fn loading(&self) -> f64 {
    self.loading
  }

  pub fn shrinkage_intensity(&self) -> Option<f64> {
    self.shrinkage_intensity
  }

  pub fn get(&self, i: usize, j: usize) -> f64 {
    self.matrix[(i, j)]
  }

  pub fn variance(&self, i: usize) -> f64 {
    self.matrix[(i, i)]
  }

  /// `wᵀ Σ w`.
  pub fn portfolio_variance(&self, weights: &[f64]) -> f64 {
    let w = nalgebra::DVector::from_column_slice(weights);
    (w.transpose() * &self.matrix * &w)[(0, 0)]
  }

  /// A copy multiplied by `factor`, e.g. periods per year.
  pub fn scaled(&self, factor: f64) -> Self {
    Self {
      matrix: &self.matrix * factor,
      loading: self.loading * factor,
      ..self.clone()
    }
  }

  pub fn condition_number(&self) -> f64 {
    linalg::condition_number(&self.matrix)
  }

  pub fn correlation(&self) -> DMatrix<f64> {
    let n = self.dim();
    DMatrix::from_fn(n, n, |i, j| {
      let denom = (self.variance(i) * self.variance(j)).sqrt();
      if i == j {
        1.0
      } else if denom > 1e-15 {
        (self.get(i, j) / denom).clamp(-1.0, 1.0)
      } else {
        0.0
      }
    })
  }

  pub fn to_rows(&self) -> Vec<Vec<f64>> {
    self
      .matrix
      .row_iter()
      .map(|r| r.iter().copied().collect())
      .collect()
  }
}

/// Produces [`CovarianceMatrix`] values from aligned panels.
#[derive(Debug, Clone, Copy)]
pub struct CovarianceEstimator {
  method: CovarianceMethod,
  loading_epsilon: f64,
}

impl CovarianceEstimator {
  pub fn new(method: CovarianceMethod, loading_epsilon: f64) -> Self {
    Self {
      method,
      loading_epsilon,
    }
  }

  pub fn from_config(cfg: &AnalyticsConfig) -> Self {
    Self::new(cfg.covariance, cfg.diagonal_loading_epsilon)
  }

  pub fn method(&self) -> CovarianceMethod {
    self.method
  }

  /// Rows the estimator will use: the trailing `window` rows, or all of them.
  pub fn window_slice(panel: &AlignedPanel, window: Option<usize>) -> Result<AlignedPanel> {
    match window {
      None => Ok(panel.clone()),
      Some(w) if w > panel.n_obs() => Err(AnalyticsError::insufficient(
        "covariance window",
        w,
        panel.n_obs(),
      )),
      Some(w) => Ok(panel.tail(w)),
    }
  }

  /// Estimate over the trailing `window` rows of `panel` (all rows when `None`).
  pub fn estimate(&self, panel: &AlignedPanel, window: Option<usize>) -> Result<CovarianceMatrix> {
    let panel = Self::window_slice(panel, window)?;
    let n_obs = panel.n_obs();
    let n_assets = panel.n_assets();

    let required = n_assets.max(2);
    if n_obs < required {
      return Err(AnalyticsError::insufficient(
        "covariance estimation",
        required,
        n_obs,
      ));
    }

    let x = panel.values();
    let (raw, shrinkage_intensity) = match self.method {
      CovarianceMethod::Sample => (sample_covariance(x), None),
      CovarianceMethod::Ewma { decay } => {
        if !(decay > 0.0 && decay < 1.0) {
          return Err(AnalyticsError::InvalidInput(format!(
            "EWMA decay must be in (0, 1), got {decay}"
          )));
        }
        (ewma_covariance(x, decay), None)
      }
      CovarianceMethod::Shrinkage => {
        let (m, intensity) = ledoit_wolf(x);
        (m, Some(intensity))
      }
    };

    let mut matrix = linalg::symmetrize(&raw);
    let mut loading = 0.0;
    if let Some(delta) = linalg::psd_loading(&matrix, self.loading_epsilon) {
      tracing::warn!(
        delta,
        method = ?self.method,
        "covariance not positive semidefinite, applying diagonal loading"
      );
      matrix = linalg::load_diagonal(&matrix, delta);
      loading = delta;
    }

    let (Some(start), Some(end)) = (panel.first_date(), panel.last_date()) else {
      return Err(AnalyticsError::insufficient("covariance estimation", 1, 0));
    };

    Ok(CovarianceMatrix {
      assets: panel.names().to_vec(),
      matrix,
      method: self.method,
      window: EstimationWindow {
        start,
        end,
        observations: n_obs,
      },
      adjusted: loading > 0.0,
      loading,
      shrinkage_intensity,
    })
  }
}

fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
  let (r, c) = a.dim();
  DMatrix::from_fn(r, c, |i, j| a[[i, j]])
}

fn centered(x: &Array2<f64>) -> Array2<f64> {
  match x.mean_axis(Axis(0)) {
    Some(mean) => x - &mean,
    None => x.clone(),
  }
}

fn sample_covariance(x: &Array2<f64>) -> DMatrix<f64> {
  let t = x.nrows();
  let xc = centered(x);
  to_dmatrix(&xc.t().dot(&xc)) / (t as f64 - 1.0)
}

fn ewma_covariance(x: &Array2<f64>, decay: f64) -> DMatrix<f64> {
  let t = x.nrows();
  let n = x.ncols();

  let raw: Vec<f64> = (0..t).map(|i| decay.powi((t - 1 - i) as i32)).collect();
  let total: f64 = raw.iter().sum();
  let weights: Vec<f64> = raw.iter().map(|w| w / total).collect();

  let mut mean = vec![0.0; n];
  for (i, row) in x.outer_iter().enumerate() {
    for j in 0..n {
      mean[j] += weights[i] * row[j];
    }
  }

  let mut cov = DMatrix::zeros(n, n);
  for (i, row) in x.outer_iter().enumerate() {
    for a in 0..n {
      let da = row[a] - mean[a];
      for b in a..n {
        cov[(a, b)] += weights[i] * da * (row[b] - mean[b]);
      }
    }
  }
  for a in 0..n {
    for b in 0..a {
      cov[(a, b)] = cov[(b, a)];
    }
  }
  cov
}

/// Ledoit-Wolf (2004) shrinkage toward `m·I`, rescaled to the unbiased sample scale.
fn ledoit_wolf(x: &Array2<f64>) -> (DMatrix<f64>, f64) {
  let t = x.nrows() as f64;
  let n = x.ncols();
  let xc = to_dmatrix(&centered(x));

  let s = xc.transpose() * &xc / t;
  let mu = s.trace() / n as f64;
  let target = DMatrix::<f64>::identity(n, n) * mu;

  let d2 = (&s - &target).norm_squared() / n as f64;

  let mut b2_bar = 0.0;
  for row in xc.row_iter() {
    let r = row.transpose();
    let outer = &r * r.transpose();
    b2_bar += (outer - &s).norm_squared() / n as f64;
  }
  b2_bar /= t * t;

  let intensity = if d2 > 0.0 { (b2_bar.min(d2)) / d2 } else { 0.0 };
  let shrunk = &target * intensity + &s * (1.0 - intensity);

  (shrunk * (t / (t - 1.0)), intensity)
}
