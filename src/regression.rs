//! # Factor regression
//!
//! $$
//! r_{p,t}-r_{f,t}=\alpha+\sum_j\beta_j\,(f_{j,t})+\varepsilon_t,\qquad
//! \widehat{V}_{\text{HC}}=(X^\top X)^{-1}\Big(\sum_t \omega_t\,\hat\varepsilon_t^2\,x_tx_t^\top\Big)(X^\top X)^{-1}
//! $$
//!
//! CAPM and multi-factor OLS with heteroskedasticity-consistent standard errors.

pub mod capm;
pub mod ols;

pub use capm::FactorRegression;
pub use capm::BENCHMARK_REGRESSOR;
pub use capm::RegressionResult;
pub use ols::OlsFit;

use serde::Deserialize;
use serde::Serialize;

/// White-type sandwich estimators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobustEstimator {
  /// White (1980), no small-sample correction.
  HC0,
  /// HC0 scaled by `n / (n - k)`.
  #[default]
  HC1,
  /// Each squared residual divided by `(1 - h_ii)^2`.
  HC3,
}

/// Which variance estimator produced the standard errors of a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StandardErrors {
  Classical,
  Robust { estimator: RobustEstimator },
}

/// Point estimate with its inference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
  pub estimate: f64,
  pub std_error: f64,
  /// `None` when the standard error is zero (exact fit).
  pub t_stat: Option<f64>,
  /// Two-sided p-value of `estimate = 0`.
  pub p_value: Option<f64>,
  /// Lower bound of the confidence interval.
  pub lower: f64,
  /// Upper bound of the confidence interval.
  pub upper: f64,
}

impl Coefficient {
  pub fn contains(&self, value: f64) -> bool {
    self.lower <= value && value <= self.upper
  }
}
