use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;

use super::ols::ols;
use super::ols::OlsOptions;
use super::Coefficient;
use super::RobustEstimator;
use super::StandardErrors;
use crate::config::AnalyticsConfig;
use crate::data::ReturnSeries;
use crate::error::AnalyticsError;
use crate::error::Result;
use crate::risk::rolling::PairedRollingWindow;
use crate::risk::volatility::mean;
use crate::risk::Annualization;

/// Alpha and factor loadings of one (portfolio, benchmark, window) fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionResult {
  pub alpha: Coefficient,
  /// Loadings in regressor order; CAPM has a single `benchmark` entry.
  pub loadings: Vec<(String, Coefficient)>,
  pub r_squared: Option<f64>,
  pub adjusted_r_squared: Option<f64>,
  pub residual_std_error: f64,
  pub observations: usize,
  pub confidence_level: f64,
  pub standard_errors: StandardErrors,
  /// Robust standard errors were requested but classical ones were reported.
  pub robust_fallback: bool,
  periods_per_year: f64,
}

impl RegressionResult {
  /// First loading, the CAPM beta. `None` only for a result without loadings,
  /// which a fit never produces.
  pub fn beta(&self) -> Option<&Coefficient> {
    self.loadings.first().map(|(_, c)| c)
  }

  pub fn loading(&self, name: &str) -> Option<&Coefficient> {
    self
      .loadings
      .iter()
      .find(|(n, _)| n == name)
      .map(|(_, c)| c)
  }

  /// Per-period alpha times periods per year.
  pub fn annualized_alpha(&self) -> f64 {
    self.alpha.estimate * self.periods_per_year
  }
}

pub const BENCHMARK_REGRESSOR: &str = "benchmark";

/// Alpha/beta estimation on excess returns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorRegression {
  options: OlsOptions,
}

impl FactorRegression {
  pub fn new(
    estimator: RobustEstimator,
    min_robust_sample: usize,
    confidence_level: f64,
    variance_epsilon: f64,
  ) -> Self {
    Self {
      options: OlsOptions {
        estimator,
        min_robust_sample,
        confidence_level,
        variance_epsilon,
      },
    }
  }

  pub fn from_config(cfg: &AnalyticsConfig) -> Self {
    Self::new(
      cfg.robust_estimator,
      cfg.min_robust_sample,
      cfg.confidence_level,
      cfg.zero_division_epsilon,
    )
  }

  /// CAPM on two excess-return series sharing the same timestamps.
  pub fn capm(
    &self,
    portfolio_excess: &ReturnSeries,
    benchmark_excess: &ReturnSeries,
    ann: Annualization,
  ) -> Result<RegressionResult> {
    if portfolio_excess.dates() != benchmark_excess.dates() {
      return Err(AnalyticsError::InvalidInput(format!(
        "'{}' and '{}' are not aligned on identical timestamps",
        portfolio_excess.name(),
        benchmark_excess.name()
      )));
    }
    let y = portfolio_excess.complete_values()?;
    let x = benchmark_excess.complete_values()?;
    self.capm_values(&y, &x, ann)
  }

  /// CAPM on already aligned excess-return slices.
  pub fn capm_values(
    &self,
    portfolio_excess: &[f64],
    benchmark_excess: &[f64],
    ann: Annualization,
  ) -> Result<RegressionResult> {
    self.multi_factor(
      portfolio_excess,
      &[(BENCHMARK_REGRESSOR, benchmark_excess)],
      ann,
    )
  }

  /// Multivariate OLS of excess returns on several factor series.
  pub fn multi_factor(
    &self,
    portfolio_excess: &[f64],
    factors: &[(&str, &[f64])],
    ann: Annualization,
  ) -> Result<RegressionResult> {
    let fit = ols(portfolio_excess, factors, self.options)?;
    tracing::debug!(
      n = fit.nobs,
      factors = factors.len(),
      robust_fallback = fit.robust_fallback,
      "fitted factor regression"
    );

    let mut coefficients = fit.coefficients.into_iter();
    let alpha = coefficients
      .next()
      .ok_or_else(|| AnalyticsError::InvalidInput("regression produced no intercept".into()))?;
    let loadings = fit.names.into_iter().skip(1).zip(coefficients).collect();

    Ok(RegressionResult {
      alpha,
      loadings,
      r_squared: fit.r_squared,
      adjusted_r_squared: fit.adjusted_r_squared,
      residual_std_error: fit.residual_std_error,
      observations: fit.nobs,
      confidence_level: self.options.confidence_level,
      standard_errors: fit.standard_errors,
      robust_fallback: fit.robust_fallback,
      periods_per_year: ann.periods_per_year(),
    })
  }

  /// Beta over each full window of `length`, dated by the window's last date.
  pub fn rolling_beta(
    &self,
    portfolio_excess: &[f64],
    benchmark_excess: &[f64],
    dates: &[NaiveDate],
    length: usize,
  ) -> Result<Vec<(NaiveDate, f64)>> {
    if dates.len() != portfolio_excess.len() {
      return Err(AnalyticsError::InvalidInput(
        "rolling beta needs one date per observation".into(),
      ));
    }
    if length < 2 {
      return Err(AnalyticsError::insufficient("rolling beta window", 2, length));
    }
    PairedRollingWindow::new(portfolio_excess, benchmark_excess, length)?
      .map(|(end, y, x)| Ok((dates[end], self.slope(y, x)?)))
      .collect()
  }

  fn slope(&self, y: &[f64], x: &[f64]) -> Result<f64> {
    let (mx, my) = (mean(x), mean(y));
    let (sxy, sxx) = x
      .iter()
      .zip(y)
      .fold((0.0, 0.0), |(sxy, sxx), (xi, yi)| {
        (sxy + (xi - mx) * (yi - my), sxx + (xi - mx) * (xi - mx))
      });
    if sxx / (x.len() - 1) as f64 <= self.options.variance_epsilon {
      return Err(AnalyticsError::DegenerateRegression {
        regressor: BENCHMARK_REGRESSOR.into(),
      });
    }
    Ok(sxy / sxx)
  }
}
