//! # Risk-adjusted ratios
//!
//! $$
//! \mathrm{SR}=\frac{\overline{r-r_f}}{s(r-r_f)}\sqrt{p},\qquad
//! \mathrm{IR}=\frac{\overline{r_p-r_b}}{s(r_p-r_b)}\sqrt{p}
//! $$
//!
//! Numerators and denominators are formed per period and annualized once.
//! A denominator at or below the guard epsilon is an error, never a NaN.

use chrono::NaiveDate;

use crate::config::AnalyticsConfig;
use crate::data::Periodicity;
use crate::error::AnalyticsError;
use crate::error::Result;
use crate::risk::downside_deviation;
use crate::risk::drawdown::max_drawdown_path;
use crate::risk::drawdown::total_return;
use crate::risk::volatility::mean;
use crate::risk::volatility::sample_std;
use crate::risk::Annualization;
use crate::risk::RollingWindow;

/// `returns[t] - risk_free[t]`.
pub fn excess_returns(returns: &[f64], risk_free: &[f64]) -> Result<Vec<f64>> {
  if returns.len() != risk_free.len() {
    return Err(AnalyticsError::InvalidInput(format!(
      "excess returns need equal lengths, got {} and {}",
      returns.len(),
      risk_free.len()
    )));
  }
  Ok(returns.iter().zip(risk_free).map(|(r, f)| r - f).collect())
}

/// Fail with [`AnalyticsError::ZeroDivisionGuard`] when `|denominator| <= epsilon`.
pub fn guard(metric: &str, denominator: f64, epsilon: f64) -> Result<f64> {
  if denominator.abs() <= epsilon || !denominator.is_finite() {
    return Err(AnalyticsError::ZeroDivisionGuard {
      metric: metric.to_string(),
      denominator,
      epsilon,
    });
  }
  Ok(denominator)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioCalculator {
  annualization: Annualization,
  zero_division_epsilon: f64,
  minimum_acceptable_return: f64,
}

impl RatioCalculator {
  pub fn new(
    annualization: Annualization,
    zero_division_epsilon: f64,
    minimum_acceptable_return: f64,
  ) -> Self {
    Self {
      annualization,
      zero_division_epsilon,
      minimum_acceptable_return,
    }
  }

  pub fn from_config(cfg: &AnalyticsConfig, periodicity: Periodicity) -> Self {
    Self::new(
      Annualization::from_config(cfg, periodicity),
      cfg.zero_division_epsilon,
      cfg.minimum_acceptable_return,
    )
  }

  pub fn annualization(&self) -> Annualization {
    self.annualization
  }

  pub fn sharpe(&self, excess: &[f64]) -> Result<f64> {
    let sd = sample_std(excess)
      .ok_or_else(|| AnalyticsError::insufficient("sharpe_ratio", 2, excess.len()))?;
    let sd = guard("sharpe_ratio", sd, self.zero_division_epsilon)?;
    Ok(mean(excess) / sd * self.annualization.volatility_factor())
  }

  /// Mean excess return over downside deviation below the configured MAR.
  pub fn sortino(&self, excess: &[f64]) -> Result<f64> {
    let dd = downside_deviation(
      excess,
      self.minimum_acceptable_return,
      Annualization::per_period(),
    )?;
    let dd = guard("sortino_ratio", dd, self.zero_division_epsilon)?;
    Ok(mean(excess) / dd * self.annualization.volatility_factor())
  }

  /// Active return over tracking error.
  pub fn information_ratio(&self, portfolio: &[f64], benchmark: &[f64]) -> Result<f64> {
    let active = excess_returns(portfolio, benchmark)?;
    let te = sample_std(&active)
      .ok_or_else(|| AnalyticsError::insufficient("information_ratio", 2, active.len()))?;
    let te = guard("information_ratio", te, self.zero_division_epsilon)?;
    Ok(mean(&active) / te * self.annualization.volatility_factor())
  }

  /// Annualized mean excess return per unit of beta.
  pub fn treynor(&self, excess: &[f64], beta: f64) -> Result<f64> {
    if excess.is_empty() {
      return Err(AnalyticsError::insufficient("treynor_ratio", 1, 0));
    }
    let beta = guard("treynor_ratio", beta, self.zero_division_epsilon)?;
    Ok(mean(excess) * self.annualization.periods_per_year() / beta)
  }

  /// Compound annual growth rate over maximum drawdown, from simple returns.
  pub fn calmar(&self, simple: &[f64]) -> Result<f64> {
    if simple.is_empty() {
      return Err(AnalyticsError::insufficient("calmar_ratio", 1, 0));
    }
    let years = simple.len() as f64 / self.annualization.periods_per_year();
    let cagr = (1.0 + total_return(simple)).powf(1.0 / years) - 1.0;
    let depth = guard(
      "calmar_ratio",
      max_drawdown_path(simple).depth,
      self.zero_division_epsilon,
    )?;
    Ok(cagr / depth)
  }

  /// Sharpe ratio over each full window, dated by the window's last date.
  ///
  /// Windows whose volatility is zero are omitted.
  pub fn rolling_sharpe(
    &self,
    excess: &[f64],
    dates: &[NaiveDate],
    length: usize,
  ) -> Result<Vec<(NaiveDate, f64)>> {
    if dates.len() != excess.len() {
      return Err(AnalyticsError::InvalidInput(
        "rolling sharpe needs one date per observation".into(),
      ));
    }
    let mut out = Vec::new();
    for w in RollingWindow::new(excess, length)? {
      match self.sharpe(w.values) {
        Ok(v) => out.push((dates[w.end], v)),
        Err(AnalyticsError::ZeroDivisionGuard { .. }) => {}
        Err(e) => return Err(e),
      }
    }
    Ok(out)
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;
  use crate::config::RiskFreeConfig;
  use crate::data::testing::month_starts;

  const PORTFOLIO: [f64; 12] = [
    0.021, -0.013, 0.034, 0.008, -0.022, 0.015, 0.027, -0.005, 0.012, 0.019, -0.031, 0.024,
  ];
  const BENCHMARK: [f64; 12] = [
    0.018, -0.010, 0.029, 0.011, -0.025, 0.012, 0.022, -0.002, 0.009, 0.016, -0.027, 0.020,
  ];

  fn monthly_calculator() -> RatioCalculator {
    RatioCalculator::new(Annualization::new(12.0), 1e-12, 0.0)
  }

  fn excess() -> Vec<f64> {
    let rf = RiskFreeConfig { annual_rate: 0.02 }.per_period(12.0);
    PORTFOLIO.iter().map(|r| r - rf).collect()
  }

  #[test]
  fn twelve_month_reference_values() {
    let calc = monthly_calculator();
    assert_abs_diff_eq!(calc.sharpe(&excess()).unwrap(), 0.9687, epsilon = 5e-5);
    assert_abs_diff_eq!(
      calc.information_ratio(&PORTFOLIO, &BENCHMARK).unwrap(),
      1.3300,
      epsilon = 5e-5
    );
    assert_abs_diff_eq!(calc.sortino(&excess()).unwrap(), 0.9201, epsilon = 5e-5);
  }

  #[test]
  fn identical_portfolio_and_benchmark_has_undefined_ir() {
    let err = monthly_calculator()
      .information_ratio(&BENCHMARK, &BENCHMARK)
      .unwrap_err();
    assert!(matches!(
      err,
      AnalyticsError::ZeroDivisionGuard { ref metric, .. } if metric == "information_ratio"
    ));
  }

  #[test]
  fn constant_excess_has_undefined_sharpe() {
    let err = monthly_calculator().sharpe(&[0.01; 6]).unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::ZeroDivisionGuard);
  }

  #[test]
  fn sortino_without_downside_is_undefined() {
    let err = monthly_calculator().sortino(&[0.01, 0.02, 0.0]).unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::ZeroDivisionGuard);
  }

  #[test]
  fn treynor_and_calmar() {
    let calc = monthly_calculator();
    let t = calc.treynor(&excess(), 1.1).unwrap();
    assert_abs_diff_eq!(t, mean(&excess()) * 12.0 / 1.1, epsilon = 1e-12);
    assert!(calc.treynor(&excess(), 0.0).is_err());

    // one year, total return 10%, drawdown 20%
    let r = [0.375, -0.2, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
    assert_abs_diff_eq!(calc.calmar(&r).unwrap(), 0.1 / 0.2, epsilon = 1e-12);
    assert!(calc.calmar(&[0.01, 0.02]).is_err());
  }

  #[test]
  fn rolling_sharpe_emits_one_value_per_full_window() {
    let e = excess();
    let dates = month_starts(12);
    let out = monthly_calculator().rolling_sharpe(&e, &dates, 6).unwrap();
    assert_eq!(out.len(), 7);
    assert_eq!(out[0].0, dates[5]);
    let expected = monthly_calculator().sharpe(&e[6..]).unwrap();
    assert_abs_diff_eq!(out[6].1, expected, epsilon = 1e-15);
  }

  #[test]
  fn excess_requires_equal_lengths() {
    assert!(excess_returns(&[0.01], &[0.0, 0.0]).is_err());
  }
}
