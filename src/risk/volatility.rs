use super::Annualization;
use crate::config::AnalyticsConfig;
use crate::data::ReturnSeries;
use crate::error::AnalyticsError;
use crate::error::Result;

pub fn mean(xs: &[f64]) -> f64 {
  if xs.is_empty() {
    0.0
  } else {
    xs.iter().sum::<f64>() / xs.len() as f64
  }
}

/// Unbiased sample variance; `None` below two observations.
pub fn sample_variance(xs: &[f64]) -> Option<f64> {
  if xs.len() < 2 {
    return None;
  }
  let m = mean(xs);
  let acc: f64 = xs.iter().map(|x| (x - m) * (x - m)).sum();
  Some(acc / (xs.len() - 1) as f64)
}

pub fn sample_std(xs: &[f64]) -> Option<f64> {
  sample_variance(xs).map(f64::sqrt)
}

/// Annualized standard deviation of `returns`.
pub fn volatility(returns: &[f64], ann: Annualization) -> Result<f64> {
  let sd = sample_std(returns)
    .ok_or_else(|| AnalyticsError::insufficient("volatility", 2, returns.len()))?;
  Ok(sd * ann.volatility_factor())
}

/// Annualized variance, `s² · p`.
pub fn annualized_variance(returns: &[f64], ann: Annualization) -> Result<f64> {
  let var = sample_variance(returns)
    .ok_or_else(|| AnalyticsError::insufficient("variance", 2, returns.len()))?;
  Ok(var * ann.periods_per_year())
}

/// Arithmetic mean scaled by periods per year.
pub fn annualized_mean_return(returns: &[f64], ann: Annualization) -> Result<f64> {
  if returns.is_empty() {
    return Err(AnalyticsError::insufficient("mean return", 1, 0));
  }
  Ok(mean(returns) * ann.periods_per_year())
}

/// [`volatility`] of a gap-free series at its own periodicity.
pub fn series_volatility(series: &ReturnSeries, cfg: &AnalyticsConfig) -> Result<f64> {
  let values = series.complete_values()?;
  volatility(
    &values,
    Annualization::from_config(cfg, series.periodicity()),
  )
}
