use super::Annualization;
use crate::error::AnalyticsError;
use crate::error::Result;

/// Observations strictly below `mar`.
pub fn shortfall_count(returns: &[f64], mar: f64) -> usize {
  returns.iter().filter(|r| **r < mar).count()
}

/// Root mean squared shortfall below the minimum acceptable return.
///
/// $$
/// \mathrm{DD}=\sqrt{\frac{1}{|B|}\sum_{r_i\in B}(r_i-\mathrm{MAR})^2},\quad B=\{r_i<\mathrm{MAR}\}
/// $$
///
/// The denominator is the number of observations below `mar`, not the total
/// count. Returns `0.0` when nothing falls below `mar`.
pub fn downside_deviation(returns: &[f64], mar: f64, ann: Annualization) -> Result<f64> {
  if returns.is_empty() {
    return Err(AnalyticsError::insufficient("downside deviation", 1, 0));
  }

  let (sum_sq, count) = returns
    .iter()
    .filter(|r| **r < mar)
    .fold((0.0, 0usize), |(acc, n), r| (acc + (r - mar).powi(2), n + 1));

  if count == 0 {
    return Ok(0.0);
  }

  Ok((sum_sq / count as f64).sqrt() * ann.volatility_factor())
}
