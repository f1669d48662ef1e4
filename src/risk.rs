//! # Risk metrics
//!
//! $$
//! \mathrm{MDD}=\max_t\frac{\max_{s\le t}C_s-C_t}{\max_{s\le t}C_s},\qquad C_t=\prod_{i\le t}(1+r_i)
//! $$
//!
//! Volatility, drawdown and downside deviation of return series, plus a
//! restartable rolling-window iterator.

pub mod downside;
pub mod drawdown;
pub mod rolling;
pub mod volatility;

pub use downside::downside_deviation;
pub use drawdown::max_drawdown;
pub use drawdown::MaxDrawdown;
pub use rolling::RollingWindow;
pub use volatility::volatility;

use crate::config::AnalyticsConfig;
use crate::data::Periodicity;

/// Scaling from per-period statistics to annual ones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Annualization {
  periods_per_year: f64,
}

impl Annualization {
  pub fn new(periods_per_year: f64) -> Self {
    Self { periods_per_year }
  }

  pub fn from_config(cfg: &AnalyticsConfig, periodicity: Periodicity) -> Self {
    Self::new(cfg.periods_per_year(periodicity))
  }

  /// No scaling: results stay per period.
  pub fn per_period() -> Self {
    Self::new(1.0)
  }

  pub fn periods_per_year(&self) -> f64 {
    self.periods_per_year
  }

  /// Factor applied to dispersion measures, `√p`.
  pub fn volatility_factor(&self) -> f64 {
    self.periods_per_year.sqrt()
  }
}
