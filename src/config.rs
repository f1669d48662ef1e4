//! # Configuration
//!
//! $$
//! \sigma_{\text{ann}}=\sigma_{\text{period}}\sqrt{p}
//! $$
//!
//! Explicit configuration threaded into every component call.

use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::covariance::CovarianceMethod;
use crate::data::AlignmentPolicy;
use crate::data::Periodicity;
use crate::engine::EvaluationWindow;
use crate::error::AnalyticsError;
use crate::error::Result;
use crate::frontier::WeightConstraints;
use crate::regression::RobustEstimator;

/// Root configuration of the analytics engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
  pub risk_free: RiskFreeConfig,
  pub annualization: AnnualizationConfig,
  /// Two-sided confidence level of regression intervals.
  pub confidence_level: f64,
  /// Per-period minimum acceptable return for downside metrics.
  pub minimum_acceptable_return: f64,
  pub covariance: CovarianceMethod,
  pub frontier: FrontierConfig,
  /// Smallest diagonal load added when a matrix is regularized.
  pub diagonal_loading_epsilon: f64,
  /// Below this sample size regressions fall back to classical standard errors.
  pub min_robust_sample: usize,
  pub robust_estimator: RobustEstimator,
  /// Ratio denominators at or below this are reported as undefined.
  pub zero_division_epsilon: f64,
  pub alignment: AlignmentPolicy,
  pub windows: Vec<EvaluationWindow>,
}

impl Default for AnalyticsConfig {
  fn default() -> Self {
    Self {
      risk_free: RiskFreeConfig::default(),
      annualization: AnnualizationConfig::default(),
      confidence_level: 0.95,
      minimum_acceptable_return: 0.0,
      covariance: CovarianceMethod::Sample,
      frontier: FrontierConfig::default(),
      diagonal_loading_epsilon: 1e-10,
      min_robust_sample: 24,
      robust_estimator: RobustEstimator::HC1,
      zero_division_epsilon: 1e-12,
      alignment: AlignmentPolicy::DropIncomplete,
      windows: vec![EvaluationWindow::FullSample],
    }
  }
}

impl AnalyticsConfig {
  /// Periods per year for `periodicity`.
  pub fn periods_per_year(&self, periodicity: Periodicity) -> f64 {
    self.annualization.periods_per_year(periodicity)
  }

  /// Check value ranges that serde cannot express.
  pub fn validate(&self) -> Result<()> {
    if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
      return Err(invalid(format!(
        "confidence_level must be in (0, 1), got {}",
        self.confidence_level
      )));
    }
    if let CovarianceMethod::Ewma { decay } = self.covariance {
      if !(decay > 0.0 && decay < 1.0) {
        return Err(invalid(format!("EWMA decay must be in (0, 1), got {decay}")));
      }
    }
    if self.frontier.points < 2 {
      return Err(invalid(format!(
        "frontier.points must be at least 2, got {}",
        self.frontier.points
      )));
    }
    if self.frontier.max_condition_number <= 1.0 {
      return Err(invalid("frontier.max_condition_number must exceed 1".into()));
    }
    if self.diagonal_loading_epsilon <= 0.0 || self.zero_division_epsilon <= 0.0 {
      return Err(invalid("epsilons must be strictly positive".into()));
    }
    if self.annualization.daily <= 0.0 || self.annualization.monthly <= 0.0 {
      return Err(invalid("annualization factors must be positive".into()));
    }
    if self.risk_free.annual_rate <= -1.0 {
      return Err(invalid("risk_free.annual_rate must exceed -100%".into()));
    }
    if self.windows.is_empty() {
      return Err(invalid("at least one evaluation window is required".into()));
    }
    Ok(())
  }
}

fn invalid(msg: String) -> AnalyticsError {
  AnalyticsError::InvalidInput(msg)
}

/// Constant risk-free rate used when no risk-free series is supplied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskFreeConfig {
  /// Annual rate, e.g. `0.02` for 2%.
  pub annual_rate: f64,
}

impl Default for RiskFreeConfig {
  fn default() -> Self {
    Self { annual_rate: 0.02 }
  }
}

impl RiskFreeConfig {
  /// Geometric de-annualization: `(1 + rf)^(1/p) - 1`.
  pub fn per_period(&self, periods_per_year: f64) -> f64 {
    (1.0 + self.annual_rate).powf(1.0 / periods_per_year) - 1.0
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnualizationConfig {
  pub daily: f64,
  pub monthly: f64,
}

impl Default for AnnualizationConfig {
  fn default() -> Self {
    Self {
      daily: 252.0,
      monthly: 12.0,
    }
  }
}

impl AnnualizationConfig {
  pub fn periods_per_year(&self, periodicity: Periodicity) -> f64 {
    match periodicity {
      Periodicity::Daily => self.daily,
      Periodicity::Monthly => self.monthly,
    }
  }
}

/// Efficient-frontier sweep settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontierConfig {
  /// Number of target-return levels in the sweep.
  pub points: usize,
  /// Condition numbers above this trigger diagonal loading.
  pub max_condition_number: f64,
  /// Active-set iteration cap per target level.
  pub max_iterations: usize,
  pub constraints: WeightConstraints,
}

impl Default for FrontierConfig {
  fn default() -> Self {
    Self {
      points: 50,
      max_condition_number: 1e10,
      max_iterations: 500,
      constraints: WeightConstraints::LongOnly,
    }
  }
}

/// Load configuration from a TOML file, with `PERFRISK__*` environment overrides.
///
/// Nested keys use a double underscore, e.g. `PERFRISK__RISK_FREE__ANNUAL_RATE=0.03`.
pub fn load_config(path: impl AsRef<Path>) -> Result<AnalyticsConfig> {
  let builder = config::Config::builder()
    .add_source(config::File::from(path.as_ref()).required(true))
    .add_source(
      config::Environment::with_prefix("PERFRISK")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true),
    )
    .build()?;

  let cfg = builder.try_deserialize::<AnalyticsConfig>()?;
  cfg.validate()?;
  tracing::debug!(?cfg, "loaded analytics configuration");

  Ok(cfg)
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;

  #[test]
  fn defaults_are_valid() {
    let cfg = AnalyticsConfig::default();
    cfg.validate().unwrap();
    assert_eq!(cfg.periods_per_year(Periodicity::Daily), 252.0);
    assert_eq!(cfg.periods_per_year(Periodicity::Monthly), 12.0);
    assert_eq!(cfg.frontier.points, 50);
    assert_eq!(cfg.min_robust_sample, 24);
  }

  #[test]
  fn per_period_risk_free_compounds_back_to_annual() {
    let rf = RiskFreeConfig { annual_rate: 0.05 };
    let monthly = rf.per_period(12.0);
    assert!(((1.0 + monthly).powi(12) - 1.05).abs() < 1e-12);
  }

  #[test]
  fn validate_rejects_out_of_range_values() {
    let cfg = AnalyticsConfig {
      confidence_level: 1.0,
      ..Default::default()
    };
    assert!(cfg.validate().is_err());

    let cfg = AnalyticsConfig {
      covariance: CovarianceMethod::Ewma { decay: 1.5 },
      ..Default::default()
    };
    assert!(cfg.validate().is_err());

    let mut cfg = AnalyticsConfig::default();
    cfg.frontier.points = 1;
    assert!(cfg.validate().is_err());
  }

  #[test]
  fn load_config_reads_toml_and_keeps_defaults() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
      file,
      r#"
confidence_level = 0.9
minimum_acceptable_return = 0.001

[risk_free]
annual_rate = 0.03

[covariance]
kind = "ewma"
decay = 0.97

[frontier]
points = 20

[[windows]]
kind = "trailing_years"
years = 3

[[windows]]
kind = "full_sample"
"#
    )
    .unwrap();

    let cfg = load_config(file.path()).unwrap();
    assert_eq!(cfg.confidence_level, 0.9);
    assert_eq!(cfg.risk_free.annual_rate, 0.03);
    assert_eq!(cfg.covariance, CovarianceMethod::Ewma { decay: 0.97 });
    assert_eq!(cfg.frontier.points, 20);
    assert_eq!(cfg.frontier.max_iterations, 500);
    assert_eq!(
      cfg.windows,
      vec![
        EvaluationWindow::TrailingYears { years: 3 },
        EvaluationWindow::FullSample
      ]
    );
    assert_eq!(cfg.min_robust_sample, 24);
  }

  #[test]
  fn load_config_fails_on_missing_file() {
    let err = load_config("/definitely/not/here.toml").unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::Config);
  }
}
