use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;

use crate::data::AlignedPanel;
use crate::data::Periodicity;
use crate::error::AnalyticsError;
use crate::error::ErrorKind;
use crate::frontier::Frontier;
use crate::frontier::FrontierPoint;
use crate::regression::RegressionResult;
use crate::risk::MaxDrawdown;

/// Metric names used in [`PerformanceReport::metrics`].
pub mod keys {
  pub const TOTAL_RETURN: &str = "total_return";
  pub const ANNUALIZED_RETURN: &str = "annualized_return";
  pub const ANNUALIZED_VOLATILITY: &str = "annualized_volatility";
  pub const ANNUALIZED_VARIANCE: &str = "annualized_variance";
  pub const MAX_DRAWDOWN: &str = "max_drawdown";
  pub const DOWNSIDE_DEVIATION: &str = "downside_deviation";
  pub const SHARPE_RATIO: &str = "sharpe_ratio";
  pub const SORTINO_RATIO: &str = "sortino_ratio";
  pub const CALMAR_RATIO: &str = "calmar_ratio";
  pub const INFORMATION_RATIO: &str = "information_ratio";
  pub const TRACKING_ERROR: &str = "tracking_error";
  pub const TREYNOR_RATIO: &str = "treynor_ratio";
  pub const ALPHA: &str = "alpha";
  pub const ANNUALIZED_ALPHA: &str = "annualized_alpha";
  pub const ALPHA_STD_ERROR: &str = "alpha_std_error";
  pub const ALPHA_CI_LOWER: &str = "alpha_ci_lower";
  pub const ALPHA_CI_UPPER: &str = "alpha_ci_upper";
  pub const BETA: &str = "beta";
  pub const BETA_STD_ERROR: &str = "beta_std_error";
  pub const BETA_CI_LOWER: &str = "beta_ci_lower";
  pub const BETA_CI_UPPER: &str = "beta_ci_upper";
  pub const R_SQUARED: &str = "r_squared";
}

/// A metric value, or the reason it is undefined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricValue {
  Value(f64),
  Undefined { kind: ErrorKind },
}

impl MetricValue {
  pub fn value(&self) -> Option<f64> {
    match self {
      Self::Value(v) => Some(*v),
      Self::Undefined { .. } => None,
    }
  }

  pub fn is_undefined(&self) -> bool {
    matches!(self, Self::Undefined { .. })
  }
}

impl From<f64> for MetricValue {
  fn from(v: f64) -> Self {
    Self::Value(v)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpan {
  pub label: String,
  pub start: Option<NaiveDate>,
  pub end: Option<NaiveDate>,
  pub observations: usize,
}

impl WindowSpan {
  pub fn unresolved(label: String) -> Self {
    Self {
      label,
      start: None,
      end: None,
      observations: 0,
    }
  }

  pub fn of(label: String, panel: &AlignedPanel) -> Self {
    Self {
      label,
      start: panel.first_date(),
      end: panel.last_date(),
      observations: panel.n_obs(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WindowStatus {
  Completed,
  Failed { kind: ErrorKind, message: String },
}

/// Numbers that are qualified rather than exact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFlags {
  /// Covariance needed diagonal loading to be positive semidefinite.
  pub covariance_adjusted: bool,
  /// Frontier solved on a regularized covariance matrix.
  pub regularized: bool,
  /// Regression reported classical standard errors for lack of data.
  pub robust_fallback: bool,
}

/// Metrics of one evaluation window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
  pub window: WindowSpan,
  pub status: WindowStatus,
  pub periodicity: Periodicity,
  pub metrics: BTreeMap<String, MetricValue>,
  pub benchmark_metrics: BTreeMap<String, MetricValue>,
  pub drawdown: Option<MaxDrawdown>,
  pub regression: Option<RegressionResult>,
  pub factor_regression: Option<RegressionResult>,
  pub frontier: Option<Frontier>,
  pub tangency: Option<FrontierPoint>,
  pub flags: ReportFlags,
}

impl PerformanceReport {
  pub fn failed(window: WindowSpan, periodicity: Periodicity, err: &AnalyticsError) -> Self {
    Self {
      window,
      status: WindowStatus::Failed {
        kind: err.kind(),
        message: err.to_string(),
      },
      periodicity,
      metrics: BTreeMap::new(),
      benchmark_metrics: BTreeMap::new(),
      drawdown: None,
      regression: None,
      factor_regression: None,
      frontier: None,
      tangency: None,
      flags: ReportFlags::default(),
    }
  }

  pub fn is_completed(&self) -> bool {
    self.status == WindowStatus::Completed
  }

  pub fn metric(&self, name: &str) -> Option<MetricValue> {
    self.metrics.get(name).copied()
  }

  /// Defined numeric value of a portfolio metric.
  pub fn value(&self, name: &str) -> Option<f64> {
    self.metric(name).and_then(|m| m.value())
  }

  pub fn benchmark_value(&self, name: &str) -> Option<f64> {
    self.benchmark_metrics.get(name).and_then(|m| m.value())
  }
}
