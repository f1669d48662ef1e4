use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Errors produced by the analytics engine and its components.
#[derive(Error, Debug)]
pub enum AnalyticsError {
  /// Window too short relative to the asset count or a minimum sample size.
  #[error("insufficient data for {context}: required {required} observations, got {actual}")]
  InsufficientData {
    context: String,
    required: usize,
    actual: usize,
  },

  /// A regressor with (numerically) zero variance.
  #[error("degenerate regression: regressor '{regressor}' has zero variance")]
  DegenerateRegression { regressor: String },

  /// Ratio denominator is zero or below the configured epsilon.
  #[error("denominator of '{metric}' is {denominator:e}, below guard epsilon {epsilon:e}")]
  ZeroDivisionGuard {
    metric: String,
    denominator: f64,
    epsilon: f64,
  },

  /// Frontier target return outside the achievable range.
  #[error("target return {target} unreachable under constraints (achievable range [{min}, {max}])")]
  InfeasibleConstraint { target: f64, min: f64, max: f64 },

  /// Active-set solver hit its iteration cap.
  #[error("quadratic program did not converge within {iterations} iterations")]
  NonConvergence { iterations: usize },

  /// A gap where a complete series is required.
  #[error("series '{series}' has a missing observation at {date}")]
  MissingObservation {
    series: String,
    date: chrono::NaiveDate,
  },

  /// Malformed input (empty panel, mismatched lengths, non-finite values...).
  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error("failed to load configuration: {0}")]
  Config(#[from] config::ConfigError),
}

/// Serializable tag of an [`AnalyticsError`], used in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  InsufficientData,
  DegenerateRegression,
  ZeroDivisionGuard,
  InfeasibleConstraint,
  NonConvergence,
  MissingObservation,
  InvalidInput,
  Config,
}

impl AnalyticsError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::InsufficientData { .. } => ErrorKind::InsufficientData,
      Self::DegenerateRegression { .. } => ErrorKind::DegenerateRegression,
      Self::ZeroDivisionGuard { .. } => ErrorKind::ZeroDivisionGuard,
      Self::InfeasibleConstraint { .. } => ErrorKind::InfeasibleConstraint,
      Self::NonConvergence { .. } => ErrorKind::NonConvergence,
      Self::MissingObservation { .. } => ErrorKind::MissingObservation,
      Self::InvalidInput(_) => ErrorKind::InvalidInput,
      Self::Config(_) => ErrorKind::Config,
    }
  }

  /// Errors a frontier sweep recovers from by skipping the target level.
  pub fn is_recoverable_for_sweep(&self) -> bool {
    matches!(
      self,
      Self::InfeasibleConstraint { .. } | Self::NonConvergence { .. }
    )
  }

  pub(crate) fn insufficient(context: impl Into<String>, required: usize, actual: usize) -> Self {
    Self::InsufficientData {
      context: context.into(),
      required,
      actual,
    }
  }
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kind_maps_each_variant() {
    let err = AnalyticsError::insufficient("covariance", 3, 2);
    assert_eq!(err.kind(), ErrorKind::InsufficientData);
    assert!(err.to_string().contains("required 3"));

    let err = AnalyticsError::ZeroDivisionGuard {
      metric: "information_ratio".into(),
      denominator: 0.0,
      epsilon: 1e-12,
    };
    assert_eq!(err.kind(), ErrorKind::ZeroDivisionGuard);
    assert!(!err.is_recoverable_for_sweep());

    let err = AnalyticsError::InfeasibleConstraint {
      target: 0.5,
      min: 0.0,
      max: 0.2,
    };
    assert!(err.is_recoverable_for_sweep());
  }
}
