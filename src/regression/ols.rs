use nalgebra::DMatrix;
use nalgebra::DVector;
use statrs::distribution::ContinuousCDF;
use statrs::distribution::StudentsT;

use super::Coefficient;
use super::RobustEstimator;
use super::StandardErrors;
use crate::error::AnalyticsError;
use crate::error::Result;
use crate::risk::volatility::mean;
use crate::risk::volatility::sample_variance;

/// Settings shared by every OLS fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OlsOptions {
  pub estimator: RobustEstimator,
  /// Below this sample size the classical estimator is used instead.
  pub min_robust_sample: usize,
  pub confidence_level: f64,
  /// Regressors whose sample variance is at or below this are degenerate.
  pub variance_epsilon: f64,
}

/// OLS fit of `y` on an intercept plus named regressors.
#[derive(Debug, Clone)]
pub struct OlsFit {
  /// Intercept first, then one entry per regressor.
  pub names: Vec<String>,
  pub coefficients: Vec<Coefficient>,
  pub residuals: Vec<f64>,
  pub sse: f64,
  pub r_squared: Option<f64>,
  pub adjusted_r_squared: Option<f64>,
  pub residual_std_error: f64,
  pub nobs: usize,
  pub k: usize,
  pub standard_errors: StandardErrors,
  /// Robust errors were requested but the sample was too small.
  pub robust_fallback: bool,
}

pub const INTERCEPT: &str = "intercept";

const COLLINEARITY_TOLERANCE: f64 = 1e-10;

/// Least squares with an intercept column prepended.
///
/// `(X'X)^{-1}` comes from a Cholesky factorization; a design that is not
/// positive definite is reported as [`AnalyticsError::DegenerateRegression`].
pub fn ols(y: &[f64], regressors: &[(&str, &[f64])], opts: OlsOptions) -> Result<OlsFit> {
  let n = y.len();
  let k = regressors.len() + 1;

  if regressors.is_empty() {
    return Err(AnalyticsError::InvalidInput(
      "regression needs at least one regressor".into(),
    ));
  }
  for (name, x) in regressors {
    if x.len() != n {
      return Err(AnalyticsError::InvalidInput(format!(
        "regressor '{name}' has {} observations, response has {n}",
        x.len()
      )));
    }
  }
  if n <= k {
    return Err(AnalyticsError::insufficient("regression", k + 1, n));
  }
  for (name, x) in regressors {
    let var = sample_variance(x).unwrap_or(0.0);
    if var <= opts.variance_epsilon {
      return Err(AnalyticsError::DegenerateRegression {
        regressor: (*name).to_string(),
      });
    }
  }

  let x_mat = DMatrix::from_fn(n, k, |i, j| if j == 0 { 1.0 } else { regressors[j - 1].1[i] });
  let y_vec = DVector::from_column_slice(y);

  let xtx = x_mat.transpose() * &x_mat;
  let collinear = || AnalyticsError::DegenerateRegression {
    regressor: "collinear regressors".into(),
  };
  let Some(chol) = xtx.clone().cholesky() else {
    return Err(collinear());
  };
  // exact collinearity survives Cholesky as a pivot at rounding level
  let l = chol.l_dirty();
  if (0..k).any(|j| l[(j, j)].powi(2) <= COLLINEARITY_TOLERANCE * xtx[(j, j)]) {
    return Err(collinear());
  }
  let xtx_inv = chol.inverse();

  let beta = &xtx_inv * (x_mat.transpose() * &y_vec);
  let resid = &y_vec - &x_mat * &beta;
  let sse = resid.norm_squared();
  let dof = n - k;
  let sigma2 = sse / dof as f64;

  let use_robust = n >= opts.min_robust_sample;
  let robust_fallback = !use_robust;
  if robust_fallback {
    tracing::warn!(
      n,
      min = opts.min_robust_sample,
      "sample below robust minimum, using classical standard errors"
    );
  }

  let cov = if use_robust {
    sandwich(&x_mat, &resid, &xtx_inv, opts.estimator)
  } else {
    &xtx_inv * sigma2
  };

  let t_dist = StudentsT::new(0.0, 1.0, dof as f64)
    .map_err(|e| AnalyticsError::InvalidInput(format!("t distribution: {e}")))?;
  let q = t_dist.inverse_cdf(1.0 - (1.0 - opts.confidence_level) / 2.0);

  let coefficients = (0..k)
    .map(|j| {
      let estimate = beta[j];
      let std_error = cov[(j, j)].max(0.0).sqrt();
      let t_stat = (std_error > 0.0).then(|| estimate / std_error);
      Coefficient {
        estimate,
        std_error,
        t_stat,
        p_value: t_stat.map(|t| (2.0 * t_dist.sf(t.abs())).min(1.0)),
        lower: estimate - q * std_error,
        upper: estimate + q * std_error,
      }
    })
    .collect();

  let y_bar = mean(y);
  let sst: f64 = y.iter().map(|v| (v - y_bar).powi(2)).sum();
  let r_squared = (sst > 0.0).then(|| 1.0 - sse / sst);
  let adjusted_r_squared = r_squared.map(|r2| 1.0 - (1.0 - r2) * (n - 1) as f64 / dof as f64);

  let mut names = Vec::with_capacity(k);
  names.push(INTERCEPT.to_string());
  names.extend(regressors.iter().map(|(name, _)| (*name).to_string()));

  Ok(OlsFit {
    names,
    coefficients,
    residuals: resid.iter().copied().collect(),
    sse,
    r_squared,
    adjusted_r_squared,
    residual_std_error: sigma2.sqrt(),
    nobs: n,
    k,
    standard_errors: if use_robust {
      StandardErrors::Robust {
        estimator: opts.estimator,
      }
    } else {
      StandardErrors::Classical
    },
    robust_fallback,
  })
}

fn sandwich(
  x: &DMatrix<f64>,
  resid: &DVector<f64>,
  xtx_inv: &DMatrix<f64>,
  estimator: RobustEstimator,
) -> DMatrix<f64> {
  let (n, k) = x.shape();
  let mut meat = DMatrix::<f64>::zeros(k, k);

  for i in 0..n {
    let xi = x.row(i).transpose();
    let e2 = resid[i] * resid[i];
    let w = match estimator {
      RobustEstimator::HC0 | RobustEstimator::HC1 => 1.0,
      RobustEstimator::HC3 => {
        let h = (xi.transpose() * xtx_inv * &xi)[(0, 0)];
        // h_ii == 1 only for a point fitted exactly by itself
        1.0 / (1.0 - h).max(f64::EPSILON).powi(2)
      }
    };
    meat += &xi * xi.transpose() * (w * e2);
  }

  let mut cov = xtx_inv * meat * xtx_inv;
  if estimator == RobustEstimator::HC1 {
    cov *= n as f64 / (n - k) as f64;
  }
  cov
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use approx::assert_relative_eq;

  use super::*;

  fn opts(min_robust_sample: usize) -> OlsOptions {
    OlsOptions {
      estimator: RobustEstimator::HC1,
      min_robust_sample,
      confidence_level: 0.95,
      variance_epsilon: 1e-12,
    }
  }

  const X: [f64; 10] = [0.01, -0.02, 0.015, 0.03, -0.01, 0.005, 0.02, -0.025, 0.0, 0.012];

  #[test]
  fn recovers_exact_linear_relation() {
    let y: Vec<f64> = X.iter().map(|x| 0.001 + 1.5 * x).collect();
    let fit = ols(&y, &[("mkt", &X)], opts(5)).unwrap();
    assert_abs_diff_eq!(fit.coefficients[0].estimate, 0.001, epsilon = 1e-12);
    assert_abs_diff_eq!(fit.coefficients[1].estimate, 1.5, epsilon = 1e-10);
    assert_abs_diff_eq!(fit.r_squared.unwrap(), 1.0, epsilon = 1e-10);
    assert_eq!(fit.names, vec!["intercept", "mkt"]);
  }

  #[test]
  fn hc_variants_agree_with_hand_computation() {
    let y = [0.02, -0.01, 0.03, 0.025, -0.02, 0.0, 0.03, -0.03, 0.01, 0.0];
    let fit0 = ols(
      &y,
      &[("mkt", &X)],
      OlsOptions {
        estimator: RobustEstimator::HC0,
        ..opts(5)
      },
    )
    .unwrap();
    let fit1 = ols(&y, &[("mkt", &X)], opts(5)).unwrap();
    let n = y.len() as f64;

    // HC1 = HC0 * n / (n - k)
    for j in 0..2 {
      assert_relative_eq!(
        fit1.coefficients[j].std_error.powi(2),
        fit0.coefficients[j].std_error.powi(2) * n / (n - 2.0),
        max_relative = 1e-10
      );
    }

    // slope HC0 variance: sum((x - x̄)^2 e^2) / (sum (x - x̄)^2)^2
    let x_bar = mean(&X);
    let sxx: f64 = X.iter().map(|x| (x - x_bar).powi(2)).sum();
    let meat: f64 = X
      .iter()
      .zip(&fit0.residuals)
      .map(|(x, e)| (x - x_bar).powi(2) * e * e)
      .sum();
    assert_relative_eq!(
      fit0.coefficients[1].std_error.powi(2),
      meat / (sxx * sxx),
      max_relative = 1e-8
    );
  }

  #[test]
  fn interval_uses_student_t_quantile() {
    let y = [0.02, -0.01, 0.03, 0.025, -0.02, 0.0, 0.03, -0.03, 0.01, 0.0];
    let fit = ols(&y, &[("mkt", &X)], opts(100)).unwrap();
    // t_{0.975, 8} = 2.306004
    let c = fit.coefficients[1];
    assert_relative_eq!(
      (c.upper - c.estimate) / c.std_error,
      2.306004,
      max_relative = 1e-5
    );
    assert!(c.contains(c.estimate));
    assert!(c.p_value.unwrap() > 0.0 && c.p_value.unwrap() <= 1.0);
    assert_eq!(fit.standard_errors, StandardErrors::Classical);
    assert!(fit.robust_fallback);
  }

  #[test]
  fn constant_regressor_is_degenerate() {
    let y = [0.01; 6];
    let x = [0.02; 6];
    let err = ols(&y, &[("flat", &x)], opts(5)).unwrap_err();
    assert!(matches!(
      err,
      AnalyticsError::DegenerateRegression { ref regressor } if regressor == "flat"
    ));
  }

  #[test]
  fn collinear_factors_are_degenerate() {
    let x2: Vec<f64> = X.iter().map(|x| 2.0 * x).collect();
    let y: Vec<f64> = X.iter().map(|x| x + 0.001).collect();
    let err = ols(&y, &[("a", &X), ("b", &x2)], opts(5));
    assert!(matches!(err, Err(AnalyticsError::DegenerateRegression { .. })));
  }

  #[test]
  fn too_few_observations() {
    let err = ols(&[0.01, 0.02], &[("x", &[0.01, 0.03])], opts(5)).unwrap_err();
    assert!(matches!(err, AnalyticsError::InsufficientData { .. }));
  }
}
