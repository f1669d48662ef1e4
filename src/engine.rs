//! # Analytics engine
//!
//! $$
//! \text{series}\ \to\ \mathcal P_w\ \to\ \{\Sigma_w,\ \text{risk},\ (\alpha,\beta),\ \text{ratios},\ \text{frontier}\}\ \to\ \text{report}_w
//! $$
//!
//! Evaluates every configured window independently and in parallel. A window
//! that fails is reported as failed; the others still complete.

pub mod report;
pub mod window;

use std::collections::BTreeMap;

pub use report::keys;
pub use report::MetricValue;
pub use report::PerformanceReport;
pub use report::ReportFlags;
pub use report::WindowSpan;
pub use report::WindowStatus;
pub use window::EvaluationWindow;

use rayon::prelude::*;

use crate::config::AnalyticsConfig;
use crate::covariance::CovarianceCache;
use crate::covariance::CovarianceEstimator;
use crate::data::AlignedPanel;
use crate::data::ReturnKind;
use crate::data::ReturnSeries;
use crate::data::WeightSchedule;
use crate::error::AnalyticsError;
use crate::error::ErrorKind;
use crate::error::Result;
use crate::frontier::FrontierOptimizer;
use crate::ratios::excess_returns;
use crate::ratios::RatioCalculator;
use crate::regression::Coefficient;
use crate::regression::FactorRegression;
use crate::regression::BENCHMARK_REGRESSOR;
use crate::risk::downside_deviation;
use crate::risk::drawdown::max_drawdown_path;
use crate::risk::drawdown::total_return;
use crate::risk::max_drawdown;
use crate::risk::volatility;
use crate::risk::volatility::annualized_mean_return;
use crate::risk::volatility::annualized_variance;
use crate::risk::volatility::mean;
use crate::risk::Annualization;

/// Everything the engine needs from the data-loading and
/// portfolio-construction collaborators.
#[derive(Debug, Clone)]
pub struct EngineInput {
  pub assets: Vec<ReturnSeries>,
  pub benchmark: ReturnSeries,
  /// Per-period risk-free returns; the configured constant rate when absent.
  pub risk_free: Option<ReturnSeries>,
  /// Extra regressors for a multi-factor fit next to CAPM.
  pub factors: Vec<ReturnSeries>,
  pub weights: WeightSchedule,
}

impl EngineInput {
  pub fn new(assets: Vec<ReturnSeries>, benchmark: ReturnSeries, weights: WeightSchedule) -> Self {
    Self {
      assets,
      benchmark,
      risk_free: None,
      factors: Vec::new(),
      weights,
    }
  }

  pub fn with_risk_free(mut self, risk_free: ReturnSeries) -> Self {
    self.risk_free = Some(risk_free);
    self
  }

  pub fn with_factors(mut self, factors: Vec<ReturnSeries>) -> Self {
    self.factors = factors;
    self
  }

  /// Reject inputs no window could be evaluated on.
  fn validate(&self) -> Result<()> {
    if self.assets.is_empty() {
      return Err(AnalyticsError::InvalidInput("zero assets".into()));
    }
    let all = self
      .assets
      .iter()
      .chain(std::iter::once(&self.benchmark))
      .chain(&self.risk_free)
      .chain(&self.factors);
    for s in all {
      if s.is_empty() {
        return Err(AnalyticsError::InvalidInput(format!(
          "series '{}' is empty",
          s.name()
        )));
      }
    }
    for a in self.weights.assets() {
      if !self.assets.iter().any(|s| s.name() == a.as_str()) {
        return Err(AnalyticsError::InvalidInput(format!(
          "weight schedule references unknown asset '{a}'"
        )));
      }
    }
    Ok(())
  }

  fn series(&self) -> Vec<ReturnSeries> {
    self
      .assets
      .iter()
      .chain(std::iter::once(&self.benchmark))
      .chain(&self.risk_free)
      .chain(&self.factors)
      .cloned()
      .collect()
  }
}

/// Stateless apart from its configuration; each run owns its covariance cache.
#[derive(Debug, Clone)]
pub struct AnalyticsEngine {
  config: AnalyticsConfig,
}

impl AnalyticsEngine {
  pub fn new(config: AnalyticsConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn config(&self) -> &AnalyticsConfig {
    &self.config
  }

  /// One report per configured window, in configuration order.
  ///
  /// Only malformed input (no assets, an empty series, series that cannot be
  /// aligned) fails the whole run.
  pub fn run(&self, input: &EngineInput) -> Result<Vec<PerformanceReport>> {
    input.validate()?;
    let panel = AlignedPanel::align(&input.series(), self.config.alignment)?;
    let cache = CovarianceCache::new();

    tracing::info!(
      assets = input.assets.len(),
      observations = panel.n_obs(),
      windows = self.config.windows.len(),
      "running analytics"
    );

    let reports = self
      .config
      .windows
      .par_iter()
      .map(|window| self.evaluate(window, input, &panel, &cache))
      .collect();

    Ok(reports)
  }

  #[tracing::instrument(skip_all, fields(window = %window.label()))]
  fn evaluate(
    &self,
    window: &EvaluationWindow,
    input: &EngineInput,
    panel: &AlignedPanel,
    cache: &CovarianceCache,
  ) -> PerformanceReport {
    let periodicity = panel.periodicity();
    let sliced = match window.apply(panel, &self.config) {
      Ok(p) => p,
      Err(err) => {
        tracing::warn!(%err, "window could not be resolved");
        return PerformanceReport::failed(
          WindowSpan::unresolved(window.label()),
          periodicity,
          &err,
        );
      }
    };

    let span = WindowSpan::of(window.label(), &sliced);
    match self.compute(input, &sliced, cache, span.clone()) {
      Ok(report) => {
        tracing::debug!(observations = span.observations, "window completed");
        report
      }
      Err(err) => {
        tracing::warn!(%err, kind = ?err.kind(), "window failed");
        PerformanceReport::failed(span, periodicity, &err)
      }
    }
  }

  fn compute(
    &self,
    input: &EngineInput,
    panel: &AlignedPanel,
    cache: &CovarianceCache,
    span: WindowSpan,
  ) -> Result<PerformanceReport> {
    let cfg = &self.config;
    let periodicity = panel.periodicity();
    let ann = Annualization::from_config(cfg, periodicity);
    let p = ann.periods_per_year();
    let kind = panel.kind();
    let simple =
      |v: Vec<f64>| -> Vec<f64> { v.into_iter().map(|r| kind.to_simple(r)).collect() };

    let names: Vec<&str> = input.assets.iter().map(|s| s.name()).collect();
    let assets = panel.select(&names)?;
    let assets = AlignedPanel::from_array(
      assets.names().to_vec(),
      assets.dates().to_vec(),
      assets.values().mapv(|r| kind.to_simple(r)),
      periodicity,
      ReturnKind::Simple,
    )?;

    let portfolio = input.weights.portfolio_returns(&assets)?;
    let benchmark = simple(panel.column_by_name(input.benchmark.name())?);
    let risk_free = match &input.risk_free {
      Some(rf) => simple(panel.column_by_name(rf.name())?),
      None => vec![cfg.risk_free.per_period(p); panel.n_obs()],
    };
    let excess_p = excess_returns(&portfolio, &risk_free)?;
    let excess_b = excess_returns(&benchmark, &risk_free)?;
    let ratios = RatioCalculator::from_config(cfg, periodicity);

    let mut metrics = self.series_metrics(&portfolio, &excess_p, &ratios, ann)?;
    let benchmark_metrics = self.series_metrics(&benchmark, &excess_b, &ratios, ann)?;

    let active = excess_returns(&portfolio, &benchmark)?;
    metrics.insert(keys::TRACKING_ERROR.into(), volatility(&active, ann)?.into());
    metrics.insert(
      keys::INFORMATION_RATIO.into(),
      undefined_on_guard(ratios.information_ratio(&portfolio, &benchmark))?,
    );

    let regression = FactorRegression::from_config(cfg);
    let capm = regression.capm_values(&excess_p, &excess_b, ann)?;
    let beta = capm
      .beta()
      .ok_or_else(|| AnalyticsError::InvalidInput("CAPM fit has no beta".into()))?;
    insert_coefficient(
      &mut metrics,
      &capm.alpha,
      [
        keys::ALPHA,
        keys::ALPHA_STD_ERROR,
        keys::ALPHA_CI_LOWER,
        keys::ALPHA_CI_UPPER,
      ],
    );
    insert_coefficient(
      &mut metrics,
      beta,
      [
        keys::BETA,
        keys::BETA_STD_ERROR,
        keys::BETA_CI_LOWER,
        keys::BETA_CI_UPPER,
      ],
    );
    metrics.insert(keys::ANNUALIZED_ALPHA.into(), capm.annualized_alpha().into());
    metrics.insert(
      keys::R_SQUARED.into(),
      capm.r_squared.map_or(
        MetricValue::Undefined {
          kind: ErrorKind::ZeroDivisionGuard,
        },
        MetricValue::Value,
      ),
    );
    metrics.insert(
      keys::TREYNOR_RATIO.into(),
      undefined_on_guard(ratios.treynor(&excess_p, beta.estimate))?,
    );

    // benchmark first, then the extra factors
    let factor_regression = if input.factors.is_empty() {
      None
    } else {
      let columns = input
        .factors
        .iter()
        .map(|f| Ok((f.name(), simple(panel.column_by_name(f.name())?))))
        .collect::<Result<Vec<_>>>()?;
      let factors: Vec<(&str, &[f64])> =
        std::iter::once((BENCHMARK_REGRESSOR, excess_b.as_slice()))
          .chain(columns.iter().map(|(n, c)| (*n, c.as_slice())))
          .collect();
      Some(regression.multi_factor(&excess_p, &factors, ann)?)
    };

    let portfolio_series = ReturnSeries::from_values(
      "portfolio",
      periodicity,
      ReturnKind::Simple,
      panel.dates().to_vec(),
      portfolio.clone(),
    )?;
    let drawdown = max_drawdown(&portfolio_series)?;

    let estimator = CovarianceEstimator::from_config(cfg);
    let covariance = cache.get_or_estimate(&estimator, &assets, None)?;
    let annual = covariance.scaled(p);
    let mu: Vec<f64> = (0..assets.n_assets())
      .map(|i| mean(&assets.column_vec(i)) * p)
      .collect();
    let frontier = FrontierOptimizer::from_config(cfg).sweep(&annual, &mu)?;
    let tangency = frontier
      .tangency(mean(&risk_free) * p, cfg.zero_division_epsilon)
      .ok()
      .cloned();

    let flags = ReportFlags {
      covariance_adjusted: covariance.adjusted(),
      regularized: frontier.regularized,
      robust_fallback: capm.robust_fallback
        || factor_regression.as_ref().is_some_and(|r| r.robust_fallback),
    };

    Ok(PerformanceReport {
      window: span,
      status: WindowStatus::Completed,
      periodicity,
      metrics,
      benchmark_metrics,
      drawdown: Some(drawdown),
      regression: Some(capm),
      factor_regression,
      frontier: Some(frontier),
      tangency,
      flags,
    })
  }

  /// Metrics shared by the portfolio and the benchmark.
  fn series_metrics(
    &self,
    returns: &[f64],
    excess: &[f64],
    ratios: &RatioCalculator,
    ann: Annualization,
  ) -> Result<BTreeMap<String, MetricValue>> {
    let mut m = BTreeMap::new();
    m.insert(keys::TOTAL_RETURN.into(), total_return(returns).into());
    m.insert(
      keys::ANNUALIZED_RETURN.into(),
      annualized_mean_return(returns, ann)?.into(),
    );
    m.insert(
      keys::ANNUALIZED_VOLATILITY.into(),
      volatility(returns, ann)?.into(),
    );
    m.insert(
      keys::ANNUALIZED_VARIANCE.into(),
      annualized_variance(returns, ann)?.into(),
    );
    m.insert(
      keys::MAX_DRAWDOWN.into(),
      max_drawdown_path(returns).depth.into(),
    );
    m.insert(
      keys::DOWNSIDE_DEVIATION.into(),
      downside_deviation(returns, self.config.minimum_acceptable_return, ann)?.into(),
    );
    m.insert(keys::SHARPE_RATIO.into(), undefined_on_guard(ratios.sharpe(excess))?);
    m.insert(keys::SORTINO_RATIO.into(), undefined_on_guard(ratios.sortino(excess))?);
    m.insert(keys::CALMAR_RATIO.into(), undefined_on_guard(ratios.calmar(returns))?);
    Ok(m)
  }
}

/// A guarded ratio becomes an undefined metric; other errors fail the window.
fn undefined_on_guard(value: Result<f64>) -> Result<MetricValue> {
  match value {
    Ok(v) => Ok(MetricValue::Value(v)),
    Err(err @ AnalyticsError::ZeroDivisionGuard { .. }) => {
      tracing::debug!(%err, "metric undefined");
      Ok(MetricValue::Undefined { kind: err.kind() })
    }
    Err(err) => Err(err),
  }
}

/// Estimate, standard error and interval bounds under `[estimate, se, lower, upper]` keys.
fn insert_coefficient(
  metrics: &mut BTreeMap<String, MetricValue>,
  c: &Coefficient,
  names: [&str; 4],
) {
  let [estimate, std_error, lower, upper] = names;
  metrics.insert(estimate.into(), c.estimate.into());
  metrics.insert(std_error.into(), c.std_error.into());
  metrics.insert(lower.into(), c.lower.into());
  metrics.insert(upper.into(), c.upper.into());
}
