use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;

use crate::error::AnalyticsError;
use crate::error::Result;

/// Sampling frequency of a return series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Periodicity {
  Daily,
  Monthly,
}

/// Compounding convention of the stored returns.
///
/// Compounding operations always work on simple returns; log returns are
/// converted with `exp(r) - 1` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
  #[default]
  Simple,
  Log,
}

impl ReturnKind {
  pub fn to_simple(self, r: f64) -> f64 {
    match self {
      Self::Simple => r,
      Self::Log => r.exp_m1(),
    }
  }

  pub fn from_simple(self, r: f64) -> f64 {
    match self {
      Self::Simple => r,
      Self::Log => r.ln_1p(),
    }
  }
}

/// Time-indexed returns of one asset, benchmark or risk-free proxy.
///
/// Dates are strictly increasing. A gap is an explicit `None`, never a dropped
/// row, so that alignment against other series cannot silently shift dates.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnSeries {
  name: String,
  periodicity: Periodicity,
  kind: ReturnKind,
  dates: Vec<NaiveDate>,
  values: Vec<Option<f64>>,
}

impl ReturnSeries {
  /// Build a series from `(date, value)` observations, `None` marking a gap.
  pub fn new(
    name: impl Into<String>,
    periodicity: Periodicity,
    kind: ReturnKind,
    observations: Vec<(NaiveDate, Option<f64>)>,
  ) -> Result<Self> {
    let name = name.into();
    let (dates, values): (Vec<_>, Vec<_>) = observations.into_iter().unzip();

    if let Some(w) = dates.windows(2).find(|w| w[1] <= w[0]) {
      return Err(AnalyticsError::InvalidInput(format!(
        "series '{name}': dates must be strictly increasing ({} then {})",
        w[0], w[1]
      )));
    }

    for (d, v) in dates.iter().zip(values.iter()) {
      if let Some(v) = v {
        if !v.is_finite() {
          return Err(AnalyticsError::InvalidInput(format!(
            "series '{name}': non-finite return {v} at {d}"
          )));
        }
        if kind == ReturnKind::Simple && *v < -1.0 {
          return Err(AnalyticsError::InvalidInput(format!(
            "series '{name}': simple return {v} below -100% at {d}"
          )));
        }
      }
    }

    Ok(Self {
      name,
      periodicity,
      kind,
      dates,
      values,
    })
  }

  /// Build a gap-free series from parallel date and value vectors.
  pub fn from_values(
    name: impl Into<String>,
    periodicity: Periodicity,
    kind: ReturnKind,
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
  ) -> Result<Self> {
    let name = name.into();
    if dates.len() != values.len() {
      return Err(AnalyticsError::InvalidInput(format!(
        "series '{name}': {} dates but {} values",
        dates.len(),
        values.len()
      )));
    }
    let observations = dates.into_iter().zip(values.into_iter().map(Some)).collect();
    Self::new(name, periodicity, kind, observations)
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn periodicity(&self) -> Periodicity {
    self.periodicity
  }

  pub fn kind(&self) -> ReturnKind {
    self.kind
  }

  pub fn len(&self) -> usize {
    self.dates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.dates.is_empty()
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn first_date(&self) -> Option<NaiveDate> {
    self.dates.first().copied()
  }

  pub fn last_date(&self) -> Option<NaiveDate> {
    self.dates.last().copied()
  }

  /// Value on `date`; `None` both for a gap and for an absent date.
  pub fn value_at(&self, date: NaiveDate) -> Option<f64> {
    self
      .dates
      .binary_search(&date)
      .ok()
      .and_then(|i| self.values[i])
  }

  pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, Option<f64>)> + '_ {
    self.dates.iter().copied().zip(self.values.iter().copied())
  }

  pub fn missing_count(&self) -> usize {
    self.values.iter().filter(|v| v.is_none()).count()
  }

  /// All values, failing on the first gap.
  pub fn complete_values(&self) -> Result<Vec<f64>> {
    self
      .iter()
      .map(|(date, v)| {
        v.ok_or_else(|| AnalyticsError::MissingObservation {
          series: self.name.clone(),
          date,
        })
      })
      .collect()
  }

  /// All values as simple returns, failing on the first gap.
  pub fn simple_values(&self) -> Result<Vec<f64>> {
    let kind = self.kind;
    Ok(
      self
        .complete_values()?
        .into_iter()
        .map(|r| kind.to_simple(r))
        .collect(),
    )
  }

  /// Sub-series with dates in `[start, end]`.
  pub fn between(&self, start: NaiveDate, end: NaiveDate) -> Self {
    let lo = self.dates.partition_point(|d| *d < start);
    let hi = self.dates.partition_point(|d| *d <= end);
    let hi = hi.max(lo);
    Self {
      name: self.name.clone(),
      periodicity: self.periodicity,
      kind: self.kind,
      dates: self.dates[lo..hi].to_vec(),
      values: self.values[lo..hi].to_vec(),
    }
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }
}
