use std::collections::BTreeSet;
use std::collections::HashSet;
use std::ops::Range;

use chrono::NaiveDate;
use ndarray::s;
use ndarray::Array2;
use ndarray::ArrayView1;
use serde::Deserialize;
use serde::Serialize;

use super::series::Periodicity;
use super::series::ReturnKind;
use super::series::ReturnSeries;
use crate::error::AnalyticsError;
use crate::error::Result;

/// What to do with a date on which at least one series has no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentPolicy {
  /// Drop the incomplete row.
  #[default]
  DropIncomplete,
  /// Fail the alignment.
  Reject,
}

/// Fixed-order return matrix over the common dates of several series.
///
/// Rows are dates (strictly increasing), columns are series. Every cell holds
/// a finite value.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPanel {
  names: Vec<String>,
  dates: Vec<NaiveDate>,
  values: Array2<f64>,
  periodicity: Periodicity,
  kind: ReturnKind,
}

impl AlignedPanel {
  /// Align `series` on their common dates under `policy`.
  pub fn align(series: &[ReturnSeries], policy: AlignmentPolicy) -> Result<Self> {
    let first = series
      .first()
      .ok_or_else(|| AnalyticsError::InvalidInput("cannot align zero series".into()))?;

    let mut seen = HashSet::new();
    for s in series {
      if s.is_empty() {
        return Err(AnalyticsError::InvalidInput(format!(
          "series '{}' is empty",
          s.name()
        )));
      }
      if s.periodicity() != first.periodicity() {
        return Err(AnalyticsError::InvalidInput(format!(
          "series '{}' is {:?} but '{}' is {:?}",
          s.name(),
          s.periodicity(),
          first.name(),
          first.periodicity()
        )));
      }
      if s.kind() != first.kind() {
        return Err(AnalyticsError::InvalidInput(format!(
          "series '{}' holds {:?} returns but '{}' holds {:?}",
          s.name(),
          s.kind(),
          first.name(),
          first.kind()
        )));
      }
      if !seen.insert(s.name()) {
        return Err(AnalyticsError::InvalidInput(format!(
          "duplicate series name '{}'",
          s.name()
        )));
      }
    }

    let universe: BTreeSet<NaiveDate> = series
      .iter()
      .flat_map(|s| s.dates().iter().copied())
      .collect();

    let mut dates = Vec::with_capacity(universe.len());
    let mut flat = Vec::with_capacity(universe.len() * series.len());
    let mut row = Vec::with_capacity(series.len());

    for date in universe.iter().copied() {
      row.clear();
      for s in series {
        match s.value_at(date) {
          Some(v) => row.push(v),
          None => {
            if policy == AlignmentPolicy::Reject {
              return Err(AnalyticsError::MissingObservation {
                series: s.name().to_string(),
                date,
              });
            }
            break;
          }
        }
      }
      if row.len() == series.len() {
        dates.push(date);
        flat.extend_from_slice(&row);
      }
    }

    let dropped = universe.len() - dates.len();
    if dropped > 0 {
      tracing::debug!(
        dropped,
        kept = dates.len(),
        "dropped incomplete rows while aligning panel"
      );
    }

    if dates.is_empty() {
      return Err(AnalyticsError::insufficient("aligned panel", 1, 0));
    }

    let values = Array2::from_shape_vec((dates.len(), series.len()), flat)
      .map_err(|e| AnalyticsError::InvalidInput(e.to_string()))?;

    Ok(Self {
      names: series.iter().map(|s| s.name().to_string()).collect(),
      dates,
      values,
      periodicity: first.periodicity(),
      kind: first.kind(),
    })
  }

  /// Build a panel from an already aligned matrix.
  pub fn from_array(
    names: Vec<String>,
    dates: Vec<NaiveDate>,
    values: Array2<f64>,
    periodicity: Periodicity,
    kind: ReturnKind,
  ) -> Result<Self> {
    if names.is_empty() {
      return Err(AnalyticsError::InvalidInput("panel has zero assets".into()));
    }
    if values.dim() != (dates.len(), names.len()) {
      return Err(AnalyticsError::InvalidInput(format!(
        "panel shape {:?} does not match {} dates x {} names",
        values.dim(),
        dates.len(),
        names.len()
      )));
    }
    if dates.windows(2).any(|w| w[1] <= w[0]) {
      return Err(AnalyticsError::InvalidInput(
        "panel dates must be strictly increasing".into(),
      ));
    }
    if values.iter().any(|v| !v.is_finite()) {
      return Err(AnalyticsError::InvalidInput(
        "panel contains non-finite values".into(),
      ));
    }

    Ok(Self {
      names,
      dates,
      values,
      periodicity,
      kind,
    })
  }

  pub fn names(&self) -> &[String] {
    &self.names
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn values(&self) -> &Array2<f64> {
    &self.values
  }

  pub fn n_assets(&self) -> usize {
    self.names.len()
  }

  pub fn n_obs(&self) -> usize {
    self.dates.len()
  }

  pub fn periodicity(&self) -> Periodicity {
    self.periodicity
  }

  pub fn kind(&self) -> ReturnKind {
    self.kind
  }

  pub fn first_date(&self) -> Option<NaiveDate> {
    self.dates.first().copied()
  }

  pub fn last_date(&self) -> Option<NaiveDate> {
    self.dates.last().copied()
  }

  pub fn index_of(&self, name: &str) -> Option<usize> {
    self.names.iter().position(|n| n == name)
  }

  pub fn column(&self, i: usize) -> ArrayView1<'_, f64> {
    self.values.column(i)
  }

  pub fn column_vec(&self, i: usize) -> Vec<f64> {
    self.values.column(i).to_vec()
  }

  /// Column named `name`, or `InvalidInput`.
  pub fn column_by_name(&self, name: &str) -> Result<Vec<f64>> {
    self
      .index_of(name)
      .map(|i| self.column_vec(i))
      .ok_or_else(|| AnalyticsError::InvalidInput(format!("panel has no column '{name}'")))
  }

  /// Column `i` as a standalone series.
  pub fn series(&self, i: usize) -> Result<ReturnSeries> {
    ReturnSeries::from_values(
      self.names[i].clone(),
      self.periodicity,
      self.kind,
      self.dates.clone(),
      self.column_vec(i),
    )
  }

  /// Panel restricted to the named columns, in the given order.
  pub fn select(&self, names: &[&str]) -> Result<Self> {
    let idx = names
      .iter()
      .map(|n| {
        self
          .index_of(n)
          .ok_or_else(|| AnalyticsError::InvalidInput(format!("panel has no column '{n}'")))
      })
      .collect::<Result<Vec<_>>>()?;

    let values = self.values.select(ndarray::Axis(1), &idx);
    Self::from_array(
      names.iter().map(|n| n.to_string()).collect(),
      self.dates.clone(),
      values,
      self.periodicity,
      self.kind,
    )
  }

  /// Rows in `range`.
  pub fn slice_rows(&self, range: Range<usize>) -> Self {
    let range = range.start.min(self.n_obs())..range.end.min(self.n_obs());
    Self {
      names: self.names.clone(),
      dates: self.dates[range.clone()].to_vec(),
      values: self.values.slice(s![range, ..]).to_owned(),
      periodicity: self.periodicity,
      kind: self.kind,
    }
  }

  /// Rows dated within `[start, end]`.
  pub fn between(&self, start: NaiveDate, end: NaiveDate) -> Self {
    let lo = self.dates.partition_point(|d| *d < start);
    let hi = self.dates.partition_point(|d| *d <= end).max(lo);
    self.slice_rows(lo..hi)
  }

  /// Last `n` rows.
  pub fn tail(&self, n: usize) -> Self {
    let start = self.n_obs().saturating_sub(n);
    self.slice_rows(start..self.n_obs())
  }
}
