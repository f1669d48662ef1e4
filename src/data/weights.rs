use chrono::NaiveDate;

use super::panel::AlignedPanel;
use crate::error::AnalyticsError;
use crate::error::Result;

/// Portfolio weights keyed by rebalancing date.
///
/// A weight vector is in effect from its rebalancing date (inclusive) until the
/// next one; the portfolio is reset to those weights every period in between.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightSchedule {
  assets: Vec<String>,
  entries: Vec<(NaiveDate, Vec<f64>)>,
}

impl WeightSchedule {
  pub fn new(assets: Vec<String>, entries: Vec<(NaiveDate, Vec<f64>)>) -> Result<Self> {
    if assets.is_empty() {
      return Err(AnalyticsError::InvalidInput(
        "weight schedule has zero assets".into(),
      ));
    }
    if entries.is_empty() {
      return Err(AnalyticsError::InvalidInput(
        "weight schedule has no rebalancing dates".into(),
      ));
    }
    if entries.windows(2).any(|w| w[1].0 <= w[0].0) {
      return Err(AnalyticsError::InvalidInput(
        "rebalancing dates must be strictly increasing".into(),
      ));
    }
    for (date, w) in &entries {
      if w.len() != assets.len() {
        return Err(AnalyticsError::InvalidInput(format!(
          "weights on {date} have {} entries for {} assets",
          w.len(),
          assets.len()
        )));
      }
      if w.iter().any(|x| !x.is_finite()) {
        return Err(AnalyticsError::InvalidInput(format!(
          "weights on {date} contain non-finite values"
        )));
      }
      let total: f64 = w.iter().sum();
      if (total - 1.0).abs() > 1e-6 {
        tracing::warn!(%date, total, "weights do not sum to one");
      }
    }

    Ok(Self { assets, entries })
  }

  /// The same weights on every date.
  pub fn constant(assets: Vec<String>, weights: Vec<f64>) -> Result<Self> {
    Self::new(assets, vec![(NaiveDate::MIN, weights)])
  }

  /// `1/n` in every asset.
  pub fn equal_weight(assets: Vec<String>) -> Result<Self> {
    let n = assets.len().max(1);
    let w = vec![1.0 / n as f64; assets.len()];
    Self::constant(assets, w)
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn rebalance_dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
    self.entries.iter().map(|(d, _)| *d)
  }

  /// Weights in effect on `date`.
  pub fn weights_at(&self, date: NaiveDate) -> Option<&[f64]> {
    let idx = self.entries.partition_point(|(d, _)| *d <= date);
    idx
      .checked_sub(1)
      .map(|i| self.entries[i].1.as_slice())
  }

  /// Per-period portfolio returns over the panel's dates.
  ///
  /// Log-return panels are aggregated in simple-return space and converted
  /// back, so the output has the panel's return kind.
  pub fn portfolio_returns(&self, panel: &AlignedPanel) -> Result<Vec<f64>> {
    let cols = self
      .assets
      .iter()
      .map(|a| {
        panel
          .index_of(a)
          .ok_or_else(|| AnalyticsError::InvalidInput(format!("panel has no column '{a}'")))
      })
      .collect::<Result<Vec<_>>>()?;

    let kind = panel.kind();
    let values = panel.values();

    panel
      .dates()
      .iter()
      .enumerate()
      .map(|(t, date)| {
        let w = self.weights_at(*date).ok_or_else(|| {
          AnalyticsError::InvalidInput(format!("no portfolio weights in effect on {date}"))
        })?;
        let simple: f64 = w
          .iter()
          .zip(cols.iter())
          .map(|(wi, &c)| wi * kind.to_simple(values[[t, c]]))
          .sum();
        Ok(kind.from_simple(simple))
      })
      .collect()
  }
}
