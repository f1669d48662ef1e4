use chrono::NaiveDate;

use super::volatility::volatility;
use super::Annualization;
use crate::data::ReturnSeries;
use crate::error::AnalyticsError;
use crate::error::Result;

/// One full window: positions `end + 1 - len ..= end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window<'a> {
  /// Index of the last observation in the window.
  pub end: usize,
  pub values: &'a [f64],
}

/// Fixed-length windows sliding by one step.
///
/// Only full windows are produced: the first one ends at position
/// `length - 1`. The iterator is finite and can be restarted.
#[derive(Debug, Clone)]
pub struct RollingWindow<'a> {
  values: &'a [f64],
  length: usize,
  next_end: usize,
}

impl<'a> RollingWindow<'a> {
  pub fn new(values: &'a [f64], length: usize) -> Result<Self> {
    if length == 0 {
      return Err(AnalyticsError::InvalidInput(
        "rolling window length must be positive".into(),
      ));
    }
    Ok(Self {
      values,
      length,
      next_end: length - 1,
    })
  }

  pub fn length(&self) -> usize {
    self.length
  }

  /// Rewind to the first full window.
  pub fn restart(&mut self) {
    self.next_end = self.length - 1;
  }

  /// Apply `metric` lazily to every window, keyed by the window's end index.
  pub fn map_metric<T, F>(self, mut metric: F) -> impl Iterator<Item = (usize, T)> + 'a
  where
    F: FnMut(&'a [f64]) -> T + 'a,
  {
    self.map(move |w| (w.end, metric(w.values)))
  }
}

impl<'a> Iterator for RollingWindow<'a> {
  type Item = Window<'a>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.next_end >= self.values.len() {
      return None;
    }
    let end = self.next_end;
    self.next_end += 1;
    Some(Window {
      end,
      values: &self.values[end + 1 - self.length..=end],
    })
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    let n = self.values.len().saturating_sub(self.next_end);
    (n, Some(n))
  }
}

impl ExactSizeIterator for RollingWindow<'_> {}

/// Windows over two equally long slices, e.g. portfolio and benchmark.
#[derive(Debug, Clone)]
pub struct PairedRollingWindow<'a> {
  x: RollingWindow<'a>,
  y: RollingWindow<'a>,
}

impl<'a> PairedRollingWindow<'a> {
  pub fn new(x: &'a [f64], y: &'a [f64], length: usize) -> Result<Self> {
    if x.len() != y.len() {
      return Err(AnalyticsError::InvalidInput(format!(
        "paired rolling window needs equal lengths, got {} and {}",
        x.len(),
        y.len()
      )));
    }
    Ok(Self {
      x: RollingWindow::new(x, length)?,
      y: RollingWindow::new(y, length)?,
    })
  }

  pub fn restart(&mut self) {
    self.x.restart();
    self.y.restart();
  }
}

impl<'a> Iterator for PairedRollingWindow<'a> {
  type Item = (usize, &'a [f64], &'a [f64]);

  fn next(&mut self) -> Option<Self::Item> {
    let a = self.x.next()?;
    let b = self.y.next()?;
    Some((a.end, a.values, b.values))
  }
}

/// Annualized volatility over each full window, dated by the window's last observation.
pub fn rolling_volatility(
  series: &ReturnSeries,
  length: usize,
  ann: Annualization,
) -> Result<Vec<(NaiveDate, f64)>> {
  let values = series.complete_values()?;
  let dates = series.dates();
  RollingWindow::new(&values, length)?
    .map(|w| Ok((dates[w.end], volatility(w.values, ann)?)))
    .collect()
}
