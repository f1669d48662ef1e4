use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;

use crate::config::AnalyticsConfig;
use crate::data::AlignedPanel;
use crate::error::AnalyticsError;
use crate::error::Result;

/// Date range a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluationWindow {
  FullSample,
  /// The last `years × periods per year` observations.
  TrailingYears { years: u32 },
  TrailingPeriods { periods: usize },
  /// Observations dated within `[start, end]`.
  Range { start: NaiveDate, end: NaiveDate },
}

impl EvaluationWindow {
  pub fn label(&self) -> String {
    match self {
      Self::FullSample => "full_sample".to_string(),
      Self::TrailingYears { years } => format!("trailing_{years}y"),
      Self::TrailingPeriods { periods } => format!("trailing_{periods}p"),
      Self::Range { start, end } => format!("{start}..{end}"),
    }
  }

  /// Rows of `panel` inside the window.
  ///
  /// Trailing windows longer than the available history are rejected rather
  /// than silently shortened.
  pub fn apply(&self, panel: &AlignedPanel, cfg: &AnalyticsConfig) -> Result<AlignedPanel> {
    let sliced = match *self {
      Self::FullSample => panel.clone(),
      Self::TrailingYears { years } => {
        let per_year = cfg.periods_per_year(panel.periodicity()).round() as usize;
        self.trailing(panel, years as usize * per_year)?
      }
      Self::TrailingPeriods { periods } => self.trailing(panel, periods)?,
      Self::Range { start, end } => {
        if start > end {
          return Err(AnalyticsError::InvalidInput(format!(
            "window start {start} is after end {end}"
          )));
        }
        panel.between(start, end)
      }
    };

    if sliced.n_obs() == 0 {
      return Err(AnalyticsError::insufficient(self.label(), 1, 0));
    }
    Ok(sliced)
  }

  fn trailing(&self, panel: &AlignedPanel, periods: usize) -> Result<AlignedPanel> {
    if periods == 0 {
      return Err(AnalyticsError::InvalidInput(format!(
        "window '{}' has zero length",
        self.label()
      )));
    }
    if panel.n_obs() < periods {
      return Err(AnalyticsError::insufficient(self.label(), periods, panel.n_obs()));
    }
    Ok(panel.tail(periods))
  }
}
