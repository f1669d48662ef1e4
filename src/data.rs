//! # Data
//!
//! $$
//! \mathcal P=\{(t,\mathbf r_t):t\in\bigcap_i\operatorname{dom}(r_i)\}
//! $$
//!
//! Canonical containers handed to the engine by data-loading and
//! portfolio-construction collaborators.

pub mod panel;
pub mod series;
pub mod synthetic;
pub mod weights;

pub use panel::AlignedPanel;
pub use panel::AlignmentPolicy;
pub use series::Periodicity;
pub use series::ReturnKind;
pub use series::ReturnSeries;
pub use synthetic::synthetic_universe;
pub use synthetic::SyntheticUniverse;
pub use weights::WeightSchedule;

#[cfg(test)]
pub(crate) mod testing {
  use chrono::Months;
  use chrono::NaiveDate;

  use super::Periodicity;
  use super::ReturnKind;
  use super::ReturnSeries;

  /// First-of-month dates starting January 2020.
  pub fn month_starts(n: usize) -> Vec<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    (0..n)
      .map(|i| start.checked_add_months(Months::new(i as u32)).unwrap())
      .collect()
  }

  /// Consecutive calendar days starting 2 January 2020.
  pub fn days(n: usize) -> Vec<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
    (0..n)
      .map(|i| start + chrono::Duration::days(i as i64))
      .collect()
  }

  pub fn monthly(name: &str, values: &[f64]) -> ReturnSeries {
    ReturnSeries::from_values(
      name,
      Periodicity::Monthly,
      ReturnKind::Simple,
      month_starts(values.len()),
      values.to_vec(),
    )
    .unwrap()
  }

  pub fn daily(name: &str, values: &[f64]) -> ReturnSeries {
    ReturnSeries::from_values(
      name,
      Periodicity::Daily,
      ReturnKind::Simple,
      days(values.len()),
      values.to_vec(),
    )
    .unwrap()
  }
}
