use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;

use crate::data::ReturnSeries;
use crate::error::Result;

/// Largest peak-to-trough decline of the compounded value curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaxDrawdown {
  /// Decline as a fraction of the peak, in `[0, 1]`.
  pub depth: f64,
  /// Date of the peak; `None` when the peak is the starting value before the
  /// first observation.
  pub peak: Option<NaiveDate>,
  /// Date of the trough; `None` iff `depth == 0`.
  pub trough: Option<NaiveDate>,
}

/// Drawdown over positions of a return slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawdownPath {
  pub depth: f64,
  pub peak_index: Option<usize>,
  pub trough_index: Option<usize>,
}

/// `C(t) = Π (1 + r_i)` for simple returns.
pub fn cumulative_curve(simple: &[f64]) -> Vec<f64> {
  simple
    .iter()
    .scan(1.0, |c, r| {
      *c *= 1.0 + r;
      Some(*c)
    })
    .collect()
}

/// `Π (1 + r_i) - 1`.
pub fn total_return(simple: &[f64]) -> f64 {
  simple.iter().fold(1.0, |c, r| c * (1.0 + r)) - 1.0
}

/// Fractional drawdown at every observation.
pub fn drawdown_curve(simple: &[f64]) -> Vec<f64> {
  let mut peak = 1.0_f64;
  cumulative_curve(simple)
    .into_iter()
    .map(|c| {
      peak = peak.max(c);
      (peak - c) / peak
    })
    .collect()
}

/// Maximum drawdown of simple returns.
///
/// Ties on depth keep the earliest episode, hence the earliest peak.
pub fn max_drawdown_path(simple: &[f64]) -> DrawdownPath {
  let mut value = 1.0;
  let mut peak_value = 1.0;
  let mut peak_index = None;
  let mut best = DrawdownPath {
    depth: 0.0,
    peak_index: None,
    trough_index: None,
  };

  for (t, r) in simple.iter().enumerate() {
    value *= 1.0 + r;
    if value > peak_value {
      peak_value = value;
      peak_index = Some(t);
      continue;
    }
    let depth = (peak_value - value) / peak_value;
    if depth > best.depth {
      best = DrawdownPath {
        depth,
        peak_index,
        trough_index: Some(t),
      };
    }
  }

  best
}

/// Maximum drawdown of a gap-free series, compounding in simple-return space.
pub fn max_drawdown(series: &ReturnSeries) -> Result<MaxDrawdown> {
  let simple = series.simple_values()?;
  let path = max_drawdown_path(&simple);
  let dates = series.dates();

  Ok(MaxDrawdown {
    depth: path.depth,
    peak: path.peak_index.map(|i| dates[i]),
    trough: path.trough_index.map(|i| dates[i]),
  })
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use rand::rngs::StdRng;
  use rand::Rng;
  use rand::SeedableRng;

  use super::*;
  use crate::data::testing::month_starts;
  use crate::data::testing::monthly;
  use crate::data::Periodicity;
  use crate::data::ReturnKind;

  #[test]
  fn finds_peak_and_trough_dates() {
    // 1.0 -> 1.1 -> 0.99 -> 0.891 -> 1.2
    let s = monthly("x", &[0.10, -0.10, -0.10, 0.3468013468]);
    let d = month_starts(4);
    let mdd = max_drawdown(&s).unwrap();

    assert_abs_diff_eq!(mdd.depth, 1.0 - 0.891 / 1.1, epsilon = 1e-12);
    assert_eq!(mdd.peak, Some(d[0]));
    assert_eq!(mdd.trough, Some(d[2]));
  }

  #[test]
  fn drawdown_from_inception_has_no_peak_date() {
    let s = monthly("x", &[-0.2, 0.1]);
    let mdd = max_drawdown(&s).unwrap();
    assert_abs_diff_eq!(mdd.depth, 0.2, epsilon = 1e-12);
    assert_eq!(mdd.peak, None);
    assert_eq!(mdd.trough, Some(month_starts(1)[0]));
  }

  #[test]
  fn ties_resolve_to_earliest_peak() {
    // two identical 50% drawdowns from two different peaks
    let s = monthly("x", &[1.0, -0.5, 1.0, 1.0, -0.5]);
    let d = month_starts(5);
    let mdd = max_drawdown(&s).unwrap();
    assert_abs_diff_eq!(mdd.depth, 0.5, epsilon = 1e-12);
    assert_eq!(mdd.peak, Some(d[0]));
    assert_eq!(mdd.trough, Some(d[1]));
  }

  #[test]
  fn monotone_series_has_zero_drawdown() {
    let s = monthly("x", &[0.01, 0.02, 0.0, 0.03]);
    let mdd = max_drawdown(&s).unwrap();
    assert_eq!(mdd.depth, 0.0);
    assert_eq!(mdd.trough, None);
  }

  #[test]
  fn depth_is_bounded_for_returns_above_minus_one() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
      let r: Vec<f64> = (0..60).map(|_| rng.gen_range(-1.0..1.5)).collect();
      let path = max_drawdown_path(&r);
      assert!((0.0..=1.0).contains(&path.depth), "depth {}", path.depth);
    }
    assert_eq!(max_drawdown_path(&[0.1, -1.0, 0.5]).depth, 1.0);
  }

  #[test]
  fn log_returns_are_compounded_as_simple() {
    let d = month_starts(2);
    let s = ReturnSeries::from_values(
      "log",
      Periodicity::Monthly,
      ReturnKind::Log,
      d,
      vec![0.5_f64.ln(), 0.0],
    )
    .unwrap();
    assert_abs_diff_eq!(max_drawdown(&s).unwrap().depth, 0.5, epsilon = 1e-12);
  }

  #[test]
  fn curves_agree_with_total_return() {
    let r = [0.1, -0.05, 0.02];
    let c = cumulative_curve(&r);
    assert_abs_diff_eq!(c[2] - 1.0, total_return(&r), epsilon = 1e-15);
    let dd = drawdown_curve(&r);
    assert_eq!(dd[0], 0.0);
    assert_abs_diff_eq!(dd[1], 0.05, epsilon = 1e-12);
  }
}
