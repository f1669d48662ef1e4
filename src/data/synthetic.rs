use chrono::Months;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rand_distr::Distribution;
use rand_distr::Normal;

use super::Periodicity;
use super::ReturnKind;
use super::ReturnSeries;
use super::WeightSchedule;
use crate::error::AnalyticsError;
use crate::error::Result;

/// Assets, benchmark and an equal-weight schedule drawn from a one-factor model.
#[derive(Debug, Clone)]
pub struct SyntheticUniverse {
  pub assets: Vec<ReturnSeries>,
  pub benchmark: ReturnSeries,
  pub weights: WeightSchedule,
}

/// Monthly simple returns `r_i = a_i + b_i m + e_i` with `m ~ N(0.007, 0.045)`.
///
/// Deterministic for a given `seed`.
pub fn synthetic_universe(
  n_assets: usize,
  n_months: usize,
  seed: u64,
) -> Result<SyntheticUniverse> {
  if n_assets == 0 || n_months == 0 {
    return Err(AnalyticsError::InvalidInput(
      "synthetic universe needs at least one asset and one month".into(),
    ));
  }
  let normal = |mean: f64, sd: f64| {
    Normal::new(mean, sd).map_err(|e| AnalyticsError::InvalidInput(e.to_string()))
  };

  let mut rng = StdRng::seed_from_u64(seed);
  let dates = month_starts(n_months)?;
  let market = normal(0.007, 0.045)?;
  let m: Vec<f64> = (0..n_months).map(|_| market.sample(&mut rng)).collect();

  let mut assets = Vec::with_capacity(n_assets);
  for i in 0..n_assets {
    let alpha = rng.gen_range(-0.001..0.002);
    let beta = rng.gen_range(0.6..1.4);
    let noise = normal(0.0, rng.gen_range(0.015..0.05))?;
    let r = m
      .iter()
      .map(|mt| (alpha + beta * mt + noise.sample(&mut rng)).max(-0.95))
      .collect();
    assets.push(ReturnSeries::from_values(
      format!("asset_{i}"),
      Periodicity::Monthly,
      ReturnKind::Simple,
      dates.clone(),
      r,
    )?);
  }

  let benchmark =
    ReturnSeries::from_values("market", Periodicity::Monthly, ReturnKind::Simple, dates, m)?;
  let names = assets.iter().map(|s| s.name().to_string()).collect();
  let weights = WeightSchedule::equal_weight(names)?;

  Ok(SyntheticUniverse {
    assets,
    benchmark,
    weights,
  })
}

fn month_starts(n: usize) -> Result<Vec<NaiveDate>> {
  let start = NaiveDate::from_ymd_opt(2010, 1, 1)
    .ok_or_else(|| AnalyticsError::InvalidInput("bad start date".into()))?;
  (0..n)
    .map(|i| {
      start
        .checked_add_months(Months::new(i as u32))
        .ok_or_else(|| AnalyticsError::InvalidInput(format!("month {i} out of range")))
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn same_seed_same_universe() {
    let a = synthetic_universe(3, 24, 11).unwrap();
    let b = synthetic_universe(3, 24, 11).unwrap();
    assert_eq!(a.assets, b.assets);
    assert_eq!(a.benchmark.len(), 24);
    assert_eq!(a.weights.assets().len(), 3);
    assert_eq!(a.assets[2].name(), "asset_2");
  }

  #[test]
  fn empty_universe_is_rejected() {
    assert!(synthetic_universe(0, 12, 1).is_err());
  }
}
