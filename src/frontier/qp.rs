//! Box-constrained quadratic programs with linear equality constraints.
//!
//! $$
//! \min_w\ \tfrac12 w^\top\Sigma w + c^\top w\quad\text{s.t.}\quad A^\top w=b,\ \ l\le w\le u
//! $$
//!
//! Primal active-set method. Each iteration solves the equality-constrained
//! subproblem on the free variables through its KKT system, takes the longest
//! feasible step toward that solution and adds the blocking bound to the
//! working set. At a stationary point, bounds whose multiplier has the wrong
//! sign are released.

use nalgebra::DMatrix;
use nalgebra::DVector;

use crate::error::AnalyticsError;
use crate::error::Result;

const STEP_TOLERANCE: f64 = 1e-12;
const MULTIPLIER_TOLERANCE: f64 = 1e-11;
const BOUND_TOLERANCE: f64 = 1e-10;
const SVD_EPSILON: f64 = 1e-14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
  Lower,
  Upper,
}

#[derive(Debug, Clone)]
pub struct QpSolution {
  pub weights: DVector<f64>,
  pub iterations: usize,
  /// Solved by the unconstrained two-fund formula without any bound active.
  pub closed_form: bool,
}

#[derive(Debug, Clone)]
pub struct QuadraticProgram<'a> {
  sigma: &'a DMatrix<f64>,
  linear: Option<DVector<f64>>,
  eq: DMatrix<f64>,
  rhs: DVector<f64>,
  lower: &'a [f64],
  upper: &'a [f64],
  max_iterations: usize,
}

impl<'a> QuadraticProgram<'a> {
  /// `eq` holds one equality constraint per column.
  pub fn new(
    sigma: &'a DMatrix<f64>,
    eq: DMatrix<f64>,
    rhs: DVector<f64>,
    lower: &'a [f64],
    upper: &'a [f64],
  ) -> Self {
    Self {
      sigma,
      linear: None,
      eq,
      rhs,
      lower,
      upper,
      max_iterations: 500,
    }
  }

  pub fn with_linear(mut self, c: DVector<f64>) -> Self {
    self.linear = Some(c);
    self
  }

  pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
    self.max_iterations = max_iterations;
    self
  }

  fn dim(&self) -> usize {
    self.sigma.nrows()
  }

  fn within_bounds(&self, w: &DVector<f64>) -> bool {
    w.iter()
      .enumerate()
      .all(|(i, x)| {
        *x >= self.lower[i] - BOUND_TOLERANCE && *x <= self.upper[i] + BOUND_TOLERANCE
      })
  }

  /// `Σ⁻¹A (AᵀΣ⁻¹A)⁻¹ b`, the solution when no bound binds.
  pub fn closed_form(&self) -> Option<DVector<f64>> {
    if self.linear.is_some() {
      return None;
    }
    let chol = self.sigma.clone().cholesky()?;
    let sigma_inv_a = chol.solve(&self.eq);
    let m = self.eq.transpose() * &sigma_inv_a;
    let y = m.lu().solve(&self.rhs)?;
    let w = sigma_inv_a * y;
    w.iter().all(|x| x.is_finite()).then_some(w)
  }

  /// Closed form when it respects every bound, otherwise the active-set
  /// iteration from the feasible point `start`.
  pub fn solve(&self, start: DVector<f64>) -> Result<QpSolution> {
    if let Some(w) = self.closed_form() {
      if self.within_bounds(&w) {
        return Ok(QpSolution {
          weights: self.clamp(w),
          iterations: 0,
          closed_form: true,
        });
      }
    }
    self.active_set(start)
  }

  fn clamp(&self, mut w: DVector<f64>) -> DVector<f64> {
    for (i, x) in w.iter_mut().enumerate() {
      *x = x.clamp(self.lower[i], self.upper[i]);
    }
    w
  }

  fn active_set(&self, start: DVector<f64>) -> Result<QpSolution> {
    let n = self.dim();
    let scale = self.sigma.amax().max(f64::MIN_POSITIVE);
    let mut w = start;
    let mut working: Vec<Option<Bound>> = vec![None; n];

    for iteration in 0..self.max_iterations {
      let free: Vec<usize> = (0..n).filter(|&i| working[i].is_none()).collect();
      let (target, nu) = self.equality_step(&w, &free)?;
      let p = &target - &w;

      if p.amax() <= STEP_TOLERANCE {
        let mut grad = self.sigma * &target;
        if let Some(c) = &self.linear {
          grad += c;
        }
        let reduced = &grad + &self.eq * &nu;

        // lowest index first among violated bounds
        let release = (0..n).find(|&i| match working[i] {
          Some(Bound::Lower) => reduced[i] < -MULTIPLIER_TOLERANCE * scale,
          Some(Bound::Upper) => reduced[i] > MULTIPLIER_TOLERANCE * scale,
          None => false,
        });
        match release {
          Some(i) => working[i] = None,
          None => {
            return Ok(QpSolution {
              weights: self.clamp(target),
              iterations: iteration + 1,
              closed_form: false,
            })
          }
        }
        continue;
      }

      let mut alpha = 1.0;
      let mut blocking = None;
      for &i in &free {
        let (limit, bound) = if p[i] < -STEP_TOLERANCE {
          (self.lower[i], Bound::Lower)
        } else if p[i] > STEP_TOLERANCE {
          (self.upper[i], Bound::Upper)
        } else {
          continue;
        };
        if !limit.is_finite() {
          continue;
        }
        let step = ((limit - w[i]) / p[i]).max(0.0);
        if step < alpha {
          alpha = step;
          blocking = Some((i, bound, limit));
        }
      }

      w += &p * alpha;
      if let Some((i, bound, limit)) = blocking {
        w[i] = limit;
        working[i] = Some(bound);
      }
    }

    Err(AnalyticsError::NonConvergence {
      iterations: self.max_iterations,
    })
  }

  /// Solve the subproblem with working-set variables held at their current
  /// values. Returns the full weight vector and the equality multipliers.
  fn equality_step(
    &self,
    w: &DVector<f64>,
    free: &[usize],
  ) -> Result<(DVector<f64>, DVector<f64>)> {
    let n = self.dim();
    let m = self.eq.ncols();
    let nf = free.len();
    let mut is_free = vec![false; n];
    for &i in free {
      is_free[i] = true;
    }

    let mut kkt = DMatrix::<f64>::zeros(nf + m, nf + m);
    let mut rhs = DVector::<f64>::zeros(nf + m);

    for (a, &i) in free.iter().enumerate() {
      for (b, &j) in free.iter().enumerate() {
        kkt[(a, b)] = self.sigma[(i, j)];
      }
      for c in 0..m {
        kkt[(a, nf + c)] = self.eq[(i, c)];
        kkt[(nf + c, a)] = self.eq[(i, c)];
      }
      let fixed_term: f64 = (0..n)
        .filter(|&j| !is_free[j])
        .map(|j| self.sigma[(i, j)] * w[j])
        .sum();
      let linear = self.linear.as_ref().map_or(0.0, |c| c[i]);
      rhs[a] = -fixed_term - linear;
    }
    for c in 0..m {
      let fixed: f64 = (0..n)
        .filter(|&j| !is_free[j])
        .map(|j| self.eq[(j, c)] * w[j])
        .sum();
      rhs[nf + c] = self.rhs[c] - fixed;
    }

    let solution = match kkt.clone().lu().solve(&rhs) {
      Some(x) if x.iter().all(|v| v.is_finite()) => x,
      // dependent equality rows on the free set, e.g. equal expected returns
      _ => kkt
        .svd(true, true)
        .solve(&rhs, SVD_EPSILON)
        .map_err(|e| AnalyticsError::InvalidInput(format!("KKT system: {e}")))?,
    };

    let mut target = w.clone();
    for (a, &i) in free.iter().enumerate() {
      target[i] = solution[a];
    }
    let nu = solution.rows(nf, m).into_owned();
    Ok((target, nu))
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  fn budget(n: usize) -> (DMatrix<f64>, DVector<f64>) {
    (DMatrix::from_element(n, 1, 1.0), DVector::from_element(1, 1.0))
  }

  #[test]
  fn closed_form_minimum_variance_of_diagonal() {
    let sigma = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 4.0]));
    let (a, b) = budget(2);
    let lower = [f64::NEG_INFINITY; 2];
    let upper = [f64::INFINITY; 2];
    let sol = QuadraticProgram::new(&sigma, a, b, &lower, &upper)
      .solve(DVector::from_vec(vec![0.5, 0.5]))
      .unwrap();
    // inverse-variance weights 0.8 / 0.2
    assert!(sol.closed_form);
    assert_abs_diff_eq!(sol.weights[0], 0.8, epsilon = 1e-12);
    assert_abs_diff_eq!(sol.weights[1], 0.2, epsilon = 1e-12);
  }

  #[test]
  fn active_set_clamps_negative_weight_to_zero() {
    // strong positive correlation pushes the unconstrained solution short asset 1
    let sigma = DMatrix::from_row_slice(2, 2, &[0.04, 0.05, 0.05, 0.09]);
    let (a, b) = budget(2);
    let lower = [0.0; 2];
    let upper = [1.0; 2];
    let qp = QuadraticProgram::new(&sigma, a, b, &lower, &upper);
    let unconstrained = qp.closed_form().unwrap();
    assert!(unconstrained[1] < 0.0);

    let sol = qp.solve(DVector::from_vec(vec![0.0, 1.0])).unwrap();
    assert!(!sol.closed_form);
    assert_abs_diff_eq!(sol.weights[0], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(sol.weights[1], 0.0, epsilon = 1e-12);
  }

  #[test]
  fn target_return_constraint_is_met() {
    let sigma = DMatrix::from_row_slice(
      3,
      3,
      &[0.04, 0.006, 0.002, 0.006, 0.09, 0.01, 0.002, 0.01, 0.16],
    );
    let mu = [0.05, 0.08, 0.12];
    let mut a = DMatrix::from_element(3, 2, 1.0);
    for i in 0..3 {
      a[(i, 1)] = mu[i];
    }
    let b = DVector::from_vec(vec![1.0, 0.11]);
    let lower = [0.0; 3];
    let upper = [1.0; 3];
    // feasible start: 25% asset 2, 75% asset 3
    let start = DVector::from_vec(vec![0.0, 0.25, 0.75]);
    let sol = QuadraticProgram::new(&sigma, a, b, &lower, &upper)
      .solve(start)
      .unwrap();
    let w = &sol.weights;
    assert_abs_diff_eq!(w.sum(), 1.0, epsilon = 1e-10);
    assert_abs_diff_eq!(w[0] * mu[0] + w[1] * mu[1] + w[2] * mu[2], 0.11, epsilon = 1e-10);
    assert!(w.iter().all(|x| *x >= -1e-12));
  }

  #[test]
  fn iteration_cap_is_reported() {
    let sigma = DMatrix::from_row_slice(2, 2, &[0.04, 0.05, 0.05, 0.09]);
    let (a, b) = budget(2);
    let lower = [0.0; 2];
    let upper = [1.0; 2];
    let err = QuadraticProgram::new(&sigma, a, b, &lower, &upper)
      .with_max_iterations(0)
      .solve(DVector::from_vec(vec![0.0, 1.0]))
      .unwrap_err();
    assert!(matches!(err, AnalyticsError::NonConvergence { iterations: 0 }));
  }
}
