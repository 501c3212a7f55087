//! # Mixture
//!
//! $$
//! f(q)=\sum_{i=1}^n w_i\,\mathcal N\!\left(q;\,x_i,\,s_i^2\Sigma\right),\qquad
//! \ln f(q)=\operatorname{LSE}_i\Big(\ln w_i-\tfrac{d\ln 2\pi+\ln|\Sigma|}{2}-d\ln s_i-\frac{\|L^{-1}(q-x_i)\|^2}{2s_i^2}\Big)
//! $$
//!
use ndarray::parallel::prelude::*;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::Axis;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::covariance::Covariance;
use crate::error::KdeError;
use crate::error::Result;
use crate::math::gaussian_log_norm;
use crate::math::LogSumExp;
use crate::traits::CovarianceOperator;

/// Tolerance on `Σ w_i = 1`.
const WEIGHT_SUM_TOL: f64 = 1e-9;

/// Weighted mixture of Gaussians sharing one covariance shape.
///
/// Component `i` is `N(x_i, s_i² Σ)`. The Cholesky factor of `Σ` is computed
/// once, means are whitened once, and each component keeps its log
/// normalizer, so evaluation only whitens the query.
#[derive(Debug, Clone)]
pub struct GaussianMixture {
  means: Array2<f64>,
  covariance: Covariance,
  scales: Array1<f64>,
  weights: Array1<f64>,
  whitened_means: Array2<f64>,
  log_coefficients: Array1<f64>,
  inv_scale_sq: Array1<f64>,
  cumulative_weights: Vec<f64>,
}

impl GaussianMixture {
  /// `weights` must be positive and sum to 1; `None` means uniform.
  pub fn new(
    means: Array2<f64>,
    covariance: Covariance,
    scales: Array1<f64>,
    weights: Option<Array1<f64>>,
  ) -> Result<Self> {
    let (n, d) = means.dim();
    if n == 0 {
      return Err(KdeError::degenerate("mixture needs at least one component"));
    }
    if d != covariance.dim() {
      return Err(KdeError::DimensionMismatch {
        expected: covariance.dim(),
        got: d,
      });
    }
    if scales.len() != n {
      return Err(KdeError::DimensionMismatch {
        expected: n,
        got: scales.len(),
      });
    }
    if let Some(i) = scales.iter().position(|s| !s.is_finite() || *s <= 0.0) {
      return Err(KdeError::degenerate(format!(
        "component {i} has scale {}, expected finite and > 0",
        scales[i]
      )));
    }

    let weights = match weights {
      Some(w) => {
        validate_weights(&w, n)?;
        w
      }
      None => Array1::from_elem(n, 1.0 / n as f64),
    };

    let mut whitened_means = Array2::<f64>::zeros((n, d));
    for (mut out, row) in whitened_means.rows_mut().into_iter().zip(means.rows()) {
      out.assign(&covariance.whiten(row));
    }

    let base = gaussian_log_norm(d, covariance.log_det());
    let log_coefficients = Array1::from_shape_fn(n, |i| {
      weights[i].ln() + base - d as f64 * scales[i].ln()
    });
    let inv_scale_sq = scales.mapv(|s| 1.0 / (s * s));

    let mut acc = 0.0;
    let cumulative_weights = weights
      .iter()
      .map(|w| {
        acc += w;
        acc
      })
      .collect();

    Ok(Self {
      means,
      covariance,
      scales,
      weights,
      whitened_means,
      log_coefficients,
      inv_scale_sq,
      cumulative_weights,
    })
  }

  pub fn dim(&self) -> usize {
    self.means.ncols()
  }

  pub fn n_components(&self) -> usize {
    self.means.nrows()
  }

  pub fn means(&self) -> &Array2<f64> {
    &self.means
  }

  pub fn covariance(&self) -> &Covariance {
    &self.covariance
  }

  /// Per-component standard-deviation multipliers `s_i`.
  pub fn scales(&self) -> &Array1<f64> {
    &self.scales
  }

  pub fn weights(&self) -> &Array1<f64> {
    &self.weights
  }

  /// Covariance of component `i`, `s_i² Σ`.
  pub fn component_covariance(&self, i: usize) -> Option<Array2<f64>> {
    let s = *self.scales.get(i)?;
    Some(self.covariance.to_dense() * (s * s))
  }

  /// Log density at a single point.
  pub fn log_density(&self, q: ArrayView1<f64>) -> Result<f64> {
    self.check_dim(q.len())?;
    check_finite(q.iter(), q.len())?;
    Ok(self.log_density_unchecked(q))
  }

  /// Log density at every row of `queries`, evaluated in parallel.
  pub fn log_density_batch(&self, queries: ArrayView2<f64>) -> Result<Array1<f64>> {
    self.check_dim(queries.ncols())?;
    check_finite(queries.iter(), queries.ncols())?;
    let values: Vec<f64> = queries
      .axis_iter(Axis(0))
      .into_par_iter()
      .map(|q| self.log_density_unchecked(q))
      .collect();
    Ok(Array1::from_vec(values))
  }

  fn log_density_unchecked(&self, q: ArrayView1<f64>) -> f64 {
    let wq = self.covariance.whiten(q);
    let mut lse = LogSumExp::new();
    for (i, mean) in self.whitened_means.rows().into_iter().enumerate() {
      let dist_sq: f64 = mean
        .iter()
        .zip(wq.iter())
        .map(|(m, x)| (x - m) * (x - m))
        .sum();
      lse.push(self.log_coefficients[i] - 0.5 * self.inv_scale_sq[i] * dist_sq);
    }
    lse.value()
  }

  /// Index of the component whose cumulative weight bracket contains `u ∈ [0, 1)`.
  pub fn select_component(&self, u: f64) -> usize {
    let total = self.cumulative_weights.last().copied().unwrap_or(1.0);
    let target = u * total;
    let idx = self.cumulative_weights.partition_point(|&c| c <= target);
    idx.min(self.n_components() - 1)
  }

  /// Draws `n_samples` points.
  ///
  /// Per draw the generator is consumed in a fixed order: one uniform `f64`
  /// selects the component, then `d` standard normals are drawn in feature
  /// order and mapped through `x_i + s_i L z`.
  pub fn sample<R: Rng + ?Sized>(&self, n_samples: usize, rng: &mut R) -> Array2<f64> {
    let d = self.dim();
    let mut out = Array2::<f64>::zeros((n_samples, d));
    for mut row in out.rows_mut() {
      let u: f64 = rng.gen();
      let idx = self.select_component(u);
      let z = Array1::from_shape_fn(d, |_| rng.sample::<f64, _>(StandardNormal));
      let offset = self.covariance.color(z.view());
      row.assign(&(&self.means.row(idx) + &(offset * self.scales[idx])));
    }
    out
  }

  fn check_dim(&self, got: usize) -> Result<()> {
    if got != self.dim() {
      return Err(KdeError::DimensionMismatch {
        expected: self.dim(),
        got,
      });
    }
    Ok(())
  }
}

/// Non-finite query values have no density. `values` is row-major with
/// `row_len` entries per query.
fn check_finite<'a>(values: impl Iterator<Item = &'a f64>, row_len: usize) -> Result<()> {
  for (pos, v) in values.enumerate() {
    if !v.is_finite() {
      return Err(KdeError::degenerate(format!(
        "query {} contains non-finite value {v}",
        pos / row_len.max(1)
      )));
    }
  }
  Ok(())
}

fn validate_weights(weights: &Array1<f64>, n: usize) -> Result<()> {
  if weights.len() != n {
    return Err(KdeError::DimensionMismatch {
      expected: n,
      got: weights.len(),
    });
  }
  if let Some(i) = weights.iter().position(|w| !w.is_finite() || *w <= 0.0) {
    return Err(KdeError::degenerate(format!(
      "weight {i} is {}, expected finite and > 0",
      weights[i]
    )));
  }
  let total = weights.sum();
  if (total - 1.0).abs() > WEIGHT_SUM_TOL {
    return Err(KdeError::degenerate(format!(
      "mixture weights sum to {total}, expected 1"
    )));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use ndarray::array;
  use rand::rngs::StdRng;
  use rand::SeedableRng;
  use statrs::distribution::Continuous;
  use statrs::distribution::Normal;

  use super::*;
  use crate::covariance::DiagonalCovariance;
  use crate::covariance::FullCovariance;

  fn diagonal_mixture() -> GaussianMixture {
    let cov = Covariance::Diagonal(DiagonalCovariance::new(array![1.0, 4.0]).unwrap());
    GaussianMixture::new(
      array![[0.0, 0.0], [3.0, -1.0]],
      cov,
      array![0.5, 1.5],
      Some(array![0.25, 0.75]),
    )
    .unwrap()
  }

  #[test]
  fn density_matches_product_of_normals() {
    let mix = diagonal_mixture();
    let q = array![1.0, 0.5];

    let comp = |mx: f64, my: f64, s: f64| {
      Normal::new(mx, s * 1.0).unwrap().pdf(q[0]) * Normal::new(my, s * 2.0).unwrap().pdf(q[1])
    };
    let expected = 0.25 * comp(0.0, 0.0, 0.5) + 0.75 * comp(3.0, -1.0, 1.5);

    assert_relative_eq!(
      mix.log_density(q.view()).unwrap().exp(),
      expected,
      max_relative = 1e-12
    );
  }

  #[test]
  fn full_and_diagonal_agree_for_diagonal_matrix() {
    let diag = diagonal_mixture();
    let full = GaussianMixture::new(
      diag.means().clone(),
      Covariance::Full(FullCovariance::new(array![[1.0, 0.0], [0.0, 4.0]]).unwrap()),
      diag.scales().clone(),
      Some(diag.weights().clone()),
    )
    .unwrap();

    let queries = array![[0.0, 0.0], [2.0, 1.0], [-5.0, 7.0]];
    let a = diag.log_density_batch(queries.view()).unwrap();
    let b = full.log_density_batch(queries.view()).unwrap();
    for (x, y) in a.iter().zip(b.iter()) {
      assert_relative_eq!(x, y, max_relative = 1e-12);
    }
  }

  #[test]
  fn far_queries_stay_finite_in_log_space() {
    let mix = diagonal_mixture();
    let lp = mix.log_density(array![1e4, -1e4].view()).unwrap();
    assert!(lp.is_finite());
    assert!(lp < -1e6);
  }

  #[test]
  fn nan_queries_are_rejected() {
    let mix = diagonal_mixture();
    let err = mix.log_density(array![f64::NAN, 0.0].view()).unwrap_err();
    assert!(matches!(err, KdeError::DegenerateInput(_)));

    let queries = array![[0.0, 0.0], [1.0, 1.0], [2.0, f64::NEG_INFINITY]];
    let err = mix.log_density_batch(queries.view()).unwrap_err();
    assert!(matches!(err, KdeError::DegenerateInput(ref m) if m.contains("query 2")));
  }

  #[test]
  fn wrong_dimension_is_rejected() {
    let mix = diagonal_mixture();
    let err = mix.log_density(array![1.0].view()).unwrap_err();
    assert_eq!(err, KdeError::DimensionMismatch { expected: 2, got: 1 });
  }

  #[test]
  fn selection_follows_cumulative_weights() {
    let mix = diagonal_mixture();
    assert_eq!(mix.select_component(0.0), 0);
    assert_eq!(mix.select_component(0.2499), 0);
    assert_eq!(mix.select_component(0.25), 1);
    assert_eq!(mix.select_component(0.999_999), 1);
  }

  #[test]
  fn sampling_is_reproducible_and_centered() {
    let mix = diagonal_mixture();
    let a = mix.sample(2000, &mut StdRng::seed_from_u64(11));
    let b = mix.sample(2000, &mut StdRng::seed_from_u64(11));
    assert_eq!(a, b);

    // E[x] = 0.25 * (0, 0) + 0.75 * (3, -1)
    let mean = a.mean_axis(Axis(0)).unwrap();
    assert!((mean[0] - 2.25).abs() < 0.2, "mean x = {}", mean[0]);
    assert!((mean[1] + 0.75).abs() < 0.3, "mean y = {}", mean[1]);
  }

  #[test]
  fn rejects_unnormalized_weights() {
    let cov = Covariance::Diagonal(DiagonalCovariance::new(array![1.0]).unwrap());
    let err = GaussianMixture::new(
      array![[0.0], [1.0]],
      cov,
      array![1.0, 1.0],
      Some(array![0.5, 0.6]),
    )
    .unwrap_err();
    assert!(matches!(err, KdeError::DegenerateInput(_)));
  }
}
