//! # Estimator
//!
//! $$
//! \hat\Sigma_w=\frac{\sum_i w_i (x_i-\bar x_w)(x_i-\bar x_w)^\top}{1-\sum_i w_i^2},\qquad \sum_i w_i = 1
//! $$
//!
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::Axis;
use ndarray_stats::CorrelationExt;
use tracing::debug;

use super::Covariance;
use super::CovarianceMode;
use super::DiagonalCovariance;
use super::FullCovariance;
use crate::error::KdeError;
use crate::error::Result;

/// Estimates the global covariance of a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CovarianceEstimator {
  pub mode: CovarianceMode,
  /// Variances below this value are raised to it instead of rejected.
  pub min_variance: Option<f64>,
}

impl CovarianceEstimator {
  pub fn new(mode: CovarianceMode, min_variance: Option<f64>) -> Self {
    Self { mode, min_variance }
  }

  /// Unbiased covariance of `sample` (`n × d`).
  ///
  /// `weights`, when given, must be normalized to sum 1; the reliability
  /// weighted estimator is used and reduces to the `n - 1` form for uniform
  /// weights.
  pub fn estimate(
    &self,
    sample: ArrayView2<f64>,
    weights: Option<ArrayView1<f64>>,
  ) -> Result<Covariance> {
    let (n, d) = sample.dim();
    if n < 2 {
      return Err(KdeError::degenerate(format!(
        "covariance needs at least 2 points, got {n}"
      )));
    }
    if d == 0 {
      return Err(KdeError::degenerate("sample has no features"));
    }

    let covariance = match self.mode {
      CovarianceMode::Diagonal => {
        let mut variances = match weights {
          Some(w) => weighted_covariance(sample, w, true)?.diag().to_owned(),
          None => sample.var_axis(Axis(0), 1.0),
        };
        self.apply_floor(variances.iter_mut())?;
        Covariance::Diagonal(DiagonalCovariance::new(variances)?)
      }
      CovarianceMode::Full => {
        let mut matrix = match weights {
          Some(w) => weighted_covariance(sample, w, false)?,
          None => sample
            .t()
            .cov(1.0)
            .map_err(|_| KdeError::degenerate("sample is empty"))?,
        };
        symmetrize(&mut matrix);
        self.apply_floor(matrix.diag_mut().iter_mut())?;
        Covariance::Full(FullCovariance::new(matrix)?)
      }
    };

    debug!(mode = ?self.mode, n, d, "estimated global covariance");
    Ok(covariance)
  }

  fn apply_floor<'a>(&self, variances: impl Iterator<Item = &'a mut f64>) -> Result<()> {
    for (k, v) in variances.enumerate() {
      if !v.is_finite() {
        return Err(KdeError::degenerate(format!(
          "variance of feature {k} is not finite"
        )));
      }
      match self.min_variance {
        Some(floor) if *v < floor => {
          debug!(feature = k, variance = *v, floor, "raising variance to floor");
          *v = floor;
        }
        Some(_) => {}
        None if *v <= 0.0 => {
          return Err(KdeError::degenerate(format!(
            "feature {k} has zero variance; drop it or set a minimum variance"
          )));
        }
        None => {}
      }
    }
    Ok(())
  }
}

fn weighted_covariance(
  sample: ArrayView2<f64>,
  weights: ArrayView1<f64>,
  diagonal_only: bool,
) -> Result<Array2<f64>> {
  let n = sample.nrows();
  if weights.len() != n {
    return Err(KdeError::DimensionMismatch {
      expected: n,
      got: weights.len(),
    });
  }

  let v2: f64 = weights.iter().map(|w| w * w).sum();
  let denom = 1.0 - v2;
  if denom <= 0.0 {
    return Err(KdeError::degenerate(
      "weights concentrate on a single point",
    ));
  }

  let mean: Array1<f64> = weights.dot(&sample);
  let centered = &sample - &mean;

  let weighted = &centered * &weights.insert_axis(Axis(1));
  let scatter = if diagonal_only {
    Array2::from_diag(&(&weighted * &centered).sum_axis(Axis(0)))
  } else {
    centered.t().dot(&weighted)
  };
  Ok(scatter / denom)
}

fn symmetrize(matrix: &mut Array2<f64>) {
  let d = matrix.nrows();
  for i in 0..d {
    for j in 0..i {
      let avg = 0.5 * (matrix[[i, j]] + matrix[[j, i]]);
      matrix[[i, j]] = avg;
      matrix[[j, i]] = avg;
    }
  }
}
