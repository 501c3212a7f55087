//! # Diagonal
//!
//! $$
//! \Sigma=\operatorname{diag}(\sigma_1^2,\dots,\sigma_d^2),\qquad L^{-1}x=(x_k/\sigma_k)_k
//! $$
//!
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;

use crate::error::KdeError;
use crate::error::Result;
use crate::traits::CovarianceOperator;

/// Covariance with independent features.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagonalCovariance {
  variances: Array1<f64>,
  std_devs: Array1<f64>,
  log_det: f64,
}

impl DiagonalCovariance {
  /// Builds the operator from per-feature variances, all finite and > 0.
  pub fn new(variances: Array1<f64>) -> Result<Self> {
    if variances.is_empty() {
      return Err(KdeError::degenerate("covariance has no features"));
    }
    for (k, &v) in variances.iter().enumerate() {
      if !v.is_finite() || v <= 0.0 {
        return Err(KdeError::degenerate(format!(
          "variance of feature {k} must be finite and > 0, got {v}"
        )));
      }
    }

    let std_devs = variances.mapv(f64::sqrt);
    let log_det = variances.iter().map(|v| v.ln()).sum();

    Ok(Self {
      variances,
      std_devs,
      log_det,
    })
  }

  pub fn variances(&self) -> &Array1<f64> {
    &self.variances
  }
}

impl CovarianceOperator for DiagonalCovariance {
  fn dim(&self) -> usize {
    self.variances.len()
  }

  fn whiten(&self, x: ArrayView1<f64>) -> Array1<f64> {
    &x / &self.std_devs
  }

  fn color(&self, z: ArrayView1<f64>) -> Array1<f64> {
    &z * &self.std_devs
  }

  fn log_det(&self) -> f64 {
    self.log_det
  }

  fn cholesky_factor(&self) -> Array2<f64> {
    Array2::from_diag(&self.std_devs)
  }

  fn to_dense(&self) -> Array2<f64> {
    Array2::from_diag(&self.variances)
  }
}
