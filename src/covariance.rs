//! # Covariance
//!
//! $$
//! \hat\Sigma=\frac{1}{n-1}\sum_{i=1}^n (x_i-\bar x)(x_i-\bar x)^\top
//! $$
//!
//! Global covariance of the sample and the operators the mixture evaluates
//! through.
//!
pub mod diagonal;
pub mod estimator;
pub mod full;

use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use serde::Deserialize;
use serde::Serialize;

pub use self::diagonal::DiagonalCovariance;
pub use self::estimator::CovarianceEstimator;
pub use self::full::FullCovariance;
use crate::traits::CovarianceOperator;

/// Which covariance structure the estimator produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CovarianceMode {
  Full,
  Diagonal,
}

/// Global covariance in either mode.
#[derive(Debug, Clone, PartialEq)]
pub enum Covariance {
  Full(FullCovariance),
  Diagonal(DiagonalCovariance),
}

impl Covariance {
  pub fn mode(&self) -> CovarianceMode {
    match self {
      Covariance::Full(_) => CovarianceMode::Full,
      Covariance::Diagonal(_) => CovarianceMode::Diagonal,
    }
  }

  fn operator(&self) -> &dyn CovarianceOperator {
    match self {
      Covariance::Full(c) => c,
      Covariance::Diagonal(c) => c,
    }
  }
}

impl CovarianceOperator for Covariance {
  fn dim(&self) -> usize {
    self.operator().dim()
  }

  fn whiten(&self, x: ArrayView1<f64>) -> Array1<f64> {
    self.operator().whiten(x)
  }

  fn color(&self, z: ArrayView1<f64>) -> Array1<f64> {
    self.operator().color(z)
  }

  fn log_det(&self) -> f64 {
    self.operator().log_det()
  }

  fn cholesky_factor(&self) -> Array2<f64> {
    self.operator().cholesky_factor()
  }

  fn to_dense(&self) -> Array2<f64> {
    self.operator().to_dense()
  }
}
