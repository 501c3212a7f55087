//! # Traits
//!
//! $$
//! \Sigma = LL^\top,\qquad \|x\|_\Sigma^2 = \|L^{-1}x\|_2^2,\qquad \ln|\Sigma| = 2\sum_i \ln L_{ii}
//! $$
//!
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;

/// Operator view of a positive-definite covariance matrix `Σ = L Lᵀ`.
///
/// The mixture model evaluates and samples every component through this
/// interface, so full and diagonal covariances share one code path.
pub trait CovarianceOperator: Send + Sync {
  /// Number of features.
  fn dim(&self) -> usize;

  /// Applies `L⁻¹` to `x`.
  fn whiten(&self, x: ArrayView1<f64>) -> Array1<f64>;

  /// Applies `L` to `z`. Maps standard normal draws onto `N(0, Σ)`.
  fn color(&self, z: ArrayView1<f64>) -> Array1<f64>;

  /// `ln |Σ|`.
  fn log_det(&self) -> f64;

  /// Dense lower-triangular Cholesky factor `L`.
  fn cholesky_factor(&self) -> Array2<f64>;

  /// Dense `Σ`.
  fn to_dense(&self) -> Array2<f64>;

  /// Squared Mahalanobis norm `xᵀ Σ⁻¹ x`.
  fn mahalanobis_sq(&self, x: ArrayView1<f64>) -> f64 {
    let w = self.whiten(x);
    w.dot(&w)
  }
}
