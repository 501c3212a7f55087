//! # Full
//!
//! $$
//! \Sigma = LL^\top,\qquad y=L^{-1}x:\ y_i=\Big(x_i-\sum_{j<i}L_{ij}y_j\Big)/L_{ii}
//! $$
//!
use nalgebra::DMatrix;
use nalgebra::DVector;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;

use crate::error::KdeError;
use crate::error::Result;
use crate::traits::CovarianceOperator;

/// Relative tolerance for accepting a matrix as symmetric.
const SYMMETRY_TOL: f64 = 1e-10;

/// Dense covariance backed by its Cholesky factor.
#[derive(Debug, Clone, PartialEq)]
pub struct FullCovariance {
  matrix: Array2<f64>,
  chol_lower: DMatrix<f64>,
  log_det: f64,
}

impl FullCovariance {
  /// Factors a symmetric positive-definite matrix.
  pub fn new(matrix: Array2<f64>) -> Result<Self> {
    let dim = matrix.nrows();
    if dim == 0 || dim != matrix.ncols() {
      return Err(KdeError::degenerate(format!(
        "covariance must be a non-empty square matrix, got {}x{}",
        matrix.nrows(),
        matrix.ncols()
      )));
    }
    if matrix.iter().any(|v| !v.is_finite()) {
      return Err(KdeError::degenerate("covariance has non-finite entries"));
    }
    for k in 0..dim {
      let v = matrix[[k, k]];
      if v <= 0.0 {
        return Err(KdeError::degenerate(format!(
          "variance of feature {k} must be > 0, got {v}"
        )));
      }
    }
    for i in 0..dim {
      for j in 0..i {
        let (a, b) = (matrix[[i, j]], matrix[[j, i]]);
        let scale = (matrix[[i, i]] * matrix[[j, j]]).sqrt();
        if (a - b).abs() > SYMMETRY_TOL * scale {
          return Err(KdeError::degenerate(format!(
            "covariance is not symmetric at ({i}, {j})"
          )));
        }
      }
    }

    let chol = DMatrix::from_fn(dim, dim, |i, j| matrix[[i, j]])
      .cholesky()
      .ok_or_else(|| KdeError::degenerate("covariance is not positive definite"))?;
    let chol_lower = chol.unpack();
    let log_det = 2.0 * chol_lower.diagonal().iter().map(|v| v.ln()).sum::<f64>();

    Ok(Self {
      matrix,
      chol_lower,
      log_det,
    })
  }

  pub fn matrix(&self) -> &Array2<f64> {
    &self.matrix
  }
}

impl CovarianceOperator for FullCovariance {
  fn dim(&self) -> usize {
    self.matrix.nrows()
  }

  fn whiten(&self, x: ArrayView1<f64>) -> Array1<f64> {
    let mut y = DVector::from_iterator(x.len(), x.iter().copied());
    // L has a strictly positive diagonal, so the solve always succeeds.
    let solved = self.chol_lower.solve_lower_triangular_mut(&mut y);
    debug_assert!(solved);
    Array1::from_iter(y.iter().copied())
  }

  fn color(&self, z: ArrayView1<f64>) -> Array1<f64> {
    let z = DVector::from_iterator(z.len(), z.iter().copied());
    Array1::from_iter((&self.chol_lower * z).iter().copied())
  }

  fn log_det(&self) -> f64 {
    self.log_det
  }

  fn cholesky_factor(&self) -> Array2<f64> {
    let l = &self.chol_lower;
    Array2::from_shape_fn((l.nrows(), l.ncols()), |(i, j)| l[(i, j)])
  }

  fn to_dense(&self) -> Array2<f64> {
    self.matrix.clone()
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use approx::assert_relative_eq;
  use ndarray::array;

  use super::*;

  #[test]
  fn factor_reproduces_matrix() {
    let m = array![[4.0, 1.2, 0.0], [1.2, 2.0, -0.3], [0.0, -0.3, 1.0]];
    let cov = FullCovariance::new(m.clone()).unwrap();
    let l = cov.cholesky_factor();

    let rebuilt = l.dot(&l.t());
    for (a, b) in rebuilt.iter().zip(m.iter()) {
      assert_abs_diff_eq!(a, b, epsilon = 1e-12);
    }
    assert_eq!(l[[0, 1]], 0.0);
  }

  #[test]
  fn whiten_inverts_color() {
    let cov = FullCovariance::new(array![[2.0, 0.9], [0.9, 1.0]]).unwrap();
    let z = array![0.7, -1.3];

    let back = cov.whiten(cov.color(z.view()).view());
    assert_abs_diff_eq!(back[0], z[0], epsilon = 1e-12);
    assert_abs_diff_eq!(back[1], z[1], epsilon = 1e-12);
  }

  #[test]
  fn whiten_solves_against_the_factor() {
    let m = array![[4.0, 1.2, 0.0], [1.2, 2.0, -0.3], [0.0, -0.3, 1.0]];
    let cov = FullCovariance::new(m.clone()).unwrap();
    let x = array![1.0, -2.0, 0.5];

    let y = cov.whiten(x.view());
    let back = cov.cholesky_factor().dot(&y);
    for (a, b) in back.iter().zip(x.iter()) {
      assert_abs_diff_eq!(a, b, epsilon = 1e-12);
    }
    // First row of L is (2, 0, 0).
    assert_abs_diff_eq!(y[0], 0.5, epsilon = 1e-15);
  }

  #[test]
  fn log_det_matches_determinant() {
    let cov = FullCovariance::new(array![[2.0, 0.9], [0.9, 1.0]]).unwrap();
    assert_relative_eq!(cov.log_det(), (2.0f64 - 0.81).ln(), epsilon = 1e-12);
  }

  #[test]
  fn rejects_singular_and_asymmetric() {
    let singular = FullCovariance::new(array![[1.0, 1.0], [1.0, 1.0]]).unwrap_err();
    assert!(matches!(singular, KdeError::DegenerateInput(_)));

    let asym = FullCovariance::new(array![[1.0, 0.5], [0.1, 1.0]]).unwrap_err();
    assert!(matches!(asym, KdeError::DegenerateInput(ref m) if m.contains("symmetric")));
  }
}
