//! # Pilot
//!
//! $$
//! \hat p(x_i)=\sum_{j=1}^n w_j\,\mathcal N\!\left(x_i;\,x_j,\,h^2\Sigma\right)
//! $$
//!
//! The sum includes `j = i`.
//!
use ndarray::Array1;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use tracing::debug;
use tracing::warn;

use crate::covariance::Covariance;
use crate::error::KdeError;
use crate::error::Result;
use crate::math::ln_min_density;
use crate::math::MIN_DENSITY;
use crate::mixture::GaussianMixture;

/// Fixed-bandwidth self-density of every sample point, in log space.
#[derive(Debug, Clone, PartialEq)]
pub struct PilotDensity {
  log_density: Array1<f64>,
  floored: usize,
}

impl PilotDensity {
  /// Builds a pilot from raw log densities, clamping at `ln(MIN_DENSITY)`.
  pub fn from_log_density(mut log_density: Array1<f64>) -> Result<Self> {
    let floor = ln_min_density();
    let mut floored = 0;
    for (i, lp) in log_density.iter_mut().enumerate() {
      if lp.is_nan() {
        return Err(KdeError::degenerate(format!(
          "pilot density at point {i} is undefined"
        )));
      }
      if *lp < floor {
        *lp = floor;
        floored += 1;
      }
    }
    Ok(Self {
      log_density,
      floored,
    })
  }

  pub fn log_density(&self) -> &Array1<f64> {
    &self.log_density
  }

  /// Densities, each at least `MIN_DENSITY`.
  pub fn density(&self) -> Array1<f64> {
    let floor = ln_min_density();
    self.log_density.mapv(|lp| {
      if lp <= floor {
        MIN_DENSITY
      } else {
        lp.exp().max(MIN_DENSITY)
      }
    })
  }

  /// Number of points whose density underflowed and was raised to the floor.
  pub fn floored(&self) -> usize {
    self.floored
  }

  pub fn len(&self) -> usize {
    self.log_density.len()
  }

  pub fn is_empty(&self) -> bool {
    self.log_density.is_empty()
  }
}

/// Evaluates the fixed-bandwidth KDE of the sample at the sample itself.
#[derive(Debug, Clone, Copy)]
pub struct PilotDensityEstimator<'a> {
  covariance: &'a Covariance,
  bandwidth: f64,
}

impl<'a> PilotDensityEstimator<'a> {
  pub fn new(covariance: &'a Covariance, bandwidth: f64) -> Self {
    Self {
      covariance,
      bandwidth,
    }
  }

  /// `weights` are normalized mixture weights; `None` means uniform.
  pub fn estimate(
    &self,
    sample: ArrayView2<f64>,
    weights: Option<ArrayView1<f64>>,
  ) -> Result<PilotDensity> {
    let n = sample.nrows();
    let pilot = GaussianMixture::new(
      sample.to_owned(),
      self.covariance.clone(),
      Array1::from_elem(n, self.bandwidth),
      weights.map(|w| w.to_owned()),
    )?;

    let density = PilotDensity::from_log_density(pilot.log_density_batch(sample)?)?;
    if density.floored() > 0 {
      warn!(
        floored = density.floored(),
        n, "pilot density underflowed, clamped to the minimum positive density"
      );
    }
    debug!(n, bandwidth = self.bandwidth, "evaluated pilot density");
    Ok(density)
  }
}
