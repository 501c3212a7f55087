//! # Local
//!
//! $$
//! \lambda_i=\left(\frac{\hat p(x_i)}{g}\right)^{-\alpha},\qquad g=\exp\Big(\frac1n\sum_{i=1}^n\ln\hat p(x_i)\Big)
//! $$
//!
use ndarray::Array1;
use tracing::debug;

use super::PilotDensity;
use crate::error::KdeError;
use crate::error::Result;

/// Turns pilot densities into per-point bandwidth factors (Abramson's rule).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalBandwidthAdapter {
  alpha: f64,
}

impl LocalBandwidthAdapter {
  /// `alpha` is the sensitivity exponent and must lie in `[0, 1]`.
  pub fn new(alpha: f64) -> Result<Self> {
    validate_alpha(alpha)?;
    Ok(Self { alpha })
  }

  pub fn alpha(&self) -> f64 {
    self.alpha
  }

  /// Local factors for every pilot point. Their geometric mean is 1.
  pub fn adapt(&self, pilot: &PilotDensity) -> Result<Array1<f64>> {
    if pilot.is_empty() {
      return Err(KdeError::degenerate("no pilot densities to adapt"));
    }
    let log_g = log_geometric_mean(pilot.log_density());
    if !log_g.is_finite() {
      return Err(KdeError::degenerate(
        "geometric mean of the pilot density is not finite",
      ));
    }

    let factors = pilot
      .log_density()
      .mapv(|lp| (-self.alpha * (lp - log_g)).exp());
    if let Some(i) = factors.iter().position(|f| !f.is_finite() || *f <= 0.0) {
      return Err(KdeError::degenerate(format!(
        "local bandwidth factor {i} is {}, pilot densities span too many orders of magnitude",
        factors[i]
      )));
    }

    debug!(
      alpha = self.alpha,
      geometric_mean = log_g.exp(),
      "derived local bandwidth factors"
    );
    Ok(factors)
  }
}

pub(crate) fn validate_alpha(alpha: f64) -> Result<()> {
  if !(0.0..=1.0).contains(&alpha) {
    return Err(KdeError::config(format!(
      "alpha must lie in [0, 1], got {alpha}"
    )));
  }
  Ok(())
}

/// `mean(ln x)`.
pub fn log_geometric_mean(log_values: &Array1<f64>) -> f64 {
  log_values.mean().unwrap_or(f64::NAN)
}
