//! # Config
//!
//! $$
//! \theta = (\text{rule},\ \alpha\in[0,1],\ \text{diag},\ \sigma^2_{\min})
//! $$
//!
use serde::Deserialize;
use serde::Serialize;

use crate::adaptive::local::validate_alpha;
use crate::bandwidth::BandwidthRule;
use crate::covariance::CovarianceMode;
use crate::error::KdeError;
use crate::error::Result;

/// Fit configuration.
///
/// Defaults: Silverman bandwidth, `alpha = 0.5`, full covariance, no
/// variance floor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KdeConfig {
  #[serde(default)]
  pub glob_bw: BandwidthRule,
  #[serde(default = "default_alpha")]
  pub alpha: f64,
  #[serde(default)]
  pub diag_cov: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub min_variance: Option<f64>,
}

fn default_alpha() -> f64 {
  0.5
}

impl Default for KdeConfig {
  fn default() -> Self {
    Self {
      glob_bw: BandwidthRule::default(),
      alpha: default_alpha(),
      diag_cov: false,
      min_variance: None,
    }
  }
}

impl KdeConfig {
  pub fn new(glob_bw: BandwidthRule, alpha: f64, diag_cov: bool) -> Self {
    Self {
      glob_bw,
      alpha,
      diag_cov,
      min_variance: None,
    }
  }

  pub fn with_glob_bw(mut self, glob_bw: BandwidthRule) -> Self {
    self.glob_bw = glob_bw;
    self
  }

  pub fn with_alpha(mut self, alpha: f64) -> Self {
    self.alpha = alpha;
    self
  }

  pub fn with_diag_cov(mut self, diag_cov: bool) -> Self {
    self.diag_cov = diag_cov;
    self
  }

  pub fn with_min_variance(mut self, min_variance: f64) -> Self {
    self.min_variance = Some(min_variance);
    self
  }

  pub fn mode(&self) -> CovarianceMode {
    if self.diag_cov {
      CovarianceMode::Diagonal
    } else {
      CovarianceMode::Full
    }
  }

  /// Checks every field; runs before any numeric work.
  pub fn validate(&self) -> Result<()> {
    self.glob_bw.validate()?;
    validate_alpha(self.alpha)?;
    if let Some(floor) = self.min_variance {
      if !floor.is_finite() || floor <= 0.0 {
        return Err(KdeError::config(format!(
          "min_variance must be finite and > 0, got {floor}"
        )));
      }
    }
    Ok(())
  }
}
