//! # Bandwidth
//!
//! $$
//! h_{\text{scott}} = n^{-1/(d+4)},\qquad h_{\text{silverman}} = \left(\frac{4}{d+2}\right)^{1/(d+4)} n^{-1/(d+4)}
//! $$
//!
//! Both rules act on data already scaled by the global covariance, so the
//! bandwidth is a dimensionless factor.
//!
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::error::KdeError;
use crate::error::Result;

/// Rule for the global bandwidth factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BandwidthRepr", into = "BandwidthRepr")]
pub enum BandwidthRule {
  Silverman,
  Scott,
  /// Caller-supplied factor.
  Fixed(f64),
}

impl Default for BandwidthRule {
  fn default() -> Self {
    BandwidthRule::Silverman
  }
}

impl BandwidthRule {
  /// Name used in persisted models.
  pub fn name(&self) -> &'static str {
    match self {
      BandwidthRule::Silverman => "silverman",
      BandwidthRule::Scott => "scott",
      BandwidthRule::Fixed(_) => "fixed",
    }
  }

  pub fn validate(&self) -> Result<()> {
    match *self {
      BandwidthRule::Fixed(h) if !h.is_finite() || h <= 0.0 => Err(KdeError::config(format!(
        "fixed bandwidth must be finite and > 0, got {h}"
      ))),
      _ => Ok(()),
    }
  }

  /// Global bandwidth for an (effective) sample size `n` in `d` dimensions.
  pub fn select(&self, n: f64, d: usize) -> Result<f64> {
    self.validate()?;
    if d == 0 || !(n > 0.0) {
      return Err(KdeError::degenerate(format!(
        "bandwidth needs a non-empty sample, got n = {n}, d = {d}"
      )));
    }

    let d = d as f64;
    let exponent = -1.0 / (d + 4.0);
    let h = match *self {
      BandwidthRule::Scott => n.powf(exponent),
      BandwidthRule::Silverman => (4.0 / (d + 2.0)).powf(1.0 / (d + 4.0)) * n.powf(exponent),
      BandwidthRule::Fixed(h) => h,
    };

    if !h.is_finite() || h <= 0.0 {
      return Err(KdeError::config(format!(
        "{} rule produced a non-positive bandwidth {h}",
        self.name()
      )));
    }
    Ok(h)
  }
}

impl fmt::Display for BandwidthRule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BandwidthRule::Fixed(h) => write!(f, "fixed={h}"),
      other => f.write_str(other.name()),
    }
  }
}

impl FromStr for BandwidthRule {
  type Err = KdeError;

  /// Accepts `silverman`, `scott`, a bare number, or `fixed=<number>`.
  fn from_str(s: &str) -> Result<Self> {
    let s = s.trim();
    let rule = match s.to_ascii_lowercase().as_str() {
      "silverman" => BandwidthRule::Silverman,
      "scott" => BandwidthRule::Scott,
      "fixed" => {
        return Err(KdeError::config(
          "fixed bandwidth selected without a value",
        ))
      }
      other => {
        let value = other.strip_prefix("fixed=").unwrap_or(other);
        let h = value
          .trim()
          .parse::<f64>()
          .map_err(|_| KdeError::config(format!("unknown bandwidth rule '{s}'")))?;
        BandwidthRule::Fixed(h)
      }
    };
    rule.validate()?;
    Ok(rule)
  }
}

/// Wire form of a rule: its name or a bare number.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum BandwidthRepr {
  Value(f64),
  Name(String),
}

impl TryFrom<BandwidthRepr> for BandwidthRule {
  type Error = KdeError;

  fn try_from(repr: BandwidthRepr) -> Result<Self> {
    match repr {
      BandwidthRepr::Value(h) => {
        let rule = BandwidthRule::Fixed(h);
        rule.validate()?;
        Ok(rule)
      }
      BandwidthRepr::Name(name) => name.parse(),
    }
  }
}

impl From<BandwidthRule> for BandwidthRepr {
  fn from(rule: BandwidthRule) -> Self {
    match rule {
      BandwidthRule::Fixed(h) => BandwidthRepr::Value(h),
      other => BandwidthRepr::Name(other.name().to_string()),
    }
  }
}
