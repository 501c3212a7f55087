//! # Error
//!
//! $$
//! \mathrm{fit}:\ (X,\theta)\mapsto \hat f \ \text{or}\ \varepsilon\in\{\text{degenerate},\text{config},\text{dim},\text{corrupt},\text{cancelled}\}
//! $$
//!
use std::fmt;

use thiserror::Error;

/// Stages of the fit pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStage {
  Covariance,
  Bandwidth,
  Pilot,
  LocalBandwidth,
  Components,
}

impl fmt::Display for FitStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      FitStage::Covariance => "covariance",
      FitStage::Bandwidth => "bandwidth",
      FitStage::Pilot => "pilot density",
      FitStage::LocalBandwidth => "local bandwidth",
      FitStage::Components => "component",
    };
    f.write_str(name)
  }
}

/// Errors raised by fitting, evaluating and (de)serializing a density model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KdeError {
  /// The sample cannot support a density estimate (too few points,
  /// non-finite values, zero-variance features, singular covariance).
  #[error("degenerate input: {0}")]
  DegenerateInput(String),

  /// A configuration value is out of range or incomplete.
  #[error("invalid configuration: {0}")]
  InvalidConfiguration(String),

  /// Query or model data disagrees with the model dimensionality.
  #[error("dimension mismatch: expected {expected} features, got {got}")]
  DimensionMismatch { expected: usize, got: usize },

  /// A persisted model could not be restored.
  #[error("corrupt model: {0}")]
  CorruptModel(String),

  /// The fit was aborted through its control handle.
  #[error("fit cancelled before the {stage} stage")]
  Cancelled { stage: FitStage },
}

pub type Result<T> = std::result::Result<T, KdeError>;

impl KdeError {
  pub(crate) fn degenerate(msg: impl Into<String>) -> Self {
    KdeError::DegenerateInput(msg.into())
  }

  pub(crate) fn config(msg: impl Into<String>) -> Self {
    KdeError::InvalidConfiguration(msg.into())
  }

  pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
    KdeError::CorruptModel(msg.into())
  }

  /// Re-labels any error as `CorruptModel`, used when rebuilding persisted state.
  pub(crate) fn into_corrupt(self) -> Self {
    match self {
      KdeError::CorruptModel(_) => self,
      other => KdeError::CorruptModel(other.to_string()),
    }
  }
}
