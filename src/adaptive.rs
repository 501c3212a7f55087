//! # Adaptive
//!
//! $$
//! \Sigma_i = \left(h\lambda_i\right)^2\Sigma,\qquad \prod_{i=1}^n \lambda_i = 1
//! $$
//!
//! Pilot density pass and the per-point bandwidth refinement built on it.
//!
pub mod local;
pub mod pilot;

pub use self::local::LocalBandwidthAdapter;
pub use self::pilot::PilotDensity;
pub use self::pilot::PilotDensityEstimator;
