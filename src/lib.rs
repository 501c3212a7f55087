//! # Adaptive KDE
//!
//! $$
//! \hat f(q)=\sum_{i=1}^n w_i\,\mathcal N\!\left(q;\,x_i,\,h^2\lambda_i^2\Sigma\right)
//! $$
//!
//! Adaptive-bandwidth Gaussian kernel density estimation.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`covariance`] | global covariance estimation, full and diagonal operators |
//! | [`bandwidth`] | Silverman, Scott and fixed global bandwidth rules |
//! | [`adaptive`] | pilot density and per-point bandwidth factors |
//! | [`mixture`] | Gaussian mixture evaluation and sampling |
//! | [`kde`] | fit pipeline and the fitted model |
//! | [`serialize`] | JSON persistence |
//!
pub mod adaptive;
pub mod bandwidth;
pub mod covariance;
pub mod error;
pub mod kde;
pub mod math;
pub mod mixture;
pub mod serialize;
pub mod traits;

pub use bandwidth::BandwidthRule;
pub use covariance::Covariance;
pub use covariance::CovarianceMode;
pub use error::FitStage;
pub use error::KdeError;
pub use error::Result;
pub use kde::AdaptiveKde;
pub use kde::Evaluation;
pub use kde::FitControl;
pub use kde::FitDiagnostics;
pub use kde::KdeConfig;
pub use math::MIN_DENSITY;
pub use serialize::deserialize;
pub use serialize::serialize;
pub use traits::CovarianceOperator;
