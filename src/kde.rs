//! # Adaptive KDE
//!
//! $$
//! \hat f(q)=\sum_{i=1}^n w_i\,\mathcal N\!\left(q;\,x_i,\,h^2\lambda_i^2\Sigma\right),\qquad
//! \lambda_i=\left(\hat p(x_i)/g\right)^{-\alpha}
//! $$
//!
//! Fitting runs covariance → bandwidth → pilot → local factors → components;
//! the fitted model is immutable afterwards.
//!
pub mod config;
pub mod control;

use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::Axis;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::debug;
use tracing::debug_span;

pub use self::config::KdeConfig;
pub use self::control::FitControl;
use crate::adaptive::LocalBandwidthAdapter;
use crate::adaptive::PilotDensityEstimator;
use crate::covariance::Covariance;
use crate::covariance::CovarianceEstimator;
use crate::error::FitStage;
use crate::error::KdeError;
use crate::error::Result;
use crate::math::ln_min_density;
use crate::math::MIN_DENSITY;
use crate::mixture::GaussianMixture;

/// Rows per independently seeded block in [`AdaptiveKde::sample_par`].
pub const SAMPLE_CHUNK: usize = 4096;

/// Facts about a fit that are not part of the model itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitDiagnostics {
  /// Sample size used by the bandwidth rule, `(Σw)² / Σw²`.
  pub effective_n: f64,
  /// Pilot densities that underflowed and were raised to `MIN_DENSITY`.
  pub pilot_floored: usize,
}

/// Result of a batched evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
  pub values: Array1<f64>,
  /// Queries whose value left the representable range: underflow is clamped
  /// to `MIN_DENSITY` (or its log), linear overflow to `f64::MAX`.
  pub clamped: usize,
}

/// Fitted adaptive-bandwidth Gaussian KDE.
#[derive(Debug, Clone)]
pub struct AdaptiveKde {
  pub(crate) config: KdeConfig,
  pub(crate) global_bandwidth: f64,
  pub(crate) local_factors: Array1<f64>,
  pub(crate) uniform_weights: bool,
  pub(crate) mixture: GaussianMixture,
  pub(crate) diagnostics: Option<FitDiagnostics>,
}

impl AdaptiveKde {
  /// Fits an equally weighted model to `sample` (`n × d`).
  pub fn fit(sample: ArrayView2<f64>, config: &KdeConfig) -> Result<Self> {
    Self::fit_with_control(sample, None, config, &FitControl::new())
  }

  /// Fits with strictly positive per-point weights.
  pub fn fit_weighted(
    sample: ArrayView2<f64>,
    weights: ArrayView1<f64>,
    config: &KdeConfig,
  ) -> Result<Self> {
    Self::fit_with_control(sample, Some(weights), config, &FitControl::new())
  }

  /// Full fit entry point. The configuration is validated before the sample
  /// is touched, and `control` is consulted before every stage.
  pub fn fit_with_control(
    sample: ArrayView2<f64>,
    weights: Option<ArrayView1<f64>>,
    config: &KdeConfig,
    control: &FitControl,
  ) -> Result<Self> {
    config.validate()?;
    validate_sample(sample)?;
    let weights = weights.map(|w| normalize_weights(w, sample.nrows())).transpose()?;

    let (n, d) = sample.dim();
    let _span = debug_span!("fit", n, d).entered();

    control.checkpoint(FitStage::Covariance)?;
    let covariance = CovarianceEstimator::new(config.mode(), config.min_variance)
      .estimate(sample, weights.as_ref().map(|w| w.view()))?;

    control.checkpoint(FitStage::Bandwidth)?;
    let effective_n = match &weights {
      Some(w) => 1.0 / w.iter().map(|x| x * x).sum::<f64>(),
      None => n as f64,
    };
    let global_bandwidth = config.glob_bw.select(effective_n, d)?;
    debug!(rule = %config.glob_bw, global_bandwidth, effective_n, "selected global bandwidth");

    let (local_factors, pilot_floored) = if config.alpha == 0.0 {
      debug!("alpha is zero, skipping pilot density");
      (Array1::ones(n), 0)
    } else {
      control.checkpoint(FitStage::Pilot)?;
      let pilot = PilotDensityEstimator::new(&covariance, global_bandwidth)
        .estimate(sample, weights.as_ref().map(|w| w.view()))?;

      control.checkpoint(FitStage::LocalBandwidth)?;
      let factors = LocalBandwidthAdapter::new(config.alpha)?.adapt(&pilot)?;
      (factors, pilot.floored())
    };

    control.checkpoint(FitStage::Components)?;
    let model = Self::from_parts(
      *config,
      sample.to_owned(),
      covariance,
      global_bandwidth,
      local_factors,
      weights,
      Some(FitDiagnostics {
        effective_n,
        pilot_floored,
      }),
    )?;
    debug!(components = n, "fit complete");
    Ok(model)
  }

  /// Assembles a model from already validated parameters. Shared by `fit`
  /// and deserialization so both build identical components.
  pub(crate) fn from_parts(
    config: KdeConfig,
    means: Array2<f64>,
    covariance: Covariance,
    global_bandwidth: f64,
    local_factors: Array1<f64>,
    weights: Option<Array1<f64>>,
    diagnostics: Option<FitDiagnostics>,
  ) -> Result<Self> {
    if local_factors.len() != means.nrows() {
      return Err(KdeError::DimensionMismatch {
        expected: means.nrows(),
        got: local_factors.len(),
      });
    }
    let scales = local_factors.mapv(|l| global_bandwidth * l);
    let uniform_weights = weights.is_none();
    let mixture = GaussianMixture::new(means, covariance, scales, weights)?;

    Ok(Self {
      config,
      global_bandwidth,
      local_factors,
      uniform_weights,
      mixture,
      diagnostics,
    })
  }

  /// Density (or log density when `log`) at each row of `queries`.
  pub fn predict(&self, queries: ArrayView2<f64>, log: bool) -> Result<Array1<f64>> {
    Ok(self.evaluate(queries, log)?.values)
  }

  /// Like [`predict`](Self::predict) but also reports clamping.
  pub fn evaluate(&self, queries: ArrayView2<f64>, log: bool) -> Result<Evaluation> {
    let log_density = self.mixture.log_density_batch(queries)?;

    let mut clamped = 0;
    let values = if log {
      let floor = ln_min_density();
      log_density.mapv(|lp| {
        if lp == f64::NEG_INFINITY {
          clamped += 1;
          floor
        } else {
          lp
        }
      })
    } else {
      log_density.mapv(|lp| {
        let p = lp.exp();
        if p < MIN_DENSITY {
          clamped += 1;
          MIN_DENSITY
        } else if p == f64::INFINITY {
          clamped += 1;
          f64::MAX
        } else {
          p
        }
      })
    };

    if clamped > 0 {
      debug!(
        clamped,
        queries = values.len(),
        "density clamped to the representable range"
      );
    }
    Ok(Evaluation { values, clamped })
  }

  /// Total log density of `points`.
  pub fn score(&self, points: ArrayView2<f64>) -> Result<f64> {
    Ok(self.predict(points, true)?.sum())
  }

  /// Draws `n_samples` points; see [`GaussianMixture::sample`] for the order in
  /// which `rng` is consumed.
  pub fn sample<R: Rng + ?Sized>(&self, n_samples: usize, rng: &mut R) -> Array2<f64> {
    self.mixture.sample(n_samples, rng)
  }

  /// Parallel sampling. Rows are produced in blocks of [`SAMPLE_CHUNK`], each
  /// from a `StdRng` seeded by `seed` and the block index, so the output
  /// depends only on `seed` and `n_samples`.
  pub fn sample_par(&self, n_samples: usize, seed: u64) -> Array2<f64> {
    let mut out = Array2::<f64>::zeros((n_samples, self.dim()));
    out
      .axis_chunks_iter_mut(Axis(0), SAMPLE_CHUNK)
      .into_par_iter()
      .enumerate()
      .for_each(|(block, mut rows)| {
        let block_seed = seed ^ (block as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let mut rng = StdRng::seed_from_u64(block_seed);
        rows.assign(&self.mixture.sample(rows.nrows(), &mut rng));
      });
    out
  }

  pub fn dim(&self) -> usize {
    self.mixture.dim()
  }

  pub fn n_components(&self) -> usize {
    self.mixture.n_components()
  }

  pub fn config(&self) -> &KdeConfig {
    &self.config
  }

  /// Component means, i.e. the fitted sample.
  pub fn means(&self) -> &Array2<f64> {
    self.mixture.means()
  }

  pub fn covariance(&self) -> &Covariance {
    self.mixture.covariance()
  }

  pub fn global_bandwidth(&self) -> f64 {
    self.global_bandwidth
  }

  pub fn local_factors(&self) -> &Array1<f64> {
    &self.local_factors
  }

  pub fn weights(&self) -> &Array1<f64> {
    self.mixture.weights()
  }

  /// `h² λ_i² Σ` for component `i`.
  pub fn component_covariance(&self, i: usize) -> Option<Array2<f64>> {
    self.mixture.component_covariance(i)
  }

  pub fn mixture(&self) -> &GaussianMixture {
    &self.mixture
  }

  /// Present for fitted models, absent for deserialized ones.
  pub fn diagnostics(&self) -> Option<&FitDiagnostics> {
    self.diagnostics.as_ref()
  }
}

fn validate_sample(sample: ArrayView2<f64>) -> Result<()> {
  let (n, d) = sample.dim();
  if n < 2 {
    return Err(KdeError::degenerate(format!(
      "need at least 2 sample points, got {n}"
    )));
  }
  if d == 0 {
    return Err(KdeError::degenerate("sample points have no features"));
  }
  if let Some(pos) = sample.iter().position(|v| !v.is_finite()) {
    return Err(KdeError::degenerate(format!(
      "sample value at row {}, column {} is not finite",
      pos / d,
      pos % d
    )));
  }
  Ok(())
}

fn normalize_weights(weights: ArrayView1<f64>, n: usize) -> Result<Array1<f64>> {
  if weights.len() != n {
    return Err(KdeError::DimensionMismatch {
      expected: n,
      got: weights.len(),
    });
  }
  if let Some(i) = weights.iter().position(|w| !w.is_finite() || *w <= 0.0) {
    return Err(KdeError::degenerate(format!(
      "weight {i} is {}, expected finite and > 0",
      weights[i]
    )));
  }
  let total = weights.sum();
  Ok(weights.mapv(|w| w / total))
}
