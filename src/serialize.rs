//! # Serialize
//!
//! $$
//! \mathcal M \;\mapsto\; \big(\text{mode},\,d,\,\alpha,\,\text{rule},\,h,\,X,\,\Sigma,\,\lambda,\,w\big)
//! $$
//!
//! JSON persistence of a fitted model. Numbers are written with full
//! round-trip precision, so a reloaded model predicts and samples exactly like
//! the one that was saved.
//!
use ndarray::Array1;
use ndarray::Array2;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::bandwidth::BandwidthRule;
use crate::covariance::Covariance;
use crate::covariance::CovarianceMode;
use crate::covariance::DiagonalCovariance;
use crate::covariance::FullCovariance;
use crate::error::KdeError;
use crate::error::Result;
use crate::kde::AdaptiveKde;
use crate::kde::KdeConfig;

pub const FORMAT_VERSION: u32 = 1;

/// Relative tolerance when checking a stored bandwidth against its rule.
const BANDWIDTH_TOL: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ModelDocument {
  format_version: u32,
  mode: CovarianceMode,
  dim: usize,
  alpha: f64,
  glob_bw_rule: String,
  glob_bw: f64,
  means: Vec<Vec<f64>>,
  covariance: CovarianceDocument,
  local_factors: Vec<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  weights: Option<Vec<f64>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  min_variance: Option<f64>,
}

/// Variances for diagonal models, rows for full ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum CovarianceDocument {
  Variances(Vec<f64>),
  Matrix(Vec<Vec<f64>>),
}

impl AdaptiveKde {
  pub fn to_value(&self) -> Result<Value> {
    serde_json::to_value(ModelDocument::from_model(self))
      .map_err(|e| KdeError::corrupt(format!("cannot encode model: {e}")))
  }

  pub fn to_json(&self) -> Result<String> {
    serde_json::to_string_pretty(&ModelDocument::from_model(self))
      .map_err(|e| KdeError::corrupt(format!("cannot encode model: {e}")))
  }

  /// Rebuilds a model. Nothing is returned unless every field checks out.
  pub fn from_value(value: &Value) -> Result<Self> {
    let doc = ModelDocument::deserialize(value)
      .map_err(|e| KdeError::corrupt(format!("malformed model document: {e}")))?;
    doc.into_model()
  }

  pub fn from_json(json: &str) -> Result<Self> {
    let doc: ModelDocument = serde_json::from_str(json)
      .map_err(|e| KdeError::corrupt(format!("malformed model document: {e}")))?;
    doc.into_model()
  }
}

pub fn serialize(model: &AdaptiveKde) -> Result<Value> {
  model.to_value()
}

pub fn deserialize(document: &Value) -> Result<AdaptiveKde> {
  AdaptiveKde::from_value(document)
}

impl ModelDocument {
  fn from_model(model: &AdaptiveKde) -> Self {
    let covariance = match model.covariance() {
      Covariance::Diagonal(c) => CovarianceDocument::Variances(c.variances().to_vec()),
      Covariance::Full(c) => CovarianceDocument::Matrix(rows(c.matrix())),
    };
    let config = model.config();

    Self {
      format_version: FORMAT_VERSION,
      mode: config.mode(),
      dim: model.dim(),
      alpha: config.alpha,
      glob_bw_rule: config.glob_bw.name().to_string(),
      glob_bw: model.global_bandwidth(),
      means: rows(model.means()),
      covariance,
      local_factors: model.local_factors().to_vec(),
      weights: (!model.uniform_weights).then(|| model.weights().to_vec()),
      min_variance: config.min_variance,
    }
  }

  fn into_model(self) -> Result<AdaptiveKde> {
    if self.format_version != FORMAT_VERSION {
      return Err(KdeError::corrupt(format!(
        "unsupported format_version {}, expected {FORMAT_VERSION}",
        self.format_version
      )));
    }
    let d = self.dim;
    if d == 0 {
      return Err(KdeError::corrupt("dim must be at least 1"));
    }

    let glob_bw = self.glob_bw;
    if !glob_bw.is_finite() || glob_bw <= 0.0 {
      return Err(KdeError::corrupt(format!(
        "glob_bw must be finite and > 0, got {glob_bw}"
      )));
    }
    let config = KdeConfig {
      glob_bw: parse_rule(&self.glob_bw_rule, glob_bw)?,
      alpha: self.alpha,
      diag_cov: self.mode == CovarianceMode::Diagonal,
      min_variance: self.min_variance,
    };
    config.validate().map_err(KdeError::into_corrupt)?;

    let means = matrix_from_rows(self.means, d, "means")?;
    let n = means.nrows();
    if n < 2 {
      return Err(KdeError::corrupt(format!(
        "model needs at least 2 components, got {n}"
      )));
    }
    if means.iter().any(|v| !v.is_finite()) {
      return Err(KdeError::corrupt("means contain non-finite values"));
    }

    let covariance = match (self.mode, self.covariance) {
      (CovarianceMode::Diagonal, CovarianceDocument::Variances(v)) => {
        check_len("covariance", v.len(), d)?;
        Covariance::Diagonal(DiagonalCovariance::new(Array1::from_vec(v)).map_err(KdeError::into_corrupt)?)
      }
      (CovarianceMode::Full, CovarianceDocument::Matrix(rows)) => {
        let matrix = matrix_from_rows(rows, d, "covariance")?;
        check_len("covariance", matrix.nrows(), d)?;
        Covariance::Full(FullCovariance::new(matrix).map_err(KdeError::into_corrupt)?)
      }
      (mode, _) => {
        return Err(KdeError::corrupt(format!(
          "covariance layout does not match mode {mode:?}"
        )))
      }
    };

    check_len("local_factors", self.local_factors.len(), n)?;
    if let Some(i) = self
      .local_factors
      .iter()
      .position(|l| !l.is_finite() || *l <= 0.0)
    {
      return Err(KdeError::corrupt(format!(
        "local factor {i} is {}, expected finite and > 0",
        self.local_factors[i]
      )));
    }

    let weights = match self.weights {
      Some(w) => {
        check_len("weights", w.len(), n)?;
        Some(Array1::from_vec(w))
      }
      None => None,
    };
    check_rule_bandwidth(&config.glob_bw, glob_bw, weights.as_ref(), n, d)?;

    let model = AdaptiveKde::from_parts(
      config,
      means,
      covariance,
      glob_bw,
      Array1::from_vec(self.local_factors),
      weights,
      None,
    )
    .map_err(KdeError::into_corrupt)?;
    debug!(n, d, rule = %config.glob_bw, "restored model");
    Ok(model)
  }
}

/// Stored rules are `silverman`, `scott`, `fixed` (the value is `glob_bw`) or
/// `fixed=<value>`, which must agree with `glob_bw`.
fn parse_rule(name: &str, glob_bw: f64) -> Result<BandwidthRule> {
  match name {
    "silverman" => Ok(BandwidthRule::Silverman),
    "scott" => Ok(BandwidthRule::Scott),
    "fixed" => Ok(BandwidthRule::Fixed(glob_bw)),
    other => match other.parse::<BandwidthRule>().map_err(KdeError::into_corrupt)? {
      BandwidthRule::Fixed(h) if h == glob_bw => Ok(BandwidthRule::Fixed(h)),
      BandwidthRule::Fixed(h) => Err(KdeError::corrupt(format!(
        "glob_bw_rule fixes the bandwidth at {h} but glob_bw is {glob_bw}"
      ))),
      rule => Ok(rule),
    },
  }
}

/// A data-driven rule must reproduce the stored bandwidth for this sample.
fn check_rule_bandwidth(
  rule: &BandwidthRule,
  glob_bw: f64,
  weights: Option<&Array1<f64>>,
  n: usize,
  d: usize,
) -> Result<()> {
  if let BandwidthRule::Fixed(_) = rule {
    return Ok(());
  }
  let effective_n = match weights {
    Some(w) => {
      let total = w.sum();
      total * total / w.iter().map(|x| x * x).sum::<f64>()
    }
    None => n as f64,
  };
  let expected = rule.select(effective_n, d).map_err(KdeError::into_corrupt)?;
  if ((expected - glob_bw) / expected).abs() > BANDWIDTH_TOL {
    return Err(KdeError::corrupt(format!(
      "glob_bw {glob_bw} disagrees with the {rule} rule, which gives {expected}"
    )));
  }
  Ok(())
}

fn rows(matrix: &Array2<f64>) -> Vec<Vec<f64>> {
  matrix.rows().into_iter().map(|r| r.to_vec()).collect()
}

fn matrix_from_rows(rows: Vec<Vec<f64>>, d: usize, field: &str) -> Result<Array2<f64>> {
  let n = rows.len();
  if let Some(i) = rows.iter().position(|r| r.len() != d) {
    return Err(KdeError::corrupt(format!(
      "{field} row {i} has {} values, expected {d}",
      rows[i].len()
    )));
  }
  let flat: Vec<f64> = rows.into_iter().flatten().collect();
  Array2::from_shape_vec((n, d), flat)
    .map_err(|e| KdeError::corrupt(format!("{field} has an invalid shape: {e}")))
}

fn check_len(field: &str, got: usize, expected: usize) -> Result<()> {
  if got != expected {
    return Err(KdeError::corrupt(format!(
      "{field} has {got} entries, expected {expected}"
    )));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use ndarray::array;
  use ndarray::Array2;
  use ndarray_rand::RandomExt;
  use rand::rngs::StdRng;
  use rand::SeedableRng;
  use rand_distr::StandardNormal;
  use serde_json::json;

  use super::*;

  fn fitted(config: KdeConfig) -> AdaptiveKde {
    let mut rng = StdRng::seed_from_u64(42);
    let sample = Array2::random_using((60, 2), StandardNormal, &mut rng);
    AdaptiveKde::fit(sample.view(), &config).unwrap()
  }

  fn queries() -> Array2<f64> {
    array![[0.0, 0.0], [1.0, -0.5], [-2.0, 3.0], [7.0, 7.0]]
  }

  fn assert_same_behavior(a: &AdaptiveKde, b: &AdaptiveKde) {
    let q = queries();
    assert_eq!(a.predict(q.view(), true).unwrap(), b.predict(q.view(), true).unwrap());
    assert_eq!(a.predict(q.view(), false).unwrap(), b.predict(q.view(), false).unwrap());
    assert_eq!(
      a.sample(200, &mut StdRng::seed_from_u64(7)),
      b.sample(200, &mut StdRng::seed_from_u64(7))
    );
  }

  #[test]
  fn round_trip_is_exact_for_both_modes() -> anyhow::Result<()> {
    for config in [
      KdeConfig::default(),
      KdeConfig::default().with_diag_cov(true).with_alpha(1.0),
      KdeConfig::default().with_glob_bw(BandwidthRule::Fixed(0.3)).with_alpha(0.0),
    ] {
      let model = fitted(config);
      let restored = AdaptiveKde::from_json(&model.to_json()?)?;

      assert_eq!(restored.config(), model.config());
      assert_eq!(restored.means(), model.means());
      assert_eq!(restored.local_factors(), model.local_factors());
      assert_eq!(restored.global_bandwidth(), model.global_bandwidth());
      assert_same_behavior(&model, &restored);
      assert!(restored.diagnostics().is_none());
    }
    Ok(())
  }

  #[test]
  fn weighted_round_trip_keeps_weights() -> anyhow::Result<()> {
    let sample = array![[0.0, 0.1], [0.3, -0.2], [2.0, 2.5], [2.2, 1.9], [1.0, 1.0]];
    let weights = array![1.0, 2.0, 3.0, 0.5, 1.5];
    let model = AdaptiveKde::fit_weighted(sample.view(), weights.view(), &KdeConfig::default())?;

    let value = serialize(&model)?;
    assert!(value.get("weights").is_some());
    let restored = deserialize(&value)?;
    assert_eq!(restored.weights(), model.weights());
    assert_same_behavior(&model, &restored);
    Ok(())
  }

  #[test]
  fn document_has_expected_fields() -> anyhow::Result<()> {
    let value = fitted(KdeConfig::default().with_diag_cov(true)).to_value()?;

    assert_eq!(value["format_version"], json!(1));
    assert_eq!(value["mode"], json!("diagonal"));
    assert_eq!(value["dim"], json!(2));
    assert_eq!(value["glob_bw_rule"], json!("silverman"));
    assert_eq!(value["means"].as_array().map(Vec::len), Some(60));
    assert_eq!(value["covariance"].as_array().map(Vec::len), Some(2));
    assert!(value.get("weights").is_none());
    assert!(value.get("min_variance").is_none());
    Ok(())
  }

  fn corrupt_with(edit: impl FnOnce(&mut Value)) -> KdeError {
    let mut value = fitted(KdeConfig::default()).to_value().unwrap();
    edit(&mut value);
    AdaptiveKde::from_value(&value).unwrap_err()
  }

  #[test]
  fn missing_field_is_corrupt() {
    let err = corrupt_with(|v| {
      v.as_object_mut().unwrap().remove("local_factors");
    });
    assert!(matches!(err, KdeError::CorruptModel(ref m) if m.contains("local_factors")));
  }

  #[test]
  fn length_mismatch_is_corrupt() {
    let err = corrupt_with(|v| {
      v["local_factors"].as_array_mut().unwrap().pop();
    });
    assert!(matches!(err, KdeError::CorruptModel(ref m) if m.contains("local_factors")));

    let err = corrupt_with(|v| v["dim"] = json!(3));
    assert!(matches!(err, KdeError::CorruptModel(_)));
  }

  #[test]
  fn non_positive_covariance_is_corrupt() {
    let err = corrupt_with(|v| v["covariance"][0][0] = json!(-1.0));
    assert!(matches!(err, KdeError::CorruptModel(ref m) if m.contains("feature 0")));

    let err = corrupt_with(|v| v["local_factors"][3] = json!(0.0));
    assert!(matches!(err, KdeError::CorruptModel(_)));
  }

  #[test]
  fn bandwidth_must_match_rule() {
    let err = corrupt_with(|v| v["glob_bw"] = json!(0.123));
    assert!(matches!(err, KdeError::CorruptModel(ref m) if m.contains("silverman")));

    let err = corrupt_with(|v| v["glob_bw_rule"] = json!("fixed=0.5"));
    assert!(matches!(err, KdeError::CorruptModel(_)));

    let err = corrupt_with(|v| v["glob_bw_rule"] = json!("nearest"));
    assert!(matches!(err, KdeError::CorruptModel(_)));
  }

  #[test]
  fn fixed_rule_takes_stored_bandwidth() -> anyhow::Result<()> {
    let mut value = fitted(KdeConfig::default()).to_value()?;
    value["glob_bw_rule"] = json!("fixed");
    let model = AdaptiveKde::from_value(&value)?;
    assert_eq!(
      model.config().glob_bw,
      BandwidthRule::Fixed(value["glob_bw"].as_f64().unwrap())
    );

    value.as_object_mut().unwrap().remove("glob_bw");
    assert!(matches!(
      AdaptiveKde::from_value(&value),
      Err(KdeError::CorruptModel(_))
    ));
    Ok(())
  }

  #[test]
  fn unknown_version_and_mode_layout_mismatch_are_corrupt() {
    let err = corrupt_with(|v| v["format_version"] = json!(2));
    assert!(matches!(err, KdeError::CorruptModel(ref m) if m.contains("format_version")));

    let err = corrupt_with(|v| v["mode"] = json!("diagonal"));
    assert!(matches!(err, KdeError::CorruptModel(ref m) if m.contains("layout")));
  }
}
