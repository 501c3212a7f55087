//! # Math
//!
//! $$
//! \log\sum_i e^{a_i}=m+\log\sum_i e^{a_i-m},\quad m=\max_i a_i
//! $$
//!
/// `ln(2π)`.
pub const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Smallest density reported by the crate. Anything that underflows below it
/// is clamped here.
pub const MIN_DENSITY: f64 = f64::MIN_POSITIVE;

/// `ln(MIN_DENSITY)`.
pub fn ln_min_density() -> f64 {
  MIN_DENSITY.ln()
}

/// Streaming log-sum-exp accumulator.
///
/// Keeps a running maximum and rescales the partial sum whenever a new
/// maximum arrives, so a full pass needs no buffer.
#[derive(Debug, Clone, Copy)]
pub struct LogSumExp {
  max: f64,
  sum: f64,
}

impl Default for LogSumExp {
  fn default() -> Self {
    Self::new()
  }
}

impl LogSumExp {
  pub fn new() -> Self {
    Self {
      max: f64::NEG_INFINITY,
      sum: 0.0,
    }
  }

  #[inline]
  pub fn push(&mut self, value: f64) {
    if value == f64::NEG_INFINITY {
      return;
    }
    if value <= self.max {
      self.sum += (value - self.max).exp();
    } else {
      self.sum = self.sum * (self.max - value).exp() + 1.0;
      self.max = value;
    }
  }

  /// `ln Σ exp(values)`; `-inf` when nothing finite was pushed.
  pub fn value(&self) -> f64 {
    if self.max == f64::NEG_INFINITY {
      f64::NEG_INFINITY
    } else {
      self.max + self.sum.ln()
    }
  }
}

/// Log-sum-exp over an iterator.
pub fn log_sum_exp<I: IntoIterator<Item = f64>>(values: I) -> f64 {
  let mut acc = LogSumExp::new();
  for v in values {
    acc.push(v);
  }
  acc.value()
}

/// Log normalizer of a `d`-variate Gaussian: `-(d ln 2π + ln|Σ|) / 2`.
pub fn gaussian_log_norm(dim: usize, log_det: f64) -> f64 {
  -0.5 * (dim as f64 * LN_2PI + log_det)
}

#[cfg(test)]
mod tests {
  use std::f64::consts::PI;

  use approx::assert_relative_eq;

  use super::*;

  #[test]
  fn ln_2pi_constant_matches() {
    assert_relative_eq!(LN_2PI, (2.0 * PI).ln(), epsilon = 1e-15);
  }

  #[test]
  fn log_sum_exp_matches_naive_sum() {
    let values = [-1.0, 0.5, 2.0, -3.0];
    let naive = values.iter().map(|v: &f64| v.exp()).sum::<f64>().ln();
    assert_relative_eq!(log_sum_exp(values), naive, epsilon = 1e-12);
  }

  #[test]
  fn log_sum_exp_survives_underflow() {
    // exp(-1000) underflows to zero, the log-space sum does not.
    let lse = log_sum_exp([-1000.0, -1000.0]);
    assert_relative_eq!(lse, -1000.0 + 2f64.ln(), epsilon = 1e-12);
  }

  #[test]
  fn log_sum_exp_of_nothing_is_neg_infinity() {
    assert_eq!(log_sum_exp(std::iter::empty()), f64::NEG_INFINITY);
    assert_eq!(log_sum_exp([f64::NEG_INFINITY]), f64::NEG_INFINITY);
  }
}
