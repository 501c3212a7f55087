//! # Control
//!
//! $$
//! \text{covariance}\to\text{bandwidth}\to\text{pilot}\to\text{local}\to\text{components}
//! $$
//!
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use crate::error::FitStage;
use crate::error::KdeError;
use crate::error::Result;

/// Cancellation flag and optional deadline, checked between fit stages.
///
/// Clones share the flag, so one handle can cancel a fit running on another
/// thread.
#[derive(Debug, Clone, Default)]
pub struct FitControl {
  cancelled: Arc<AtomicBool>,
  deadline: Option<Instant>,
}

impl FitControl {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_deadline(mut self, deadline: Instant) -> Self {
    self.deadline = Some(deadline);
    self
  }

  /// A timeout too large to represent as an `Instant` means no deadline.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.deadline = Instant::now().checked_add(timeout);
    self
  }

  pub fn cancel(&self) {
    self.cancelled.store(true, Ordering::Relaxed);
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::Relaxed)
      || self.deadline.is_some_and(|d| Instant::now() >= d)
  }

  pub(crate) fn checkpoint(&self, stage: FitStage) -> Result<()> {
    if self.is_cancelled() {
      return Err(KdeError::Cancelled { stage });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn clones_share_cancellation() {
    let control = FitControl::new();
    let handle = control.clone();
    assert!(control.checkpoint(FitStage::Covariance).is_ok());

    handle.cancel();
    assert_eq!(
      control.checkpoint(FitStage::Pilot),
      Err(KdeError::Cancelled {
        stage: FitStage::Pilot
      })
    );
  }

  #[test]
  fn expired_deadline_cancels() {
    let control = FitControl::new().with_deadline(Instant::now());
    assert!(control.is_cancelled());

    let control = FitControl::new().with_timeout(Duration::from_secs(3600));
    assert!(!control.is_cancelled());
  }

  #[test]
  fn unbounded_timeout_means_no_deadline() {
    let control = FitControl::new().with_timeout(Duration::MAX);
    assert!(!control.is_cancelled());
    assert!(control.checkpoint(FitStage::Components).is_ok());
  }
}
