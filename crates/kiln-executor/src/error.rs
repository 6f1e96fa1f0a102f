//! Error types for build execution.

use kiln_item::ItemKind;
use kiln_step::StepError;
use serde::Serialize;
use thiserror::Error;

/// A step failure that happened while another failure was already being
/// reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
  pub step_id: String,
  pub message: String,
}

/// Errors that can occur while running a build chain.
#[derive(Debug, Error)]
pub enum ExecutionError {
  /// A step's work function failed. No partial result is returned.
  #[error("build step '{step_id}' failed: {source}")]
  StepFailed {
    step_id: String,
    #[source]
    source: StepError,
    /// Failures of steps that were already running when the first failure
    /// was recorded.
    suppressed: Vec<StepFailure>,
  },

  /// The caller's initial items do not match the chain's declarations.
  #[error("initial item '{item}': {message}")]
  InitialItem { item: String, message: String },

  /// A write that validation should have made impossible.
  #[error("engine invariant violated in step '{step_id}': {source}")]
  InvariantViolation {
    step_id: String,
    #[source]
    source: StoreError,
    /// Step failures observed while the run was draining.
    suppressed: Vec<StepFailure>,
  },

  /// The scheduler lost track of a step.
  #[error("internal executor error: {message}")]
  Internal { message: String },
}

impl ExecutionError {
  /// Failures of other in-flight steps that did not become the reported
  /// error.
  pub fn suppressed(&self) -> &[StepFailure] {
    match self {
      ExecutionError::StepFailed { suppressed, .. }
      | ExecutionError::InvariantViolation { suppressed, .. } => suppressed.as_slice(),
      _ => &[],
    }
  }

  /// The step the error is attributed to, if any.
  pub fn step_id(&self) -> Option<&str> {
    match self {
      ExecutionError::StepFailed { step_id, .. }
      | ExecutionError::InvariantViolation { step_id, .. } => Some(step_id),
      _ => None,
    }
  }
}

/// Errors raised by the result store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
  #[error("item '{item}' is not in the catalog")]
  UnknownItem { item: String },

  #[error("item '{item}' is {actual}, not {expected}")]
  KindMismatch {
    item: String,
    expected: ItemKind,
    actual: ItemKind,
  },

  #[error("single item '{item}' was already produced")]
  AlreadyProduced { item: String },
}
