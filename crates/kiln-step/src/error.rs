use kiln_item::ItemKind;
use thiserror::Error;

/// A step declaration that contradicts itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
  #[error("step id must not be empty")]
  EmptyId,

  #[error("step '{step_id}' both produces and consumes item '{item}'")]
  ProducesAndConsumes { step_id: String, item: String },
}

/// Access outside of what a step declared.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewError {
  #[error("step '{step_id}' did not declare a consumption of item '{item}'")]
  NotConsumed { step_id: String, item: String },

  #[error("step '{step_id}' did not declare a production of item '{item}'")]
  NotProduced { step_id: String, item: String },

  #[error("item '{item}' is {actual}, not {expected}")]
  KindMismatch {
    item: String,
    expected: ItemKind,
    actual: ItemKind,
  },

  #[error("step '{step_id}' already produced single item '{item}'")]
  AlreadyProduced { step_id: String, item: String },

  #[error("failed to convert item '{item}': {message}")]
  Conversion { item: String, message: String },
}

/// Failure reported by a build step's work function.
#[derive(Debug, Error)]
pub enum StepError {
  /// The step gave up with a message.
  #[error("{message}")]
  Failed { message: String },

  /// The step touched an item it did not declare.
  #[error(transparent)]
  View(#[from] ViewError),

  /// An error raised by code the step called into.
  #[error("{source}")]
  Other {
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  /// The work function panicked.
  #[error("step panicked: {message}")]
  Panicked { message: String },
}

impl StepError {
  pub fn failed(message: impl Into<String>) -> Self {
    Self::Failed {
      message: message.into(),
    }
  }

  pub fn other(source: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Other {
      source: Box::new(source),
    }
  }

  pub fn panicked(message: impl Into<String>) -> Self {
    Self::Panicked {
      message: message.into(),
    }
  }
}

impl From<std::io::Error> for StepError {
  fn from(e: std::io::Error) -> Self {
    Self::other(e)
  }
}

impl From<serde_json::Error> for StepError {
  fn from(e: serde_json::Error) -> Self {
    Self::other(e)
  }
}
