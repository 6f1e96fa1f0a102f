use kiln_item::CatalogError;
use kiln_step::DescriptorError;
use thiserror::Error;

/// Static configuration errors, detected before any step runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
  /// A step declaration is malformed.
  #[error("invalid step declaration: {0}")]
  InvalidDescriptor(#[from] DescriptorError),

  /// An item type was declared with two different kinds.
  #[error("item catalog conflict: {0}")]
  Catalog(#[from] CatalogError),

  /// Two steps were registered under the same id.
  #[error("duplicate build step id '{step_id}'")]
  DuplicateStep { step_id: String },

  /// Two surviving steps produce the same single item.
  #[error("multiple {}producers of single item '{item}': '{first}' and '{second}'", qualifier(.overridable))]
  ConflictingProducers {
    item: String,
    first: String,
    second: String,
    overridable: bool,
  },

  /// A step produces a single item that the caller supplies at run start.
  #[error("item '{item}' cannot be produced by step '{step_id}': it is an initial item")]
  InitialProduced { item: String, step_id: String },

  /// A required consumption has no surviving producer.
  #[error("no producers for required item '{item}' consumed by step '{step_id}'")]
  MissingProducer { step_id: String, item: String },

  /// A declared final item has no surviving producer.
  #[error("no producers for final item '{item}'")]
  MissingFinal { item: String },

  /// The dependency graph contains a cycle.
  #[error("dependency cycle detected: {}", .path.join(" -> "))]
  Cycle {
    /// Step ids along the cycle; the first id is repeated at the end.
    path: Vec<String>,
    /// For each hop, the item(s) carried from one step to the next.
    items: Vec<String>,
  },
}

fn qualifier(overridable: &bool) -> &'static str {
  if *overridable { "overridable " } else { "" }
}

impl ChainError {
  /// Step ids named by this error, for diagnostics.
  pub fn step_ids(&self) -> Vec<&str> {
    match self {
      ChainError::DuplicateStep { step_id }
      | ChainError::InitialProduced { step_id, .. }
      | ChainError::MissingProducer { step_id, .. } => vec![step_id.as_str()],
      ChainError::ConflictingProducers { first, second, .. } => {
        vec![first.as_str(), second.as_str()]
      }
      ChainError::Cycle { path, .. } => path.iter().map(String::as_str).collect(),
      ChainError::InvalidDescriptor(DescriptorError::ProducesAndConsumes { step_id, .. }) => {
        vec![step_id.as_str()]
      }
      _ => Vec::new(),
    }
  }
}
