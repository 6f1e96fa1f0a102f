use std::fmt;

use serde::{Deserialize, Serialize};

/// How many instances of an item a build may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
  /// At most one producer and one instance.
  Single,
  /// Any number of producers, accumulated into a list.
  Multi,
}

impl fmt::Display for ItemKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ItemKind::Single => f.write_str("single"),
      ItemKind::Multi => f.write_str("multi"),
    }
  }
}

/// Identifier of a build item type.
///
/// The name is the identity; the kind travels with it so that every
/// declaration can be checked against the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemType {
  name: String,
  kind: ItemKind,
}

impl ItemType {
  pub fn new(name: impl Into<String>, kind: ItemKind) -> Self {
    Self {
      name: name.into(),
      kind,
    }
  }

  /// A single-value item type.
  pub fn single(name: impl Into<String>) -> Self {
    Self::new(name, ItemKind::Single)
  }

  /// A multi-value item type.
  pub fn multi(name: impl Into<String>) -> Self {
    Self::new(name, ItemKind::Multi)
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn kind(&self) -> ItemKind {
    self.kind
  }

  pub fn is_multi(&self) -> bool {
    self.kind == ItemKind::Multi
  }
}

impl fmt::Display for ItemType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ({})", self.name, self.kind)
  }
}
