use thiserror::Error;

use crate::ItemKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
  #[error("item '{item}' was declared as {declared} and cannot be redeclared as {requested}")]
  KindConflict {
    item: String,
    declared: ItemKind,
    requested: ItemKind,
  },

  #[error("item type name must not be empty")]
  EmptyName,
}
