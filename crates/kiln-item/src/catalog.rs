use std::collections::BTreeMap;

use crate::error::CatalogError;
use crate::item::{ItemKind, ItemType};

/// Registry of every item type referenced by a set of build steps.
///
/// The kind is fixed by the first declaration. A later declaration with a
/// different kind is rejected on the spot.
#[derive(Debug, Clone, Default)]
pub struct ItemCatalog {
  items: BTreeMap<String, ItemKind>,
}

impl ItemCatalog {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record an item type, checking it against any earlier declaration.
  pub fn declare(&mut self, item: &ItemType) -> Result<(), CatalogError> {
    if item.name().is_empty() {
      return Err(CatalogError::EmptyName);
    }

    match self.items.get(item.name()) {
      Some(&declared) if declared != item.kind() => Err(CatalogError::KindConflict {
        item: item.name().to_string(),
        declared,
        requested: item.kind(),
      }),
      Some(_) => Ok(()),
      None => {
        self.items.insert(item.name().to_string(), item.kind());
        Ok(())
      }
    }
  }

  /// Check a set of declarations without recording any of them unless all pass.
  pub fn declare_all<'a>(
    &mut self,
    items: impl IntoIterator<Item = &'a ItemType>,
  ) -> Result<(), CatalogError> {
    let mut staged = self.clone();
    for item in items {
      staged.declare(item)?;
    }
    *self = staged;
    Ok(())
  }

  pub fn get(&self, name: &str) -> Option<ItemType> {
    self
      .items
      .get(name)
      .map(|kind| ItemType::new(name, *kind))
  }

  pub fn kind_of(&self, name: &str) -> Option<ItemKind> {
    self.items.get(name).copied()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.items.contains_key(name)
  }

  /// All declared types, ordered by name.
  pub fn iter(&self) -> impl Iterator<Item = ItemType> + '_ {
    self
      .items
      .iter()
      .map(|(name, kind)| ItemType::new(name.clone(), *kind))
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}
