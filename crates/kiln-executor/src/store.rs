//! The shared item store used while a chain runs.
//!
//! One slot exists per catalog item, created up front, so the map itself is
//! never written during a run. Single slots are set-once cells; multi slots
//! are guarded by their own lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, OnceLock, PoisonError};

use kiln_item::{ItemCatalog, ItemKind, ItemType};
use serde_json::Value;

use crate::error::StoreError;
use crate::result::SnapshotEntry;

#[derive(Debug)]
enum Slot {
  Single(OnceLock<Value>),
  Multi(Mutex<Vec<Value>>),
}

impl Slot {
  fn kind(&self) -> ItemKind {
    match self {
      Slot::Single(_) => ItemKind::Single,
      Slot::Multi(_) => ItemKind::Multi,
    }
  }
}

/// Thread-safe holder of the items produced during one run.
#[derive(Debug)]
pub struct ResultStore {
  slots: HashMap<String, Slot>,
}

impl ResultStore {
  /// An empty store with one slot per catalog item.
  pub fn new(catalog: &ItemCatalog) -> Self {
    let slots = catalog
      .iter()
      .map(|item| {
        let slot = match item.kind() {
          ItemKind::Single => Slot::Single(OnceLock::new()),
          ItemKind::Multi => Slot::Multi(Mutex::new(Vec::new())),
        };
        (item.name().to_string(), slot)
      })
      .collect();
    Self { slots }
  }

  fn slot(&self, item: &ItemType) -> Result<&Slot, StoreError> {
    let slot = self
      .slots
      .get(item.name())
      .ok_or_else(|| StoreError::UnknownItem {
        item: item.name().to_string(),
      })?;
    if slot.kind() != item.kind() {
      return Err(mismatch(item, slot));
    }
    Ok(slot)
  }

  /// Current value of a single item, `None` if not produced.
  pub fn get(&self, item: &ItemType) -> Result<Option<Value>, StoreError> {
    match self.slot(item)? {
      Slot::Single(cell) => Ok(cell.get().cloned()),
      slot => Err(mismatch(item, slot)),
    }
  }

  /// Every instance of a multi item contributed so far.
  pub fn get_all(&self, item: &ItemType) -> Result<Vec<Value>, StoreError> {
    match self.slot(item)? {
      Slot::Multi(values) => Ok(
        values
          .lock()
          .unwrap_or_else(PoisonError::into_inner)
          .clone(),
      ),
      slot => Err(mismatch(item, slot)),
    }
  }

  /// Set a single item. Fails if it already holds a value.
  pub fn put(&self, item: &ItemType, value: Value) -> Result<(), StoreError> {
    match self.slot(item)? {
      Slot::Single(cell) => cell.set(value).map_err(|_| StoreError::AlreadyProduced {
        item: item.name().to_string(),
      }),
      slot => Err(mismatch(item, slot)),
    }
  }

  /// Add one instance to a multi item.
  pub fn append(&self, item: &ItemType, value: Value) -> Result<(), StoreError> {
    match self.slot(item)? {
      Slot::Multi(values) => {
        values
          .lock()
          .unwrap_or_else(PoisonError::into_inner)
          .push(value);
        Ok(())
      }
      slot => Err(mismatch(item, slot)),
    }
  }

  /// Write an item according to its kind.
  pub fn insert(&self, item: &ItemType, value: Value) -> Result<(), StoreError> {
    match item.kind() {
      ItemKind::Single => self.put(item, value),
      ItemKind::Multi => self.append(item, value),
    }
  }

  /// Consume the store into an immutable snapshot.
  ///
  /// Single items that were never produced are left out; multi items are
  /// always present, possibly empty.
  pub fn freeze(self) -> BTreeMap<String, SnapshotEntry> {
    self
      .slots
      .into_iter()
      .filter_map(|(name, slot)| {
        let entry = match slot {
          Slot::Single(cell) => SnapshotEntry::Single(cell.into_inner()?),
          Slot::Multi(values) => {
            SnapshotEntry::Multi(values.into_inner().unwrap_or_else(PoisonError::into_inner))
          }
        };
        Some((name, entry))
      })
      .collect()
  }
}

fn mismatch(item: &ItemType, slot: &Slot) -> StoreError {
  StoreError::KindMismatch {
    item: item.name().to_string(),
    expected: item.kind(),
    actual: slot.kind(),
  }
}
