use kiln_item::{ItemKind, ItemType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn single() -> ItemKind {
  ItemKind::Single
}

fn is_single(kind: &ItemKind) -> bool {
  *kind == ItemKind::Single
}

fn is_false(flag: &bool) -> bool {
  !*flag
}

/// A reference to an item type. Kind defaults to single.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRef {
  pub name: String,
  #[serde(default = "single", skip_serializing_if = "is_single")]
  pub kind: ItemKind,
}

impl ItemRef {
  pub fn item_type(&self) -> ItemType {
    ItemType::new(&self.name, self.kind)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProduceRef {
  #[serde(flatten)]
  pub item: ItemRef,
  /// Only takes effect when no regular producer of the item exists.
  #[serde(default, skip_serializing_if = "is_false")]
  pub overridable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeRef {
  #[serde(flatten)]
  pub item: ItemRef,
  #[serde(default, skip_serializing_if = "is_false")]
  pub optional: bool,
}

/// An item supplied when the pipeline starts.
///
/// For multi items `value` must be an array; each element is one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialDef {
  #[serde(flatten)]
  pub item: ItemRef,
  pub value: Value,
}

impl InitialDef {
  /// The instances this entry contributes.
  pub fn values(&self) -> Vec<Value> {
    match (&self.item.kind, &self.value) {
      (ItemKind::Multi, Value::Array(values)) => values.clone(),
      _ => vec![self.value.clone()],
    }
  }
}
