//! The per-step view of the build's items.
//!
//! A [`StepContext`] is assembled by the executor right before a step runs.
//! Its inputs are already resolved: every consumed item is either present or
//! explicitly absent, so a step never waits on another step. Its outputs are
//! buffered and only merged into the shared store when the step succeeds.

use std::collections::{BTreeMap, HashMap};

use kiln_item::{ItemKind, ItemType};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ViewError;

#[derive(Debug, Clone)]
enum Input {
  Single(Option<Value>),
  Multi(Vec<Value>),
}

/// Resolved values of the items a step consumes.
#[derive(Debug, Clone, Default)]
pub struct StepInputs {
  values: HashMap<String, Input>,
}

impl StepInputs {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record a single item, `None` when nothing produced it.
  pub fn insert_single(&mut self, item: impl Into<String>, value: Option<Value>) {
    self.values.insert(item.into(), Input::Single(value));
  }

  pub fn insert_multi(&mut self, item: impl Into<String>, values: Vec<Value>) {
    self.values.insert(item.into(), Input::Multi(values));
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }
}

/// Items a step has produced so far, in production order.
#[derive(Debug, Clone)]
pub struct StepOutputs {
  allowed: BTreeMap<String, ItemKind>,
  produced: Vec<(ItemType, Value)>,
}

impl StepOutputs {
  /// Outputs restricted to the given item types.
  pub fn new<'a>(allowed: impl IntoIterator<Item = &'a ItemType>) -> Self {
    Self {
      allowed: allowed
        .into_iter()
        .map(|item| (item.name().to_string(), item.kind()))
        .collect(),
      produced: Vec::new(),
    }
  }

  fn push(&mut self, step_id: &str, item: &ItemType, value: Value) -> Result<(), ViewError> {
    let Some(&kind) = self.allowed.get(item.name()) else {
      return Err(ViewError::NotProduced {
        step_id: step_id.to_string(),
        item: item.name().to_string(),
      });
    };

    if kind != item.kind() {
      return Err(ViewError::KindMismatch {
        item: item.name().to_string(),
        expected: item.kind(),
        actual: kind,
      });
    }

    if kind == ItemKind::Single && self.produced.iter().any(|(i, _)| i.name() == item.name()) {
      return Err(ViewError::AlreadyProduced {
        step_id: step_id.to_string(),
        item: item.name().to_string(),
      });
    }

    self.produced.push((item.clone(), value));
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.produced.len()
  }

  pub fn is_empty(&self) -> bool {
    self.produced.is_empty()
  }

  pub fn into_items(self) -> Vec<(ItemType, Value)> {
    self.produced
  }
}

/// Read and write access for one step execution.
#[derive(Debug)]
pub struct StepContext {
  step_id: String,
  inputs: StepInputs,
  outputs: StepOutputs,
}

impl StepContext {
  pub fn new(step_id: impl Into<String>, inputs: StepInputs, outputs: StepOutputs) -> Self {
    Self {
      step_id: step_id.into(),
      inputs,
      outputs,
    }
  }

  pub fn step_id(&self) -> &str {
    &self.step_id
  }

  fn input(&self, item: &ItemType) -> Result<&Input, ViewError> {
    self
      .inputs
      .values
      .get(item.name())
      .ok_or_else(|| ViewError::NotConsumed {
        step_id: self.step_id.clone(),
        item: item.name().to_string(),
      })
  }

  /// Read a consumed single item. `None` means no step produced it.
  pub fn get(&self, item: &ItemType) -> Result<Option<&Value>, ViewError> {
    match self.input(item)? {
      Input::Single(value) => Ok(value.as_ref()),
      Input::Multi(_) => Err(ViewError::KindMismatch {
        item: item.name().to_string(),
        expected: ItemKind::Single,
        actual: ItemKind::Multi,
      }),
    }
  }

  /// Read every instance of a consumed multi item. Empty when nothing
  /// contributed.
  pub fn get_all(&self, item: &ItemType) -> Result<&[Value], ViewError> {
    match self.input(item)? {
      Input::Multi(values) => Ok(values),
      Input::Single(_) => Err(ViewError::KindMismatch {
        item: item.name().to_string(),
        expected: ItemKind::Multi,
        actual: ItemKind::Single,
      }),
    }
  }

  pub fn get_as<T: DeserializeOwned>(&self, item: &ItemType) -> Result<Option<T>, ViewError> {
    self
      .get(item)?
      .map(|value| convert(item, value.clone()))
      .transpose()
  }

  pub fn get_all_as<T: DeserializeOwned>(&self, item: &ItemType) -> Result<Vec<T>, ViewError> {
    self
      .get_all(item)?
      .iter()
      .map(|value| convert(item, value.clone()))
      .collect()
  }

  /// Produce an instance of a declared item.
  pub fn produce(&mut self, item: &ItemType, value: Value) -> Result<(), ViewError> {
    self.outputs.push(&self.step_id, item, value)
  }

  pub fn produce_as<T: Serialize>(&mut self, item: &ItemType, value: &T) -> Result<(), ViewError> {
    let value = serde_json::to_value(value).map_err(|e| ViewError::Conversion {
      item: item.name().to_string(),
      message: e.to_string(),
    })?;
    self.produce(item, value)
  }

  /// Consume the context, keeping only what the step produced.
  pub fn into_outputs(self) -> StepOutputs {
    self.outputs
  }
}

fn convert<T: DeserializeOwned>(item: &ItemType, value: Value) -> Result<T, ViewError> {
  serde_json::from_value(value).map_err(|e| ViewError::Conversion {
    item: item.name().to_string(),
    message: e.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn context() -> StepContext {
    let mut inputs = StepInputs::new();
    inputs.insert_single("config", Some(json!({ "port": 8080 })));
    inputs.insert_single("banner", None);
    inputs.insert_multi("feature", vec![json!("rest"), json!("grpc")]);

    let produces = [ItemType::single("jar"), ItemType::multi("resource")];
    StepContext::new("package", inputs, StepOutputs::new(&produces))
  }

  #[test]
  fn test_reads_declared_inputs() {
    let ctx = context();
    assert_eq!(
      ctx.get(&ItemType::single("config")).unwrap(),
      Some(&json!({ "port": 8080 }))
    );
    assert_eq!(ctx.get(&ItemType::single("banner")).unwrap(), None);
    assert_eq!(ctx.get_all(&ItemType::multi("feature")).unwrap().len(), 2);
  }

  #[test]
  fn test_typed_reads() {
    #[derive(serde::Deserialize)]
    struct Config {
      port: u16,
    }

    let ctx = context();
    let config: Config = ctx.get_as(&ItemType::single("config")).unwrap().unwrap();
    assert_eq!(config.port, 8080);

    let features: Vec<String> = ctx.get_all_as(&ItemType::multi("feature")).unwrap();
    assert_eq!(features, vec!["rest", "grpc"]);
  }

  #[test]
  fn test_undeclared_read_is_rejected() {
    let ctx = context();
    assert_eq!(
      ctx.get(&ItemType::single("secret")),
      Err(ViewError::NotConsumed {
        step_id: "package".to_string(),
        item: "secret".to_string(),
      })
    );
  }

  #[test]
  fn test_wrong_kind_read_is_rejected() {
    let ctx = context();
    assert!(matches!(
      ctx.get_all(&ItemType::multi("config")),
      Err(ViewError::KindMismatch { .. })
    ));
  }

  #[test]
  fn test_single_output_only_once() {
    let mut ctx = context();
    let jar = ItemType::single("jar");
    ctx.produce(&jar, json!("app.jar")).unwrap();

    assert_eq!(
      ctx.produce(&jar, json!("other.jar")),
      Err(ViewError::AlreadyProduced {
        step_id: "package".to_string(),
        item: "jar".to_string(),
      })
    );
  }

  #[test]
  fn test_multi_output_accumulates_in_order() {
    let mut ctx = context();
    let resource = ItemType::multi("resource");
    ctx.produce(&resource, json!("a.txt")).unwrap();
    ctx.produce_as(&resource, &"b.txt").unwrap();

    let items = ctx.into_outputs().into_items();
    let values: Vec<&Value> = items.iter().map(|(_, v)| v).collect();
    assert_eq!(values, vec![&json!("a.txt"), &json!("b.txt")]);
  }

  #[test]
  fn test_undeclared_write_is_rejected() {
    let mut ctx = context();
    assert!(matches!(
      ctx.produce(&ItemType::single("native-image"), json!(null)),
      Err(ViewError::NotProduced { .. })
    ));
  }
}
