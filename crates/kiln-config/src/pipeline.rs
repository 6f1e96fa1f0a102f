use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use kiln_item::ItemKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;
use crate::item::{InitialDef, ItemRef};
use crate::step::StepDef;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorDef {
  /// Maximum steps in flight, 0 for available parallelism.
  #[serde(default)]
  pub workers: usize,
}

/// A complete pipeline manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDef {
  pub name: String,
  #[serde(default)]
  pub environment: BTreeMap<String, String>,
  #[serde(default)]
  pub initial: Vec<InitialDef>,
  #[serde(default)]
  pub finals: Vec<ItemRef>,
  #[serde(default)]
  pub executor: ExecutorDef,
  pub steps: Vec<StepDef>,
}

impl PipelineDef {
  /// Parse and validate a manifest from JSON text.
  pub fn from_json(json: &str) -> Result<Self, ConfigError> {
    let def: PipelineDef = serde_json::from_str(json)?;
    def.validate()?;
    Ok(def)
  }

  /// Read a manifest from disk.
  pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_json(&json)
  }

  /// Structural checks that need no knowledge of step semantics.
  ///
  /// Item kind conflicts and graph problems are left to the chain builder.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.name.trim().is_empty() {
      return Err(ConfigError::invalid("pipeline name must not be empty"));
    }

    let mut seen = HashSet::new();
    for step in &self.steps {
      if step.step_id.trim().is_empty() {
        return Err(ConfigError::invalid("step_id must not be empty"));
      }
      if !seen.insert(step.step_id.as_str()) {
        return Err(ConfigError::invalid(format!(
          "duplicate step_id '{}'",
          step.step_id
        )));
      }
    }

    for initial in &self.initial {
      if initial.item.kind == ItemKind::Multi && !matches!(initial.value, Value::Array(_)) {
        return Err(ConfigError::invalid(format!(
          "initial multi item '{}' needs an array value",
          initial.item.name
        )));
      }
    }

    Ok(())
  }

  pub fn step(&self, step_id: &str) -> Option<&StepDef> {
    self.steps.iter().find(|s| s.step_id == step_id)
  }
}
