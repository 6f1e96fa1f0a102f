//! Turning a manifest into a runnable chain of synthetic steps.

use std::path::{Path, PathBuf};

use kiln_chain::{ChainBuilder, ChainError};
use kiln_config::{FlagCondition, PipelineDef, StepDef};
use kiln_executor::InitialItems;
use kiln_item::{ItemKind, ItemType};
use kiln_step::{BuildStep, Environment, StepContext, StepDescriptor, StepError};
use serde_json::{Map, Value, json};

/// Locate a manifest: as given, or under `<data_dir>/pipelines`.
pub fn resolve_manifest(path: &Path, data_dir: &Path) -> PathBuf {
  if path.exists() || path.is_absolute() {
    return path.to_path_buf();
  }

  let candidate = data_dir.join("pipelines").join(path);
  if candidate.extension().is_none() {
    candidate.with_extension("json")
  } else {
    candidate
  }
}

/// Manifest environment with command line overrides applied.
pub fn environment(def: &PipelineDef, overrides: &[(String, String)]) -> Environment {
  let mut env = Environment::from_map(def.environment.clone());
  for (key, value) in overrides {
    env.set(key, value);
  }
  env
}

/// Register every manifest step, initial item and final item.
pub fn chain_builder(def: &PipelineDef) -> Result<ChainBuilder, ChainError> {
  let mut builder = ChainBuilder::new();
  for initial in &def.initial {
    builder.add_initial(initial.item.item_type())?;
  }
  for item in &def.finals {
    builder.add_final(item.item_type())?;
  }
  for step in &def.steps {
    builder.register_step(descriptor(step), SyntheticStep::new(step))?;
  }
  Ok(builder)
}

pub fn initial_items(def: &PipelineDef) -> InitialItems {
  let mut items = InitialItems::new();
  for initial in &def.initial {
    for value in initial.values() {
      items.insert(initial.item.item_type(), value);
    }
  }
  items
}

fn descriptor(step: &StepDef) -> StepDescriptor {
  let mut descriptor = StepDescriptor::new(&step.step_id);

  for produce in &step.produces {
    descriptor = if produce.overridable {
      descriptor.produces_overridable(produce.item.item_type())
    } else {
      descriptor.produces(produce.item.item_type())
    };
  }
  for consume in &step.consumes {
    descriptor = if consume.optional {
      descriptor.consumes_optional(consume.item.item_type())
    } else {
      descriptor.consumes(consume.item.item_type())
    };
  }
  for condition in &step.only_if {
    descriptor = descriptor.only_if(condition_name(condition), flag_test(condition));
  }
  for condition in &step.only_if_not {
    descriptor = descriptor.only_if_not(condition_name(condition), flag_test(condition));
  }

  descriptor
}

fn condition_name(condition: &FlagCondition) -> String {
  match &condition.equals {
    Some(value) => format!("{}={}", condition.flag, value),
    None => format!("flag:{}", condition.flag),
  }
}

fn flag_test(condition: &FlagCondition) -> impl Fn(&Environment) -> bool + Send + Sync + 'static {
  let flag = condition.flag.clone();
  let equals = condition.equals.clone();
  move |env: &Environment| match &equals {
    Some(value) => env.get(&flag) == Some(value.as_str()),
    None => env.is_enabled(&flag),
  }
}

/// A step that records what it saw.
///
/// Every produced item receives `{ "step": id, "inputs": { ... } }`, which
/// makes the data flow of a manifest visible in the run output.
struct SyntheticStep {
  step_id: String,
  consumes: Vec<ItemType>,
  produces: Vec<ItemType>,
  fail: bool,
}

impl SyntheticStep {
  fn new(def: &StepDef) -> Self {
    Self {
      step_id: def.step_id.clone(),
      consumes: def.consumes.iter().map(|c| c.item.item_type()).collect(),
      produces: def.produces.iter().map(|p| p.item.item_type()).collect(),
      fail: def.fail,
    }
  }
}

impl BuildStep for SyntheticStep {
  fn execute(&self, ctx: &mut StepContext) -> Result<(), StepError> {
    if self.fail {
      return Err(StepError::failed(format!(
        "step '{}' is configured to fail",
        self.step_id
      )));
    }

    let mut inputs = Map::new();
    for item in &self.consumes {
      let value = match item.kind() {
        ItemKind::Single => ctx.get(item)?.cloned().unwrap_or(Value::Null),
        ItemKind::Multi => Value::Array(ctx.get_all(item)?.to_vec()),
      };
      inputs.insert(item.name().to_string(), value);
    }

    let record = json!({ "step": self.step_id, "inputs": inputs });
    for item in &self.produces {
      ctx.produce(item, record.clone())?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use kiln_executor::{Executor, ExecutorConfig};

  use super::*;

  const MANIFEST: &str = r#"{
    "name": "service",
    "environment": { "native": "false" },
    "initial": [{ "name": "version", "value": "1.0.0" }],
    "finals": [{ "name": "artifact" }],
    "steps": [
      { "step_id": "compile", "produces": [{ "name": "classes" }] },
      {
        "step_id": "jar",
        "consumes": [{ "name": "classes" }, { "name": "version" }],
        "produces": [{ "name": "artifact" }],
        "only_if_not": [{ "flag": "native" }]
      },
      {
        "step_id": "native-image",
        "consumes": [{ "name": "classes" }],
        "produces": [{ "name": "artifact" }],
        "only_if": [{ "flag": "native" }]
      }
    ]
  }"#;

  #[test]
  fn test_overrides_replace_manifest_flags() {
    let def = PipelineDef::from_json(MANIFEST).unwrap();
    let env = environment(&def, &[("native".to_string(), "true".to_string())]);
    assert!(env.is_enabled("native"));

    let chain = chain_builder(&def).unwrap().build(&env).unwrap();
    assert!(chain.get_step("native-image").is_some());
    assert!(chain.get_step("jar").is_none());
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn test_synthetic_steps_record_their_inputs() {
    let def = PipelineDef::from_json(MANIFEST).unwrap();
    let chain = chain_builder(&def)
      .unwrap()
      .build(&environment(&def, &[]))
      .unwrap();

    let result = Executor::new(ExecutorConfig::default())
      .run_with_initial(&chain, initial_items(&def))
      .await
      .unwrap();

    assert_eq!(
      result.get(&ItemType::single("artifact")),
      Some(&json!({
        "step": "jar",
        "inputs": {
          "classes": { "step": "compile", "inputs": {} },
          "version": "1.0.0"
        }
      }))
    );
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn test_failing_step_aborts_the_run() {
    let def = PipelineDef::from_json(
      r#"{ "name": "broken", "steps": [{ "step_id": "boom", "fail": true }] }"#,
    )
    .unwrap();
    let chain = chain_builder(&def)
      .unwrap()
      .build(&Environment::new())
      .unwrap();

    let err = Executor::new(ExecutorConfig::default())
      .run(&chain)
      .await
      .unwrap_err();
    assert_eq!(err.step_id(), Some("boom"));
  }

  #[test]
  fn test_resolve_manifest_from_data_dir() {
    let data_dir = tempfile::tempdir().unwrap();
    let pipelines = data_dir.path().join("pipelines");
    std::fs::create_dir_all(&pipelines).unwrap();
    let mut file = std::fs::File::create(pipelines.join("service.json")).unwrap();
    file.write_all(MANIFEST.as_bytes()).unwrap();

    let resolved = resolve_manifest(Path::new("service"), data_dir.path());
    assert_eq!(resolved, pipelines.join("service.json"));
    assert!(PipelineDef::load(&resolved).is_ok());
  }
}
