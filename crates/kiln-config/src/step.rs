use serde::{Deserialize, Serialize};

use crate::item::{ConsumeRef, ProduceRef};

fn is_false(flag: &bool) -> bool {
  !*flag
}

/// A predicate over an environment flag.
///
/// Without `equals` the flag must be truthy; with it, the flag must hold
/// exactly that value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagCondition {
  pub flag: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub equals: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDef {
  pub step_id: String,
  #[serde(default)]
  pub produces: Vec<ProduceRef>,
  #[serde(default)]
  pub consumes: Vec<ConsumeRef>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub only_if: Vec<FlagCondition>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub only_if_not: Vec<FlagCondition>,
  /// Make the synthetic step fail, for exercising abort paths.
  #[serde(default, skip_serializing_if = "is_false")]
  pub fail: bool,
}
