//! The frozen outcome of a successful run.

use std::collections::BTreeMap;
use std::time::Duration;

use kiln_item::ItemType;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One item in a result snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotEntry {
  Single(Value),
  Multi(Vec<Value>),
}

/// Lifecycle of a step within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
  Pending,
  Running,
  Succeeded,
  Failed,
}

/// What happened to one step during a run.
///
/// Sequence numbers come from a single counter shared by the whole run, so
/// they order events across workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
  pub step_id: String,
  pub status: StepStatus,
  /// Taken before the step read its inputs.
  pub started_seq: Option<u64>,
  /// Taken after the step's outputs were visible in the store.
  pub merged_seq: Option<u64>,
  pub duration: Option<Duration>,
  pub error: Option<String>,
}

impl ExecutionRecord {
  pub(crate) fn pending(step_id: impl Into<String>) -> Self {
    Self {
      step_id: step_id.into(),
      status: StepStatus::Pending,
      started_seq: None,
      merged_seq: None,
      duration: None,
      error: None,
    }
  }
}

/// Read-only view of everything a run produced.
#[derive(Debug, Clone)]
pub struct BuildResult {
  execution_id: String,
  items: BTreeMap<String, SnapshotEntry>,
  records: Vec<ExecutionRecord>,
  elapsed: Duration,
}

impl BuildResult {
  pub(crate) fn new(
    execution_id: String,
    items: BTreeMap<String, SnapshotEntry>,
    records: Vec<ExecutionRecord>,
    elapsed: Duration,
  ) -> Self {
    Self {
      execution_id,
      items,
      records,
      elapsed,
    }
  }

  /// The produced value of a single item, `None` if nothing produced it.
  pub fn get(&self, item: &ItemType) -> Option<&Value> {
    match self.items.get(item.name()) {
      Some(SnapshotEntry::Single(value)) => Some(value),
      _ => None,
    }
  }

  /// Every instance of a multi item. Empty, never absent, when nothing
  /// contributed.
  pub fn get_all(&self, item: &ItemType) -> &[Value] {
    match self.items.get(item.name()) {
      Some(SnapshotEntry::Multi(values)) => values,
      _ => &[],
    }
  }

  pub fn get_as<T: DeserializeOwned>(&self, item: &ItemType) -> Result<Option<T>, serde_json::Error> {
    self
      .get(item)
      .map(|value| serde_json::from_value(value.clone()))
      .transpose()
  }

  pub fn get_all_as<T: DeserializeOwned>(&self, item: &ItemType) -> Result<Vec<T>, serde_json::Error> {
    self
      .get_all(item)
      .iter()
      .map(|value| serde_json::from_value(value.clone()))
      .collect()
  }

  /// All items keyed by name.
  pub fn snapshot(&self) -> &BTreeMap<String, SnapshotEntry> {
    &self.items
  }

  /// Per-step records, in step id order.
  pub fn records(&self) -> &[ExecutionRecord] {
    &self.records
  }

  pub fn record(&self, step_id: &str) -> Option<&ExecutionRecord> {
    self.records.iter().find(|r| r.step_id == step_id)
  }

  pub fn execution_id(&self) -> &str {
    &self.execution_id
  }

  pub fn elapsed(&self) -> Duration {
    self.elapsed
  }
}
