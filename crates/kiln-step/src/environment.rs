use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Static build-time facts visible to step predicates.
///
/// Values are plain strings, the way build flags arrive from configuration
/// files and the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment {
  flags: BTreeMap<String, String>,
}

impl Environment {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_map(flags: impl IntoIterator<Item = (String, String)>) -> Self {
    Self {
      flags: flags.into_iter().collect(),
    }
  }

  /// Set a flag, returning the environment for chaining.
  pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.set(key, value);
    self
  }

  pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
    self.flags.insert(key.into(), value.into());
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.flags.get(key).map(String::as_str)
  }

  /// Whether a flag is present with a truthy value (`true`, `1`, `yes`, `on`).
  pub fn is_enabled(&self, key: &str) -> bool {
    self.get(key).is_some_and(|value| {
      matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
      )
    })
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.flags.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn len(&self) -> usize {
    self.flags.len()
  }

  pub fn is_empty(&self) -> bool {
    self.flags.is_empty()
  }
}
