use std::fmt;
use std::sync::Arc;

use crate::environment::Environment;

type PredicateFn = dyn Fn(&Environment) -> bool + Send + Sync;

/// A named inclusion condition for a build step.
///
/// Predicates must be pure: they are evaluated exactly once per build,
/// before the graph is constructed.
#[derive(Clone)]
pub struct Predicate {
  name: String,
  negated: bool,
  test: Arc<PredicateFn>,
}

impl Predicate {
  /// A predicate that includes the step when `test` returns true.
  pub fn new(
    name: impl Into<String>,
    test: impl Fn(&Environment) -> bool + Send + Sync + 'static,
  ) -> Self {
    Self {
      name: name.into(),
      negated: false,
      test: Arc::new(test),
    }
  }

  /// A predicate that includes the step when `test` returns false.
  pub fn not(
    name: impl Into<String>,
    test: impl Fn(&Environment) -> bool + Send + Sync + 'static,
  ) -> Self {
    Self {
      negated: true,
      ..Self::new(name, test)
    }
  }

  /// Include the step only when the environment flag is truthy.
  pub fn flag(key: impl Into<String>) -> Self {
    let key = key.into();
    let name = format!("flag:{}", key);
    Self::new(name, move |env| env.is_enabled(&key))
  }

  /// Include the step only when the environment flag equals `value`.
  pub fn flag_equals(key: impl Into<String>, value: impl Into<String>) -> Self {
    let key = key.into();
    let value = value.into();
    let name = format!("{}={}", key, value);
    Self::new(name, move |env| env.get(&key) == Some(value.as_str()))
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn is_negated(&self) -> bool {
    self.negated
  }

  pub fn evaluate(&self, env: &Environment) -> bool {
    (self.test)(env) != self.negated
  }
}

impl fmt::Debug for Predicate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Predicate")
      .field("name", &self.name)
      .field("negated", &self.negated)
      .finish_non_exhaustive()
  }
}
