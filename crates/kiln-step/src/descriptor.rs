use std::collections::HashSet;
use std::fmt;

use kiln_item::ItemType;
use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::error::DescriptorError;
use crate::predicate::Predicate;

/// Whether a consumer can run without any producer of the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consume {
  Required,
  Optional,
}

/// An item type a step may produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Production {
  pub item: ItemType,
  /// Overridable productions only take effect when no regular producer of
  /// the same item survives predicate evaluation.
  pub overridable: bool,
}

/// An item type a step reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumption {
  pub item: ItemType,
  pub mode: Consume,
}

impl Consumption {
  pub fn is_required(&self) -> bool {
    self.mode == Consume::Required
  }
}

/// Immutable declaration of one build step.
#[derive(Clone)]
pub struct StepDescriptor {
  id: String,
  predicates: Vec<Predicate>,
  produces: Vec<Production>,
  consumes: Vec<Consumption>,
}

impl StepDescriptor {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      predicates: Vec::new(),
      produces: Vec::new(),
      consumes: Vec::new(),
    }
  }

  /// Declare a production.
  pub fn produces(self, item: ItemType) -> Self {
    self.add_production(item, false)
  }

  /// Declare a production that yields to any regular producer of the item.
  pub fn produces_overridable(self, item: ItemType) -> Self {
    self.add_production(item, true)
  }

  /// Declare a required consumption.
  pub fn consumes(self, item: ItemType) -> Self {
    self.add_consumption(item, Consume::Required)
  }

  /// Declare an optional consumption. The step sees an absent value when
  /// nothing produces the item.
  pub fn consumes_optional(self, item: ItemType) -> Self {
    self.add_consumption(item, Consume::Optional)
  }

  /// Add an inclusion predicate. Predicates run in declaration order.
  pub fn only_if(
    self,
    name: impl Into<String>,
    test: impl Fn(&Environment) -> bool + Send + Sync + 'static,
  ) -> Self {
    self.with_predicate(Predicate::new(name, test))
  }

  /// Add a negated inclusion predicate.
  pub fn only_if_not(
    self,
    name: impl Into<String>,
    test: impl Fn(&Environment) -> bool + Send + Sync + 'static,
  ) -> Self {
    self.with_predicate(Predicate::not(name, test))
  }

  pub fn with_predicate(mut self, predicate: Predicate) -> Self {
    self.predicates.push(predicate);
    self
  }

  fn add_production(mut self, item: ItemType, overridable: bool) -> Self {
    match self.produces.iter_mut().find(|p| p.item == item) {
      // a regular declaration wins over an overridable one
      Some(existing) => existing.overridable &= overridable,
      None => self.produces.push(Production { item, overridable }),
    }
    self
  }

  fn add_consumption(mut self, item: ItemType, mode: Consume) -> Self {
    match self.consumes.iter_mut().find(|c| c.item == item) {
      Some(existing) => {
        if mode == Consume::Required {
          existing.mode = Consume::Required;
        }
      }
      None => self.consumes.push(Consumption { item, mode }),
    }
    self
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn predicates(&self) -> &[Predicate] {
    &self.predicates
  }

  pub fn productions(&self) -> &[Production] {
    &self.produces
  }

  pub fn consumptions(&self) -> &[Consumption] {
    &self.consumes
  }

  /// Every item type this step references, productions first.
  pub fn referenced_items(&self) -> impl Iterator<Item = &ItemType> {
    self
      .produces
      .iter()
      .map(|p| &p.item)
      .chain(self.consumes.iter().map(|c| &c.item))
  }

  pub fn produces_item(&self, name: &str) -> bool {
    self.produces.iter().any(|p| p.item.name() == name)
  }

  pub fn consumes_item(&self, name: &str) -> bool {
    self.consumes.iter().any(|c| c.item.name() == name)
  }

  /// Check the declaration's own invariants.
  pub fn validate(&self) -> Result<(), DescriptorError> {
    if self.id.trim().is_empty() {
      return Err(DescriptorError::EmptyId);
    }

    let produced: HashSet<&str> = self.produces.iter().map(|p| p.item.name()).collect();
    if let Some(overlap) = self
      .consumes
      .iter()
      .find(|c| produced.contains(c.item.name()))
    {
      return Err(DescriptorError::ProducesAndConsumes {
        step_id: self.id.clone(),
        item: overlap.item.name().to_string(),
      });
    }

    Ok(())
  }

  /// Decide whether the step takes part in a build.
  ///
  /// Predicates are evaluated in declaration order and evaluation stops at
  /// the first one that rejects the step.
  pub fn evaluate(&self, env: &Environment) -> bool {
    self.predicates.iter().all(|p| p.evaluate(env))
  }
}

impl fmt::Debug for StepDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StepDescriptor")
      .field("id", &self.id)
      .field("predicates", &self.predicates)
      .field("produces", &self.produces)
      .field("consumes", &self.consumes)
      .finish()
  }
}
