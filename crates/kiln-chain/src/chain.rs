use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use kiln_item::{ItemCatalog, ItemType};
use kiln_step::{BuildStep, StepDescriptor};
use serde::Serialize;

use crate::graph::Graph;

/// A surviving step in a validated chain.
#[derive(Clone)]
pub struct StepNode {
  pub(crate) descriptor: StepDescriptor,
  pub(crate) step: Arc<dyn BuildStep>,
  /// Productions that reach consumers.
  pub(crate) productions: Vec<ItemType>,
  /// Overridable productions shadowed by a regular producer; writes to
  /// these are dropped.
  pub(crate) overridden: Vec<ItemType>,
}

impl StepNode {
  pub fn id(&self) -> &str {
    self.descriptor.id()
  }

  pub fn descriptor(&self) -> &StepDescriptor {
    &self.descriptor
  }

  pub fn step(&self) -> Arc<dyn BuildStep> {
    self.step.clone()
  }

  pub fn productions(&self) -> &[ItemType] {
    &self.productions
  }

  pub fn overridden(&self) -> &[ItemType] {
    &self.overridden
  }

  /// Every item the step may write, whether it takes effect or not.
  pub fn declared_productions(&self) -> impl Iterator<Item = &ItemType> {
    self.productions.iter().chain(self.overridden.iter())
  }
}

impl fmt::Debug for StepNode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StepNode")
      .field("descriptor", &self.descriptor)
      .field("productions", &self.productions)
      .field("overridden", &self.overridden)
      .finish_non_exhaustive()
  }
}

/// A "must complete before" relation between two steps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Edge {
  pub from: String,
  pub to: String,
  /// Item names that induce this edge.
  pub items: Vec<String>,
}

/// A validated, immutable execution plan.
///
/// Produced by [`crate::ChainBuilder::build`]. The chain holds no run
/// state and can be executed any number of times.
#[derive(Debug, Clone)]
pub struct BuildChain {
  pub(crate) nodes: Vec<StepNode>,
  pub(crate) index: HashMap<String, usize>,
  pub(crate) edges: Vec<Edge>,
  pub(crate) graph: Graph,
  pub(crate) catalog: ItemCatalog,
  pub(crate) initial: BTreeMap<String, ItemType>,
  pub(crate) finals: BTreeMap<String, ItemType>,
  pub(crate) excluded: Vec<String>,
}

impl BuildChain {
  /// Surviving steps, ordered by id.
  pub fn steps(&self) -> &[StepNode] {
    &self.nodes
  }

  pub fn get_step(&self, step_id: &str) -> Option<&StepNode> {
    self.index.get(step_id).map(|&i| &self.nodes[i])
  }

  pub fn edges(&self) -> &[Edge] {
    &self.edges
  }

  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  pub fn catalog(&self) -> &ItemCatalog {
    &self.catalog
  }

  pub fn initial_items(&self) -> impl Iterator<Item = &ItemType> {
    self.initial.values()
  }

  pub fn is_initial(&self, item: &str) -> bool {
    self.initial.contains_key(item)
  }

  pub fn final_items(&self) -> impl Iterator<Item = &ItemType> {
    self.finals.values()
  }

  /// Ids of steps removed by their predicates, ordered by id.
  pub fn excluded_steps(&self) -> &[String] {
    &self.excluded
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Steps grouped into levels of mutually independent work.
  pub fn levels(&self) -> Vec<Vec<String>> {
    // the builder rejects cycles, so the levelling always succeeds
    self.graph.levels().unwrap_or_default()
  }
}
