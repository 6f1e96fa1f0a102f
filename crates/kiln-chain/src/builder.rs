//! Chain construction: predicate evaluation, dependency wiring and
//! validation.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use kiln_item::{ItemCatalog, ItemKind, ItemType};
use kiln_step::{BuildStep, Consume, Environment, StepDescriptor};
use tracing::{debug, info, instrument};

use crate::chain::{BuildChain, Edge, StepNode};
use crate::error::ChainError;
use crate::graph::Graph;

struct RegisteredStep {
  descriptor: StepDescriptor,
  step: Arc<dyn BuildStep>,
}

/// A producer of one item inside one build.
#[derive(Debug, Clone, Copy)]
struct Producer {
  node: usize,
  overridable: bool,
}

/// Collects step registrations and turns them into a [`BuildChain`].
///
/// The lifecycle is: register every step, then [`build`](Self::build) once
/// per environment.
#[derive(Default)]
pub struct ChainBuilder {
  steps: Vec<RegisteredStep>,
  ids: HashSet<String>,
  catalog: ItemCatalog,
  initial: BTreeMap<String, ItemType>,
  finals: BTreeMap<String, ItemType>,
}

impl ChainBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add one step to the set considered by the next build.
  ///
  /// The descriptor is validated and its item types are declared in the
  /// catalog right away, so kind conflicts are reported here rather than
  /// at build time.
  pub fn register_step(
    &mut self,
    descriptor: StepDescriptor,
    step: impl BuildStep + 'static,
  ) -> Result<&mut Self, ChainError> {
    self.register_shared(descriptor, Arc::new(step))
  }

  /// Like [`register_step`](Self::register_step) for an already shared step.
  pub fn register_shared(
    &mut self,
    descriptor: StepDescriptor,
    step: Arc<dyn BuildStep>,
  ) -> Result<&mut Self, ChainError> {
    descriptor.validate()?;

    if self.ids.contains(descriptor.id()) {
      return Err(ChainError::DuplicateStep {
        step_id: descriptor.id().to_string(),
      });
    }

    self.catalog.declare_all(descriptor.referenced_items())?;
    self.ids.insert(descriptor.id().to_string());
    self.steps.push(RegisteredStep { descriptor, step });
    Ok(self)
  }

  /// Declare an item the caller supplies when the chain is run.
  pub fn add_initial(&mut self, item: ItemType) -> Result<&mut Self, ChainError> {
    self.catalog.declare(&item)?;
    self.initial.insert(item.name().to_string(), item);
    Ok(self)
  }

  /// Declare an item the chain must be able to produce.
  pub fn add_final(&mut self, item: ItemType) -> Result<&mut Self, ChainError> {
    self.catalog.declare(&item)?;
    self.finals.insert(item.name().to_string(), item);
    Ok(self)
  }

  pub fn catalog(&self) -> &ItemCatalog {
    &self.catalog
  }

  pub fn len(&self) -> usize {
    self.steps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }

  /// Evaluate predicates, wire dependencies and validate the result.
  ///
  /// Every failure is reported before anything runs.
  #[instrument(name = "chain_build", skip_all, fields(registered = self.steps.len()))]
  pub fn build(&self, env: &Environment) -> Result<BuildChain, ChainError> {
    let (nodes, excluded) = self.evaluate_predicates(env);
    let index: HashMap<String, usize> = nodes
      .iter()
      .enumerate()
      .map(|(i, n)| (n.id().to_string(), i))
      .collect();

    let producers = self.index_producers(&nodes)?;
    let nodes = resolve_overrides(nodes, &producers);
    let edges = self.wire_dependencies(&nodes, &producers)?;
    self.check_finals(&producers)?;

    let node_ids: Vec<String> = nodes.iter().map(|n| n.id().to_string()).collect();
    let pairs: Vec<(String, String)> = edges
      .iter()
      .map(|e| (e.from.clone(), e.to.clone()))
      .collect();
    let graph = Graph::new(&node_ids, &pairs);

    if let Some(path) = graph.find_cycle() {
      let items = path
        .windows(2)
        .map(|hop| {
          edges
            .iter()
            .find(|e| e.from == hop[0] && e.to == hop[1])
            .map(|e| e.items.join(", "))
            .unwrap_or_default()
        })
        .collect();
      return Err(ChainError::Cycle { path, items });
    }

    info!(
      steps = nodes.len(),
      excluded = excluded.len(),
      edges = edges.len(),
      entry_points = graph.entry_points().len(),
      "chain_built"
    );

    Ok(BuildChain {
      nodes,
      index,
      edges,
      graph,
      catalog: self.catalog.clone(),
      initial: self.initial.clone(),
      finals: self.finals.clone(),
      excluded,
    })
  }

  /// Keep the steps whose predicates pass, ordered by id.
  fn evaluate_predicates(&self, env: &Environment) -> (Vec<StepNode>, Vec<String>) {
    let mut surviving = Vec::new();
    let mut excluded = Vec::new();

    for registered in &self.steps {
      if registered.descriptor.evaluate(env) {
        surviving.push(StepNode {
          productions: registered
            .descriptor
            .productions()
            .iter()
            .map(|p| p.item.clone())
            .collect(),
          overridden: Vec::new(),
          descriptor: registered.descriptor.clone(),
          step: registered.step.clone(),
        });
      } else {
        debug!(step_id = %registered.descriptor.id(), "step_excluded");
        excluded.push(registered.descriptor.id().to_string());
      }
    }

    surviving.sort_by(|a, b| a.id().cmp(b.id()));
    excluded.sort();
    (surviving, excluded)
  }

  /// Index producers per item and reject conflicting single producers.
  fn index_producers(
    &self,
    nodes: &[StepNode],
  ) -> Result<BTreeMap<String, Vec<Producer>>, ChainError> {
    let mut producers: BTreeMap<String, Vec<Producer>> = BTreeMap::new();

    for (i, node) in nodes.iter().enumerate() {
      for production in node.descriptor.productions() {
        let item = &production.item;
        let list = producers.entry(item.name().to_string()).or_default();

        if item.kind() == ItemKind::Single {
          if self.initial.contains_key(item.name()) {
            return Err(ChainError::InitialProduced {
              item: item.name().to_string(),
              step_id: node.id().to_string(),
            });
          }

          if let Some(existing) = list
            .iter()
            .find(|p| p.overridable == production.overridable)
          {
            return Err(ChainError::ConflictingProducers {
              item: item.name().to_string(),
              first: nodes[existing.node].id().to_string(),
              second: node.id().to_string(),
              overridable: production.overridable,
            });
          }
        }

        list.push(Producer {
          node: i,
          overridable: production.overridable,
        });
      }
    }

    Ok(producers)
  }

  /// Add an edge from every effective producer to every consumer.
  fn wire_dependencies(
    &self,
    nodes: &[StepNode],
    producers: &BTreeMap<String, Vec<Producer>>,
  ) -> Result<Vec<Edge>, ChainError> {
    let mut edges: BTreeMap<(usize, usize), BTreeSet<String>> = BTreeMap::new();

    for (consumer, node) in nodes.iter().enumerate() {
      for consumption in node.descriptor.consumptions() {
        let name = consumption.item.name();
        let effective = effective_producers(producers.get(name).map(Vec::as_slice));

        if effective.is_empty() && !self.initial.contains_key(name) {
          match consumption.mode {
            Consume::Required => {
              return Err(ChainError::MissingProducer {
                step_id: node.id().to_string(),
                item: name.to_string(),
              });
            }
            Consume::Optional => {
              debug!(step_id = %node.id(), item = %name, "optional item has no producer");
            }
          }
        }

        for producer in effective {
          if producer.node != consumer {
            edges
              .entry((producer.node, consumer))
              .or_default()
              .insert(name.to_string());
          }
        }
      }
    }

    Ok(
      edges
        .into_iter()
        .map(|((from, to), items)| Edge {
          from: nodes[from].id().to_string(),
          to: nodes[to].id().to_string(),
          items: items.into_iter().collect(),
        })
        .collect(),
    )
  }

  fn check_finals(&self, producers: &BTreeMap<String, Vec<Producer>>) -> Result<(), ChainError> {
    for name in self.finals.keys() {
      let produced = producers.get(name).is_some_and(|list| !list.is_empty());
      if !produced && !self.initial.contains_key(name) {
        return Err(ChainError::MissingFinal { item: name.clone() });
      }
    }
    Ok(())
  }
}

/// Regular producers when any exist, otherwise the overridable ones.
fn effective_producers(list: Option<&[Producer]>) -> Vec<Producer> {
  let list = list.unwrap_or(&[]);
  let regular: Vec<Producer> = list.iter().filter(|p| !p.overridable).copied().collect();
  if regular.is_empty() {
    list.to_vec()
  } else {
    regular
  }
}

/// Move shadowed overridable productions out of each node's effective set.
fn resolve_overrides(
  mut nodes: Vec<StepNode>,
  producers: &BTreeMap<String, Vec<Producer>>,
) -> Vec<StepNode> {
  for (name, list) in producers {
    let has_regular = list.iter().any(|p| !p.overridable);
    if !has_regular {
      continue;
    }

    for producer in list.iter().filter(|p| p.overridable) {
      let node = &mut nodes[producer.node];
      if let Some(pos) = node.productions.iter().position(|i| i.name() == name) {
        let item = node.productions.remove(pos);
        debug!(step_id = %node.id(), item = %name, "production overridden");
        node.overridden.push(item);
      }
    }
  }
  nodes
}
