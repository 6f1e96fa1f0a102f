//! Chain execution.
//!
//! A single coordinator task owns all scheduling state. Steps run on the
//! tokio blocking pool, at most `workers` at a time. A step becomes ready
//! when its last predecessor has completed; the completion travels back to
//! the coordinator through the `JoinSet`, after the step's outputs are
//! already in the store, so a dependent always observes them.

use std::any::Any;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use kiln_chain::{BuildChain, StepNode};
use kiln_item::{ItemKind, ItemType};
use kiln_step::{BuildStep, Consumption, StepContext, StepError, StepInputs, StepOutputs};
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};

use crate::config::ExecutorConfig;
use crate::error::{ExecutionError, StepFailure, StoreError};
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::result::{BuildResult, ExecutionRecord, StepStatus};
use crate::store::ResultStore;

/// Values supplied by the caller for the chain's initial items.
#[derive(Debug, Clone, Default)]
pub struct InitialItems {
  values: Vec<(ItemType, Value)>,
}

impl InitialItems {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, item: ItemType, value: Value) -> Self {
    self.insert(item, value);
    self
  }

  /// Add a value. Multi items may be given several times.
  pub fn insert(&mut self, item: ItemType, value: Value) {
    self.values.push((item, value));
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }
}

/// Runs build chains on a bounded worker pool.
///
/// Generic over the notifier so event delivery costs nothing when unused.
pub struct Executor<N: ExecutionNotifier = NoopNotifier> {
  config: ExecutorConfig,
  notifier: N,
}

impl Executor<NoopNotifier> {
  pub fn new(config: ExecutorConfig) -> Self {
    Self::with_notifier(config, NoopNotifier)
  }
}

impl<N: ExecutionNotifier> Executor<N> {
  pub fn with_notifier(config: ExecutorConfig, notifier: N) -> Self {
    Self { config, notifier }
  }

  pub fn config(&self) -> &ExecutorConfig {
    &self.config
  }

  /// Run every step of the chain once.
  pub async fn run(&self, chain: &BuildChain) -> Result<BuildResult, ExecutionError> {
    self.run_with_initial(chain, InitialItems::new()).await
  }

  /// Run the chain with caller-supplied initial items.
  ///
  /// Either every step succeeds and the frozen result is returned, or the
  /// first failure is returned and no partial result is produced.
  #[instrument(
    name = "chain_run",
    skip_all,
    fields(steps = chain.len(), execution_id = tracing::field::Empty)
  )]
  pub async fn run_with_initial(
    &self,
    chain: &BuildChain,
    initial: InitialItems,
  ) -> Result<BuildResult, ExecutionError> {
    let execution_id = uuid::Uuid::new_v4().to_string();
    tracing::Span::current().record("execution_id", execution_id.as_str());
    let started = Instant::now();

    let store = ResultStore::new(chain.catalog());
    seed_initial(chain, &store, initial)?;
    let store = Arc::new(store);

    let workers = self.config.effective_workers();
    self.notifier.notify(ExecutionEvent::RunStarted {
      execution_id: execution_id.clone(),
      steps: chain.len(),
    });
    info!(%execution_id, steps = chain.len(), workers, "run_started");

    let outcome = self
      .schedule(chain, store.clone(), workers, &execution_id)
      .await
      .and_then(|records| {
        let store = Arc::try_unwrap(store).map_err(|_| ExecutionError::Internal {
          message: "result store still shared after all steps finished".to_string(),
        })?;
        Ok((store.freeze(), records))
      });

    match outcome {
      Ok((items, records)) => {
        let elapsed = started.elapsed();
        self.notifier.notify(ExecutionEvent::RunCompleted {
          execution_id: execution_id.clone(),
        });
        info!(
          %execution_id,
          items = items.len(),
          elapsed_ms = elapsed.as_millis() as u64,
          "run_completed"
        );
        Ok(BuildResult::new(execution_id, items, records, elapsed))
      }
      Err(e) => {
        self.notifier.notify(ExecutionEvent::RunFailed {
          execution_id: execution_id.clone(),
          error: e.to_string(),
        });
        error!(%execution_id, error = %e, "run_failed");
        Err(e)
      }
    }
  }

  /// Dispatch ready steps until the chain is done or a failure stops it.
  async fn schedule(
    &self,
    chain: &BuildChain,
    store: Arc<ResultStore>,
    workers: usize,
    execution_id: &str,
  ) -> Result<Vec<ExecutionRecord>, ExecutionError> {
    let graph = chain.graph();
    let sequence = Arc::new(AtomicU64::new(0));

    let mut in_degree: HashMap<String, usize> = graph.in_degrees();
    let mut ready: VecDeque<String> = graph.entry_points().iter().cloned().collect();
    let mut records: BTreeMap<String, ExecutionRecord> = chain
      .steps()
      .iter()
      .map(|node| (node.id().to_string(), ExecutionRecord::pending(node.id())))
      .collect();

    let mut tasks: JoinSet<StepOutcome> = JoinSet::new();
    let mut failure: Option<(String, Failure)> = None;
    let mut suppressed: Vec<StepFailure> = Vec::new();
    let mut internal: Option<String> = None;

    loop {
      while failure.is_none() && internal.is_none() && tasks.len() < workers {
        let Some(step_id) = ready.pop_front() else {
          break;
        };
        let Some(node) = chain.get_step(&step_id) else {
          internal = Some(format!("step '{}' is not part of the chain", step_id));
          break;
        };

        if let Some(record) = records.get_mut(&step_id) {
          record.status = StepStatus::Running;
        }
        self.notifier.notify(ExecutionEvent::StepStarted {
          execution_id: execution_id.to_string(),
          step_id: step_id.clone(),
        });
        info!(%execution_id, %step_id, "step_started");

        let job = StepJob::new(node, store.clone(), sequence.clone());
        tasks.spawn_blocking(move || job.run());
      }

      let Some(joined) = tasks.join_next().await else {
        break;
      };

      let outcome = match joined {
        Ok(outcome) => outcome,
        Err(e) => {
          error!(%execution_id, error = %e, "worker task failed");
          if internal.is_none() {
            internal = Some(format!("worker task failed: {}", e));
          }
          continue;
        }
      };

      let StepOutcome {
        step_id,
        started_seq,
        merged_seq,
        duration,
        result,
      } = outcome;

      let Some(record) = records.get_mut(&step_id) else {
        if internal.is_none() {
          internal = Some(format!("completion for unknown step '{}'", step_id));
        }
        continue;
      };
      record.started_seq = Some(started_seq);
      record.merged_seq = merged_seq;
      record.duration = Some(duration);

      match result {
        Ok(produced) => {
          record.status = StepStatus::Succeeded;
          self.notifier.notify(ExecutionEvent::StepCompleted {
            execution_id: execution_id.to_string(),
            step_id: step_id.clone(),
            produced,
            duration_ms: duration.as_millis() as u64,
          });
          info!(
            %execution_id,
            %step_id,
            produced,
            duration_ms = duration.as_millis() as u64,
            "step_completed"
          );

          for dependent in graph.downstream(&step_id) {
            if let Some(remaining) = in_degree.get_mut(dependent) {
              *remaining = remaining.saturating_sub(1);
              if *remaining == 0 {
                ready.push_back(dependent.clone());
              }
            }
          }
        }
        Err(cause) => {
          let message = cause.to_string();
          record.status = StepStatus::Failed;
          record.error = Some(message.clone());
          self.notifier.notify(ExecutionEvent::StepFailed {
            execution_id: execution_id.to_string(),
            step_id: step_id.clone(),
            error: message.clone(),
          });
          match &cause {
            Failure::Invariant(e) => {
              error!(%execution_id, %step_id, error = %e, "engine invariant violated")
            }
            Failure::Step(e) => error!(%execution_id, %step_id, error = %e, "step_failed"),
          }

          if failure.is_none() {
            failure = Some((step_id, cause));
          } else {
            suppressed.push(StepFailure { step_id, message });
          }
        }
      }
    }

    if let Some((step_id, cause)) = failure {
      return Err(cause.into_error(step_id, suppressed));
    }

    if let Some(message) = internal {
      return Err(ExecutionError::Internal { message });
    }

    let stranded: Vec<&str> = records
      .values()
      .filter(|record| record.status != StepStatus::Succeeded)
      .map(|record| record.step_id.as_str())
      .collect();
    if !stranded.is_empty() {
      return Err(ExecutionError::Internal {
        message: format!("steps never became ready: {}", stranded.join(", ")),
      });
    }

    Ok(records.into_values().collect())
  }
}

/// Check the caller's initial values against the chain and write them.
fn seed_initial(
  chain: &BuildChain,
  store: &ResultStore,
  initial: InitialItems,
) -> Result<(), ExecutionError> {
  let declared: HashMap<&str, ItemKind> = chain
    .initial_items()
    .map(|item| (item.name(), item.kind()))
    .collect();

  let mut supplied: HashMap<String, usize> = HashMap::new();
  for (item, value) in initial.values {
    let Some(&kind) = declared.get(item.name()) else {
      return Err(ExecutionError::InitialItem {
        item: item.name().to_string(),
        message: "not declared as an initial item".to_string(),
      });
    };
    if kind != item.kind() {
      return Err(ExecutionError::InitialItem {
        item: item.name().to_string(),
        message: format!("declared {}, supplied as {}", kind, item.kind()),
      });
    }

    store
      .insert(&item, value)
      .map_err(|e| ExecutionError::InitialItem {
        item: item.name().to_string(),
        message: e.to_string(),
      })?;
    *supplied.entry(item.name().to_string()).or_default() += 1;
  }

  for (name, kind) in &declared {
    if *kind == ItemKind::Single && !supplied.contains_key(*name) {
      return Err(ExecutionError::InitialItem {
        item: name.to_string(),
        message: "no value supplied".to_string(),
      });
    }
  }

  debug!(supplied = supplied.len(), "initial_items_seeded");
  Ok(())
}

#[derive(Debug)]
enum Failure {
  Step(StepError),
  Invariant(StoreError),
}

impl Failure {
  fn into_error(self, step_id: String, suppressed: Vec<StepFailure>) -> ExecutionError {
    match self {
      Failure::Step(source) => ExecutionError::StepFailed {
        step_id,
        source,
        suppressed,
      },
      Failure::Invariant(source) => ExecutionError::InvariantViolation {
        step_id,
        source,
        suppressed,
      },
    }
  }
}

impl std::fmt::Display for Failure {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Failure::Step(e) => write!(f, "{}", e),
      Failure::Invariant(e) => write!(f, "{}", e),
    }
  }
}

struct StepOutcome {
  step_id: String,
  started_seq: u64,
  merged_seq: Option<u64>,
  duration: Duration,
  /// Number of values merged into the store.
  result: Result<usize, Failure>,
}

/// Everything a worker needs to run one step, detached from the chain.
struct StepJob {
  step_id: String,
  step: Arc<dyn BuildStep>,
  consumptions: Vec<Consumption>,
  writable: Vec<ItemType>,
  overridden: Vec<ItemType>,
  store: Arc<ResultStore>,
  sequence: Arc<AtomicU64>,
}

impl StepJob {
  fn new(node: &StepNode, store: Arc<ResultStore>, sequence: Arc<AtomicU64>) -> Self {
    Self {
      step_id: node.id().to_string(),
      step: node.step(),
      consumptions: node.descriptor().consumptions().to_vec(),
      writable: node.declared_productions().cloned().collect(),
      overridden: node.overridden().to_vec(),
      store,
      sequence,
    }
  }

  fn run(self) -> StepOutcome {
    let started_seq = self.sequence.fetch_add(1, Ordering::SeqCst);
    let started = Instant::now();

    let result = self.execute().and_then(|outputs| self.merge(outputs));
    let merged_seq = result
      .is_ok()
      .then(|| self.sequence.fetch_add(1, Ordering::SeqCst));

    StepOutcome {
      step_id: self.step_id,
      started_seq,
      merged_seq,
      duration: started.elapsed(),
      result,
    }
  }

  fn inputs(&self) -> Result<StepInputs, StoreError> {
    let mut inputs = StepInputs::new();
    for consumption in &self.consumptions {
      let item = &consumption.item;
      match item.kind() {
        ItemKind::Single => inputs.insert_single(item.name(), self.store.get(item)?),
        ItemKind::Multi => inputs.insert_multi(item.name(), self.store.get_all(item)?),
      }
    }
    Ok(inputs)
  }

  fn execute(&self) -> Result<StepOutputs, Failure> {
    let inputs = self.inputs().map_err(Failure::Invariant)?;
    let mut ctx = StepContext::new(
      self.step_id.clone(),
      inputs,
      StepOutputs::new(&self.writable),
    );

    match panic::catch_unwind(AssertUnwindSafe(|| self.step.execute(&mut ctx))) {
      Ok(Ok(())) => Ok(ctx.into_outputs()),
      Ok(Err(e)) => Err(Failure::Step(e)),
      Err(payload) => Err(Failure::Step(StepError::panicked(panic_message(
        payload.as_ref(),
      )))),
    }
  }

  fn merge(&self, outputs: StepOutputs) -> Result<usize, Failure> {
    let mut merged = 0;
    for (item, value) in outputs.into_items() {
      if self.overridden.iter().any(|o| o.name() == item.name()) {
        debug!(step_id = %self.step_id, item = %item.name(), "overridden_write_discarded");
        continue;
      }
      self.store.insert(&item, value).map_err(Failure::Invariant)?;
      merged += 1;
    }
    Ok(merged)
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    message.to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "step panicked".to_string()
  }
}
