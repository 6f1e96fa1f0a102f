//! Integration tests for Executor::run.

use std::sync::{Arc, Barrier};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use kiln_chain::{BuildChain, ChainBuilder};
use kiln_executor::{
  ChannelNotifier, ExecutionError, ExecutionEvent, Executor, ExecutorConfig, InitialItems,
  StepStatus,
};
use kiln_item::ItemType;
use kiln_step::{BuildStep, Environment, StepDescriptor, StepError, from_fn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

fn executor(workers: usize) -> Executor {
  Executor::new(ExecutorConfig::with_workers(workers))
}

fn noop() -> impl BuildStep {
  from_fn(|_ctx| Ok::<(), StepError>(()))
}

/// A step that writes `{ "step": id }` to every item it declares.
fn writer(step_id: &'static str, items: Vec<ItemType>) -> impl BuildStep {
  from_fn(move |ctx| {
    for item in &items {
      ctx.produce(item, json!({ "step": step_id }))?;
    }
    Ok(())
  })
}

fn build(builder: &ChainBuilder) -> BuildChain {
  builder.build(&Environment::new()).unwrap()
}

/// Random DAG over single items: step i may consume the output of any
/// earlier step, and every step contributes to a shared multi item.
fn random_chain(rng: &mut StdRng) -> BuildChain {
  let count = rng.gen_range(5..=20);
  let log = ItemType::multi("log");
  let mut builder = ChainBuilder::new();

  for i in 0..count {
    let out = ItemType::single(format!("out-{i:02}"));
    let mut descriptor = StepDescriptor::new(format!("step-{i:02}"))
      .produces(out.clone())
      .produces(log.clone());
    let mut inputs = Vec::new();
    for j in 0..i {
      if rng.gen_bool(0.3) {
        let input = ItemType::single(format!("out-{j:02}"));
        descriptor = descriptor.consumes(input.clone());
        inputs.push(input);
      }
    }

    let log = log.clone();
    builder
      .register_step(
        descriptor,
        from_fn(move |ctx| {
          for input in &inputs {
            if ctx.get(input)?.is_none() {
              return Err(StepError::failed(format!("{} missing", input.name())));
            }
          }
          std::thread::sleep(Duration::from_millis(1));
          ctx.produce(&out, json!(out.name()))?;
          ctx.produce(&log, json!(out.name()))?;
          Ok(())
        }),
      )
      .unwrap();
  }

  build(&builder)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_producers_merge_before_consumers_start() {
  let mut rng = StdRng::seed_from_u64(0x6b696c6e);

  for _ in 0..10 {
    let chain = random_chain(&mut rng);
    let result = executor(4).run(&chain).await.unwrap();

    for edge in chain.edges() {
      let producer = result.record(&edge.from).unwrap();
      let consumer = result.record(&edge.to).unwrap();
      assert!(
        producer.merged_seq.unwrap() < consumer.started_seq.unwrap(),
        "{} -> {} ran out of order",
        edge.from,
        edge.to
      );
    }
    assert_eq!(result.get_all(&ItemType::multi("log")).len(), chain.len());
    assert!(
      result
        .records()
        .iter()
        .all(|r| r.status == StepStatus::Succeeded)
    );
  }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_optional_absent_input_reads_none() {
  let banner = ItemType::single("banner");
  let report = ItemType::single("report");

  let mut builder = ChainBuilder::new();
  builder
    .register_step(
      StepDescriptor::new("summarize")
        .consumes_optional(banner.clone())
        .produces(report.clone()),
      from_fn(move |ctx| {
        let present = ctx.get(&banner)?.is_some();
        ctx.produce(&report, json!({ "banner_present": present }))?;
        Ok(())
      }),
    )
    .unwrap();

  let result = executor(2).run(&build(&builder)).await.unwrap();
  assert_eq!(
    result.get(&ItemType::single("report")),
    Some(&json!({ "banner_present": false }))
  );
  assert_eq!(result.get(&ItemType::single("banner")), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_multi_contributions_are_all_collected() {
  let feature = ItemType::multi("feature");
  let summary = ItemType::single("summary");

  let mut builder = ChainBuilder::new();
  for name in ["a", "b", "c"] {
    let feature = feature.clone();
    builder
      .register_step(
        StepDescriptor::new(format!("feature-{name}")).produces(feature.clone()),
        from_fn(move |ctx| {
          ctx.produce(&feature, json!(name))?;
          Ok(())
        }),
      )
      .unwrap();
  }
  let observed = feature.clone();
  builder
    .register_step(
      StepDescriptor::new("summarize")
        .consumes(feature.clone())
        .produces(summary.clone()),
      from_fn(move |ctx| {
        let count = ctx.get_all(&observed)?.len();
        ctx.produce(&summary, json!(count))?;
        Ok(())
      }),
    )
    .unwrap();

  let result = executor(3).run(&build(&builder)).await.unwrap();

  let mut features: Vec<String> = result.get_all_as(&feature).unwrap();
  features.sort();
  assert_eq!(features, vec!["a", "b", "c"]);
  assert_eq!(result.get(&ItemType::single("summary")), Some(&json!(3)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_repeated_runs_are_identical() {
  let (a, b, c, d) = (
    ItemType::single("a"),
    ItemType::single("b"),
    ItemType::single("c"),
    ItemType::single("d"),
  );

  let mut builder = ChainBuilder::new();
  builder
    .register_step(StepDescriptor::new("p1").produces(a.clone()), writer("p1", vec![a.clone()]))
    .unwrap();
  builder
    .register_step(
      StepDescriptor::new("c1").consumes(a.clone()).produces(b.clone()),
      writer("c1", vec![b.clone()]),
    )
    .unwrap();
  builder
    .register_step(StepDescriptor::new("p2").produces(c.clone()), writer("p2", vec![c.clone()]))
    .unwrap();
  builder
    .register_step(
      StepDescriptor::new("c2")
        .consumes(b.clone())
        .consumes(c.clone())
        .produces(d.clone()),
      writer("c2", vec![d.clone()]),
    )
    .unwrap();
  let chain = build(&builder);

  let first = executor(4).run(&chain).await.unwrap();
  let expected = serde_json::to_string(first.snapshot()).unwrap();
  for _ in 0..50 {
    let result = executor(4).run(&chain).await.unwrap();
    assert_eq!(serde_json::to_string(result.snapshot()).unwrap(), expected);
  }
  assert_eq!(first.get(&d), Some(&json!({ "step": "c2" })));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failure_aborts_dependents() {
  let jar = ItemType::single("jar");
  let downstream_started = Arc::new(AtomicBool::new(false));

  let mut builder = ChainBuilder::new();
  builder
    .register_step(
      StepDescriptor::new("package").produces(jar.clone()),
      from_fn(|_ctx| Err(StepError::failed("disk full"))),
    )
    .unwrap();
  let flag = downstream_started.clone();
  builder
    .register_step(
      StepDescriptor::new("deploy").consumes(jar),
      from_fn(move |_ctx| {
        flag.store(true, Ordering::SeqCst);
        Ok(())
      }),
    )
    .unwrap();

  let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
  let executor = Executor::with_notifier(ExecutorConfig::with_workers(2), ChannelNotifier::new(tx));
  let err = executor.run(&build(&builder)).await.unwrap_err();

  match &err {
    ExecutionError::StepFailed {
      step_id,
      source,
      suppressed,
    } => {
      assert_eq!(step_id, "package");
      assert_eq!(source.to_string(), "disk full");
      assert!(suppressed.is_empty());
    }
    other => panic!("expected step failure, got {other:?}"),
  }
  assert_eq!(err.step_id(), Some("package"));
  assert!(!downstream_started.load(Ordering::SeqCst));

  let mut events = Vec::new();
  while let Ok(event) = rx.try_recv() {
    events.push(event);
  }
  assert!(!events.iter().any(|e| matches!(
    e,
    ExecutionEvent::StepStarted { step_id, .. } if step_id == "deploy"
  )));
  assert!(matches!(events.last(), Some(ExecutionEvent::RunFailed { .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failure_stops_dispatch_of_independent_steps() {
  let independent_ran = Arc::new(AtomicBool::new(false));

  let mut builder = ChainBuilder::new();
  builder
    .register_step(
      StepDescriptor::new("a-fail"),
      from_fn(|_ctx| Err(StepError::failed("x"))),
    )
    .unwrap();
  let flag = independent_ran.clone();
  builder
    .register_step(
      StepDescriptor::new("b-indep"),
      from_fn(move |_ctx| {
        flag.store(true, Ordering::SeqCst);
        Ok(())
      }),
    )
    .unwrap();

  let err = executor(1).run(&build(&builder)).await.unwrap_err();
  assert_eq!(err.step_id(), Some("a-fail"));
  assert!(err.suppressed().is_empty());
  assert!(!independent_ran.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_failures_are_suppressed_not_lost() {
  let barrier = Arc::new(Barrier::new(2));

  let mut builder = ChainBuilder::new();
  for step_id in ["f1", "f2"] {
    let barrier = barrier.clone();
    builder
      .register_step(
        StepDescriptor::new(step_id),
        from_fn(move |_ctx| {
          barrier.wait();
          Err(StepError::failed(step_id))
        }),
      )
      .unwrap();
  }

  let err = executor(2).run(&build(&builder)).await.unwrap_err();
  let ExecutionError::StepFailed {
    step_id,
    source,
    suppressed,
  } = &err
  else {
    panic!("expected step failure, got {err:?}");
  };

  assert_eq!(source.to_string(), *step_id);
  assert_eq!(suppressed.len(), 1);
  let other = if step_id == "f1" { "f2" } else { "f1" };
  assert_eq!(suppressed[0].step_id, other);
  assert_eq!(suppressed[0].message, other);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_panic_is_a_step_failure() {
  let mut builder = ChainBuilder::new();
  builder
    .register_step(
      StepDescriptor::new("explode"),
      from_fn(|_ctx| -> Result<(), StepError> { panic!("boom") }),
    )
    .unwrap();

  let err = executor(1).run(&build(&builder)).await.unwrap_err();
  match err {
    ExecutionError::StepFailed { step_id, source, .. } => {
      assert_eq!(step_id, "explode");
      assert!(matches!(source, StepError::Panicked { ref message } if message == "boom"));
    }
    other => panic!("expected step failure, got {other:?}"),
  }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_undeclared_write_fails_the_step() {
  let mut builder = ChainBuilder::new();
  builder
    .register_step(
      StepDescriptor::new("sneaky"),
      from_fn(|ctx| {
        ctx.produce(&ItemType::single("secret"), json!(1))?;
        Ok(())
      }),
    )
    .unwrap();

  let err = executor(1).run(&build(&builder)).await.unwrap_err();
  assert!(matches!(
    err,
    ExecutionError::StepFailed {
      source: StepError::View(_),
      ..
    }
  ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_overridden_write_is_discarded() {
  let config = ItemType::single("config");
  let seen = ItemType::single("seen");

  let mut builder = ChainBuilder::new();
  builder
    .register_step(
      StepDescriptor::new("default-config").produces_overridable(config.clone()),
      writer("default-config", vec![config.clone()]),
    )
    .unwrap();
  builder
    .register_step(
      StepDescriptor::new("user-config").produces(config.clone()),
      writer("user-config", vec![config.clone()]),
    )
    .unwrap();
  let read = config.clone();
  builder
    .register_step(
      StepDescriptor::new("server")
        .consumes(config.clone())
        .produces(seen.clone()),
      from_fn(move |ctx| {
        let value = ctx.get(&read)?.cloned();
        ctx.produce(&seen, json!(value))?;
        Ok(())
      }),
    )
    .unwrap();

  let result = executor(4).run(&build(&builder)).await.unwrap();
  assert_eq!(result.get(&config), Some(&json!({ "step": "user-config" })));
  assert_eq!(
    result.get(&ItemType::single("seen")),
    Some(&json!({ "step": "user-config" }))
  );
  assert_eq!(
    result.record("default-config").unwrap().status,
    StepStatus::Succeeded
  );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_initial_items_are_visible_to_steps() {
  let version = ItemType::single("version");
  let banner = ItemType::single("banner");

  let mut builder = ChainBuilder::new();
  builder.add_initial(version.clone()).unwrap();
  let read = version.clone();
  let write = banner.clone();
  builder
    .register_step(
      StepDescriptor::new("banner")
        .consumes(version.clone())
        .produces(banner.clone()),
      from_fn(move |ctx| {
        let version: String = ctx.get_as(&read)?.unwrap_or_default();
        ctx.produce(&write, json!(format!("kiln {version}")))?;
        Ok(())
      }),
    )
    .unwrap();
  let chain = build(&builder);

  let result = executor(1)
    .run_with_initial(&chain, InitialItems::new().with(version.clone(), json!("1.2.0")))
    .await
    .unwrap();
  assert_eq!(result.get(&banner), Some(&json!("kiln 1.2.0")));
  assert_eq!(result.get(&version), Some(&json!("1.2.0")));

  let missing = executor(1).run(&chain).await.unwrap_err();
  assert!(matches!(
    missing,
    ExecutionError::InitialItem { ref item, .. } if item == "version"
  ));

  let undeclared = executor(1)
    .run_with_initial(
      &chain,
      InitialItems::new()
        .with(version.clone(), json!("1.2.0"))
        .with(ItemType::single("banner"), json!("forged")),
    )
    .await
    .unwrap_err();
  assert!(matches!(
    undeclared,
    ExecutionError::InitialItem { ref item, .. } if item == "banner"
  ));

  let duplicated = executor(1)
    .run_with_initial(
      &chain,
      InitialItems::new()
        .with(version.clone(), json!("1.2.0"))
        .with(version, json!("1.3.0")),
    )
    .await
    .unwrap_err();
  assert!(matches!(duplicated, ExecutionError::InitialItem { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_flight_steps_are_bounded() {
  let running = Arc::new(AtomicUsize::new(0));
  let peak = Arc::new(AtomicUsize::new(0));

  let mut builder = ChainBuilder::new();
  for i in 0..8 {
    let running = running.clone();
    let peak = peak.clone();
    builder
      .register_step(
        StepDescriptor::new(format!("step-{i}")),
        from_fn(move |_ctx| {
          let now = running.fetch_add(1, Ordering::SeqCst) + 1;
          peak.fetch_max(now, Ordering::SeqCst);
          std::thread::sleep(Duration::from_millis(20));
          running.fetch_sub(1, Ordering::SeqCst);
          Ok(())
        }),
      )
      .unwrap();
  }

  executor(2).run(&build(&builder)).await.unwrap();
  assert!(peak.load(Ordering::SeqCst) <= 2);
  assert!(peak.load(Ordering::SeqCst) >= 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_events_follow_the_run() {
  let jar = ItemType::single("jar");
  let mut builder = ChainBuilder::new();
  builder
    .register_step(
      StepDescriptor::new("package").produces(jar.clone()),
      writer("package", vec![jar.clone()]),
    )
    .unwrap();
  builder
    .register_step(StepDescriptor::new("deploy").consumes(jar), noop())
    .unwrap();

  let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
  let executor = Executor::with_notifier(ExecutorConfig::default(), ChannelNotifier::new(tx));
  let result = executor.run(&build(&builder)).await.unwrap();

  let mut events = Vec::new();
  while let Ok(event) = rx.try_recv() {
    events.push(event);
  }

  let names: Vec<String> = events
    .iter()
    .map(|event| match event {
      ExecutionEvent::RunStarted { steps, .. } => format!("run_started:{steps}"),
      ExecutionEvent::StepStarted { step_id, .. } => format!("started:{step_id}"),
      ExecutionEvent::StepCompleted { step_id, produced, .. } => {
        format!("completed:{step_id}:{produced}")
      }
      ExecutionEvent::StepFailed { step_id, .. } => format!("failed:{step_id}"),
      ExecutionEvent::RunCompleted { .. } => "run_completed".to_string(),
      ExecutionEvent::RunFailed { .. } => "run_failed".to_string(),
    })
    .collect();
  assert_eq!(
    names,
    vec![
      "run_started:2",
      "started:package",
      "completed:package:1",
      "started:deploy",
      "completed:deploy:0",
      "run_completed",
    ]
  );

  assert!(events.iter().all(|event| match event {
    ExecutionEvent::RunStarted { execution_id, .. }
    | ExecutionEvent::StepStarted { execution_id, .. }
    | ExecutionEvent::StepCompleted { execution_id, .. }
    | ExecutionEvent::StepFailed { execution_id, .. }
    | ExecutionEvent::RunCompleted { execution_id }
    | ExecutionEvent::RunFailed { execution_id, .. } => execution_id == result.execution_id(),
  }));
}
