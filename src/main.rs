use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kiln_config::PipelineDef;
use kiln_executor::{Executor, ExecutorConfig};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod pipeline;

/// Kiln - a declarative build-step pipeline engine
#[derive(Parser)]
#[command(name = "kiln")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.kiln)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Override an environment flag, KEY=VALUE (repeatable)
  #[arg(long = "env", global = true, value_parser = parse_flag)]
  env: Vec<(String, String)>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Validate a manifest and print the execution plan
  Check {
    /// Path to the pipeline manifest (JSON)
    manifest: PathBuf,
  },

  /// Render the execution plan as Graphviz DOT
  Graph {
    manifest: PathBuf,

    /// Write to a file instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
  },

  /// Run the pipeline with synthetic steps and print the produced items
  Run {
    manifest: PathBuf,

    /// Maximum steps in flight (overrides the manifest)
    #[arg(long)]
    workers: Option<usize>,
  },
}

fn parse_flag(raw: &str) -> Result<(String, String), String> {
  match raw.split_once('=') {
    Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
    _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
  }
}

fn init_tracing() -> Result<()> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
  let subscriber = FmtSubscriber::builder()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .finish();
  tracing::subscriber::set_global_default(subscriber)?;
  Ok(())
}

fn main() -> Result<()> {
  init_tracing()?;
  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".kiln"),
  };

  match cli.command {
    Some(Commands::Check { manifest }) => check(&manifest, &data_dir, &cli.env)?,
    Some(Commands::Graph { manifest, output }) => {
      graph(&manifest, output.as_deref(), &data_dir, &cli.env)?
    }
    Some(Commands::Run { manifest, workers }) => run(&manifest, workers, &data_dir, &cli.env)?,
    None => {
      println!("kiln - use --help to see available commands");
    }
  }

  Ok(())
}

fn load(manifest: &Path, data_dir: &Path) -> Result<PipelineDef> {
  let path = pipeline::resolve_manifest(manifest, data_dir);
  PipelineDef::load(&path).with_context(|| format!("failed to load manifest: {}", path.display()))
}

fn build_chain(
  def: &PipelineDef,
  overrides: &[(String, String)],
) -> Result<kiln_chain::BuildChain> {
  let env = pipeline::environment(def, overrides);
  let builder = pipeline::chain_builder(def).context("failed to register pipeline steps")?;
  builder
    .build(&env)
    .with_context(|| format!("pipeline '{}' is invalid", def.name))
}

fn check(manifest: &Path, data_dir: &Path, overrides: &[(String, String)]) -> Result<()> {
  let def = load(manifest, data_dir)?;
  let chain = build_chain(&def, overrides)?;

  eprintln!("Pipeline: {}", def.name);
  eprintln!(
    "{} steps ({} excluded), {} edges",
    chain.len(),
    chain.excluded_steps().len(),
    chain.edges().len()
  );
  for (level, steps) in chain.levels().iter().enumerate() {
    println!("{}: {}", level, steps.join(", "));
  }
  if !chain.excluded_steps().is_empty() {
    println!("excluded: {}", chain.excluded_steps().join(", "));
  }

  Ok(())
}

fn graph(
  manifest: &Path,
  output: Option<&Path>,
  data_dir: &Path,
  overrides: &[(String, String)],
) -> Result<()> {
  let def = load(manifest, data_dir)?;
  let dot = build_chain(&def, overrides)?.to_dot();

  match output {
    Some(path) => std::fs::write(path, dot)
      .with_context(|| format!("failed to write graph: {}", path.display()))?,
    None => print!("{}", dot),
  }

  Ok(())
}

fn run(
  manifest: &Path,
  workers: Option<usize>,
  data_dir: &Path,
  overrides: &[(String, String)],
) -> Result<()> {
  let def = load(manifest, data_dir)?;
  let chain = build_chain(&def, overrides)?;
  let config = ExecutorConfig::with_workers(workers.unwrap_or(def.executor.workers));

  let rt = tokio::runtime::Runtime::new()?;
  let result = rt
    .block_on(Executor::new(config).run_with_initial(&chain, pipeline::initial_items(&def)))
    .context("pipeline run failed")?;

  eprintln!("Execution completed: {}", result.execution_id());
  eprintln!(
    "Steps executed: {} in {:?}",
    result.records().len(),
    result.elapsed()
  );
  println!("{}", serde_json::to_string_pretty(result.snapshot())?);

  Ok(())
}
