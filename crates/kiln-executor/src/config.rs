/// Configuration for the executor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorConfig {
  /// Maximum number of steps running at once (0 = available parallelism).
  pub workers: usize,
}

impl ExecutorConfig {
  pub fn with_workers(workers: usize) -> Self {
    Self { workers }
  }

  /// The worker count to actually use.
  pub fn effective_workers(&self) -> usize {
    match self.workers {
      0 => std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4),
      n => n,
    }
  }
}
