//! Kiln Executor
//!
//! Runs a validated [`kiln_chain::BuildChain`] on a bounded pool of
//! workers. Each step runs once, after every step it depends on has
//! finished and merged its outputs into the shared [`ResultStore`]. A
//! successful run yields an immutable [`BuildResult`]; the first step
//! failure aborts the run with no partial result.
//!
//! ```ignore
//! let executor = Executor::new(ExecutorConfig::with_workers(4));
//! let result = executor.run(&chain).await?;
//! let jar = result.get(&ItemType::single("jar"));
//! ```

mod config;
mod error;
mod events;
mod executor;
mod result;
mod store;

pub use config::ExecutorConfig;
pub use error::{ExecutionError, StepFailure, StoreError};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use executor::{Executor, InitialItems};
pub use result::{BuildResult, ExecutionRecord, SnapshotEntry, StepStatus};
pub use store::ResultStore;
