//! Kiln Config
//!
//! Serializable pipeline manifests. A manifest lists the environment flags,
//! the initial and final items, executor settings and the steps with their
//! item declarations and predicates. Manifests are plain JSON:
//!
//! ```json
//! {
//!   "name": "service",
//!   "environment": { "native": "true" },
//!   "steps": [
//!     { "step_id": "compile", "produces": [{ "name": "classes" }] },
//!     {
//!       "step_id": "package",
//!       "consumes": [{ "name": "classes" }],
//!       "produces": [{ "name": "jar" }],
//!       "only_if_not": [{ "flag": "native" }]
//!     }
//!   ]
//! }
//! ```
//!
//! These types carry no behavior; the caller turns them into step
//! descriptors.

mod error;
mod item;
mod pipeline;
mod step;

pub use error::ConfigError;
pub use item::{ConsumeRef, InitialDef, ItemRef, ProduceRef};
pub use pipeline::{ExecutorDef, PipelineDef};
pub use step::{FlagCondition, StepDef};
