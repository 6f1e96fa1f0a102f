//! Kiln Step
//!
//! A build step is described by a [`StepDescriptor`]: its id, the predicates
//! that decide whether it takes part in a build, the item types it produces
//! and the item types it consumes. The work itself is a [`BuildStep`], which
//! receives a [`StepContext`] limited to exactly those declarations.
//!
//! Predicates only see the static [`Environment`] supplied by the embedding
//! system. They never see produced items.

mod context;
mod descriptor;
mod environment;
mod error;
mod predicate;
mod step;

pub use context::{StepContext, StepInputs, StepOutputs};
pub use descriptor::{Consume, Consumption, Production, StepDescriptor};
pub use environment::Environment;
pub use error::{DescriptorError, StepError, ViewError};
pub use predicate::Predicate;
pub use step::{BuildStep, FnStep, from_fn};
