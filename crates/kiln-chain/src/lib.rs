//! Kiln Chain
//!
//! This crate turns an unordered set of registered build steps into a
//! validated [`BuildChain`]: the dependency graph of the steps that survive
//! predicate evaluation, with an edge from every producer of an item to
//! every consumer of it.
//!
//! Validation happens entirely up front:
//! - conflicting producers of a single item
//! - required items without a surviving producer
//! - final items nobody produces
//! - dependency cycles, reported with the full cycle path
//!
//! ```ignore
//! let mut builder = ChainBuilder::new();
//! builder.register_step(
//!   StepDescriptor::new("compile").consumes(sources).produces(classes),
//!   kiln_step::from_fn(|ctx| { /* ... */ Ok(()) }),
//! )?;
//! let chain = builder.build(&Environment::new())?;
//! ```

mod builder;
mod chain;
mod dot;
mod error;
mod graph;

pub use builder::ChainBuilder;
pub use chain::{BuildChain, Edge, StepNode};
pub use error::ChainError;
pub use graph::Graph;
