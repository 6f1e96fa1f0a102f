//! Kiln Item
//!
//! Build items are the typed artifacts that build steps exchange. This crate
//! defines the item type identifiers and the [`ItemCatalog`] that records the
//! kind of every type referenced by a set of steps.
//!
//! An item type is either:
//! - [`ItemKind::Single`]: produced by exactly one step, set once
//! - [`ItemKind::Multi`]: appended to by any number of steps

mod catalog;
mod error;
mod item;

pub use catalog::ItemCatalog;
pub use error::CatalogError;
pub use item::{ItemKind, ItemType};
