//! Layered settings storage.
//!
//! - [`HierarchicalStore`] dot-path addressable JSON tree with deep-merge writes
//! - [`ChainableStore`] parent-linked store whose reads deep-merge down the chain

mod chain;
mod tree;

pub use chain::ChainableStore;
pub use tree::{deep_merge, merged, HierarchicalStore};
