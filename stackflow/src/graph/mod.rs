//! Stack dependency graph.
//!
//! [`DependencyGraph::new`] validates a stack collection once; the ordering
//! methods then derive a deployment order and the waves of stacks that can
//! run concurrently.

mod dependency;
mod ordering;

pub use dependency::DependencyGraph;
