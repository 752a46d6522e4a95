//! Dependency graphs over operations and the searches run on them.

pub mod cycle;
pub mod digraph;
pub mod order;
pub mod rel;
