//! Dependency graph for structural analysis
//!
//! Built fresh per scan from language-supplied import edges using petgraph.

pub mod builder;
pub mod store;

pub use builder::{GraphBuilder, ImportEdge};
pub use store::{CouplingMetrics, DependencyGraph, UnitNode};
