//! Per-scan dependency graph
//!
//! Nodes are source units keyed by canonical path, edges are directed
//! references with set semantics. The graph lives only for the duration of
//! one scan; only the findings derived from it are persisted.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// A source unit (file or module) in the dependency graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitNode {
    pub path: String,
    /// Production or script unit (scored zone)
    pub production: bool,
    /// Declared or inferred entry point
    pub entry_point: bool,
}

/// Fan-in / fan-out summary for one unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CouplingMetrics {
    pub fan_in: usize,
    pub fan_out: usize,
    /// fan_out / (fan_in + fan_out), 0.0 for isolated units
    pub instability: f64,
}

impl CouplingMetrics {
    pub fn degree(&self) -> usize {
        self.fan_in + self.fan_out
    }
}

/// Directed import graph for one scan scope
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<UnitNode, ()>,
    index: FxHashMap<String, NodeIndex>,
}

impl DependencyGraph {
    pub(crate) fn from_parts(graph: DiGraph<UnitNode, ()>) -> Self {
        let index = graph
            .node_indices()
            .map(|idx| (graph[idx].path.clone(), idx))
            .collect();
        Self { graph, index }
    }

    pub(crate) fn inner(&self) -> &DiGraph<UnitNode, ()> {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn node(&self, path: &str) -> Option<&UnitNode> {
        self.index.get(path).map(|&idx| &self.graph[idx])
    }

    /// All units in path order
    pub fn nodes(&self) -> Vec<&UnitNode> {
        let mut nodes: Vec<&UnitNode> = self.graph.node_weights().collect();
        nodes.sort_by(|a, b| a.path.cmp(&b.path));
        nodes
    }

    fn neighbors(&self, path: &str, direction: Direction) -> Vec<&str> {
        let Some(&idx) = self.index.get(path) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| match direction {
                Direction::Incoming => e.source(),
                Direction::Outgoing => e.target(),
            })
            .filter(|&other| other != idx)
            .map(|other| self.graph[other].path.as_str())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Units that reference `path` (self-references excluded)
    pub fn importers(&self, path: &str) -> Vec<&str> {
        self.neighbors(path, Direction::Incoming)
    }

    /// Units referenced by `path` (self-references excluded)
    pub fn imports(&self, path: &str) -> Vec<&str> {
        self.neighbors(path, Direction::Outgoing)
    }

    pub fn fan_in(&self, path: &str) -> usize {
        self.importers(path).len()
    }

    pub fn fan_out(&self, path: &str) -> usize {
        self.imports(path).len()
    }

    pub fn has_self_loop(&self, path: &str) -> bool {
        self.index
            .get(path)
            .is_some_and(|&idx| self.graph.contains_edge(idx, idx))
    }

    pub fn coupling_metrics(&self, path: &str) -> Option<CouplingMetrics> {
        if !self.contains(path) {
            return None;
        }
        let fan_in = self.fan_in(path);
        let fan_out = self.fan_out(path);
        let total = fan_in + fan_out;
        let instability = if total > 0 {
            fan_out as f64 / total as f64
        } else {
            0.0
        };
        Some(CouplingMetrics {
            fan_in,
            fan_out,
            instability,
        })
    }
}
