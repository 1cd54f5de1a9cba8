//! Graph builder
//!
//! Collects language-supplied reference edges for one scan scope into a
//! [`DependencyGraph`]. Paths are canonicalized, duplicate edges collapse,
//! and node insertion order is sorted so identical input always yields an
//! identical graph.

use super::store::{DependencyGraph, UnitNode};
use crate::models::normalize_path;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A directed reference from one source unit to another
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ImportEdge {
    pub from: String,
    pub to: String,
}

impl ImportEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

type ProductionFilter<'a> = Box<dyn Fn(&str) -> bool + 'a>;

/// Builds a [`DependencyGraph`] from edges and entry points
#[derive(Default)]
pub struct GraphBuilder<'a> {
    nodes: BTreeSet<String>,
    edges: BTreeSet<(String, String)>,
    entry_points: BTreeSet<String>,
    production: Option<ProductionFilter<'a>>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit even if it has no edges
    pub fn node(mut self, path: &str) -> Self {
        self.add_node(path);
        self
    }

    pub fn edge(mut self, from: &str, to: &str) -> Self {
        self.add_edge(from, to);
        self
    }

    pub fn edges<I>(mut self, edges: I) -> Self
    where
        I: IntoIterator<Item = ImportEdge>,
    {
        for e in edges {
            self.add_edge(&e.from, &e.to);
        }
        self
    }

    pub fn entry_point(mut self, path: &str) -> Self {
        self.entry_points.insert(normalize_path(path));
        self
    }

    pub fn entry_points<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for p in paths {
            self.entry_points.insert(normalize_path(p.as_ref()));
        }
        self
    }

    /// Decide which units are production code. Defaults to all of them.
    pub fn with_production_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str) -> bool + 'a,
    {
        self.production = Some(Box::new(filter));
        self
    }

    pub fn add_node(&mut self, path: &str) {
        self.nodes.insert(normalize_path(path));
    }

    pub fn add_edge(&mut self, from: &str, to: &str) {
        let from = normalize_path(from);
        let to = normalize_path(to);
        self.nodes.insert(from.clone());
        self.nodes.insert(to.clone());
        self.edges.insert((from, to));
    }

    pub fn build(self) -> DependencyGraph {
        let mut graph: DiGraph<UnitNode, ()> =
            DiGraph::with_capacity(self.nodes.len(), self.edges.len());
        let mut indices = BTreeMap::new();

        for path in &self.nodes {
            let production = self.production.as_ref().map_or(true, |f| f(path));
            let idx = graph.add_node(UnitNode {
                path: path.clone(),
                production,
                entry_point: self.entry_points.contains(path),
            });
            indices.insert(path.as_str(), idx);
        }

        for (from, to) in &self.edges {
            if let (Some(&a), Some(&b)) = (indices.get(from.as_str()), indices.get(to.as_str())) {
                graph.add_edge(a, b, ());
            }
        }

        debug!(
            "Built dependency graph: {} units, {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        DependencyGraph::from_parts(graph)
    }
}
