//! Orphaned unit analyzer
//!
//! Flags production units that nothing else in production imports and
//! that are not entry points. Imports from tests do not keep a unit alive:
//! code exercised only by its own tests is still dead weight.
//!
//! Entry points come from two places:
//! - units the language plugin declared (`UnitNode::entry_point`)
//! - units matching a configured marker (`[graph] entry_markers`)
//!
//! A graph with no edges carries no reference information at all, so it
//! produces no records.

use crate::config::EngineConfig;
use crate::detectors::base::{GraphAnalyzer, RawFinding};
use crate::graph::{DependencyGraph, UnitNode};
use tracing::debug;

pub const DETECTOR_NAME: &str = "orphaned";

/// Detects production units with no production importers
pub struct OrphanAnalyzer {
    entry_markers: Vec<String>,
}

impl OrphanAnalyzer {
    pub fn new() -> Self {
        Self::from_config(&EngineConfig::default())
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            entry_markers: config.graph.entry_markers.clone(),
        }
    }

    /// Markers containing `/` match anywhere in the path; others match the
    /// start of the file name.
    fn matches_marker(&self, path: &str) -> bool {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        self.entry_markers.iter().any(|marker| {
            if marker.contains('/') {
                path.contains(marker.as_str())
            } else {
                file_name.starts_with(marker.as_str())
            }
        })
    }

    fn is_entry_point(&self, node: &UnitNode) -> bool {
        node.entry_point || self.matches_marker(&node.path)
    }
}

impl Default for OrphanAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphAnalyzer for OrphanAnalyzer {
    fn name(&self) -> &'static str {
        DETECTOR_NAME
    }

    fn description(&self) -> &'static str {
        "Detects production units that nothing imports"
    }

    fn analyze(&self, graph: &DependencyGraph) -> Vec<RawFinding> {
        if graph.edge_count() == 0 {
            return Vec::new();
        }

        let records: Vec<RawFinding> = graph
            .nodes()
            .into_iter()
            .filter(|node| node.production && !self.is_entry_point(node))
            .filter(|node| {
                graph
                    .importers(&node.path)
                    .into_iter()
                    .all(|importer| graph.node(importer).map_or(true, |n| !n.production))
            })
            .map(|node| {
                let test_importers = graph.fan_in(&node.path);
                RawFinding::new(DETECTOR_NAME, &node.path, 2)
                    .with_anchor(node.path.clone())
                    .with_summary(format!(
                        "{} is not imported by any production code",
                        node.path
                    ))
                    .with_confidence("medium")
                    .with_detail("fan_out", graph.fan_out(&node.path))
                    .with_detail("non_production_importers", test_importers)
            })
            .collect();

        debug!("Found {} orphaned units", records.len());
        records
    }
}
