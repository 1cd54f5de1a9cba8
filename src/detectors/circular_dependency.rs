//! Circular dependency analyzer using Tarjan's SCC algorithm
//!
//! # Algorithm
//!
//! Uses Tarjan's algorithm via petgraph, which runs in O(V+E) time:
//! 1. Decompose the dependency graph into strongly connected components
//! 2. Keep SCCs with more than one unit, plus single units importing themselves
//! 3. Emit one record per SCC, members sorted so identity is stable
//!
//! Tier scales with SCC size; the cut-offs come from `[graph]` config.

use crate::config::EngineConfig;
use crate::detectors::base::{GraphAnalyzer, RawFinding};
use crate::graph::DependencyGraph;
use petgraph::algo::tarjan_scc;
use tracing::debug;

pub const DETECTOR_NAME: &str = "cycles";

/// Detects import cycles in the dependency graph
pub struct CycleAnalyzer {
    t3_min_size: usize,
    t4_min_size: usize,
}

impl CycleAnalyzer {
    pub fn new() -> Self {
        Self::from_config(&EngineConfig::default())
    }

    /// Read cut-offs from `[graph]`, overridable per detector via
    /// `[detectors.cycles] thresholds = { t3_min_size = .., t4_min_size = .. }`
    pub fn from_config(config: &EngineConfig) -> Self {
        let t3 = config
            .get_threshold_i64(DETECTOR_NAME, "t3_min_size")
            .map(|v| v.max(2) as usize)
            .unwrap_or(config.graph.cycle_t3_min_size);
        let t4 = config
            .get_threshold_i64(DETECTOR_NAME, "t4_min_size")
            .map(|v| v.max(2) as usize)
            .unwrap_or(config.graph.cycle_t4_min_size);
        Self {
            t3_min_size: t3,
            t4_min_size: t4.max(t3),
        }
    }

    fn tier_for(&self, size: usize) -> u8 {
        match size {
            n if n >= self.t4_min_size => 4,
            n if n >= self.t3_min_size => 3,
            _ => 2,
        }
    }

    /// SCCs that form cycles, each sorted, in a stable overall order
    pub fn find_cycles(graph: &DependencyGraph) -> Vec<Vec<String>> {
        let inner = graph.inner();
        let mut cycles: Vec<Vec<String>> = tarjan_scc(inner)
            .into_iter()
            .filter(|scc| scc.len() > 1 || inner.contains_edge(scc[0], scc[0]))
            .map(|scc| {
                let mut members: Vec<String> =
                    scc.into_iter().map(|idx| inner[idx].path.clone()).collect();
                members.sort();
                members
            })
            .collect();
        cycles.sort();
        cycles
    }

    fn create_record(&self, members: Vec<String>) -> RawFinding {
        let size = members.len();
        let display: Vec<&str> = members
            .iter()
            .take(5)
            .map(|f| f.rsplit('/').next().unwrap_or(f))
            .collect();
        let mut chain = display.join(" -> ");
        if size > 5 {
            chain.push_str(&format!(" ... ({} units total)", size));
        }
        let summary = if size == 1 {
            format!("Unit imports itself: {}", members[0])
        } else {
            format!("Import cycle among {} units: {}", size, chain)
        };

        RawFinding::new(DETECTOR_NAME, &members[0], self.tier_for(size))
            .with_anchor(members.join(", "))
            .with_summary(summary)
            .with_confidence("high")
            .with_detail("size", size)
            .with_detail("members", members)
    }
}

impl Default for CycleAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphAnalyzer for CycleAnalyzer {
    fn name(&self) -> &'static str {
        DETECTOR_NAME
    }

    fn description(&self) -> &'static str {
        "Detects import cycles between source units"
    }

    fn analyze(&self, graph: &DependencyGraph) -> Vec<RawFinding> {
        let cycles = Self::find_cycles(graph);
        debug!("Found {} import cycles", cycles.len());
        cycles
            .into_iter()
            .map(|members| self.create_record(members))
            .collect()
    }
}
