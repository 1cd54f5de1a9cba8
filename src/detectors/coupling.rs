//! Coupling hotspot analyzer
//!
//! Uses in-degree and out-degree over the import graph:
//! - fan-in: how many units depend on this one
//! - fan-out: how many units this one reaches into
//!
//! Units whose combined degree exceeds the threshold are god-module
//! candidates. Tier grows with how far past the threshold they are.

use crate::config::EngineConfig;
use crate::detectors::base::{GraphAnalyzer, RawFinding};
use crate::graph::DependencyGraph;
use tracing::debug;

pub const DETECTOR_NAME: &str = "coupling";

/// Detects units with excessive fan-in + fan-out
pub struct CouplingAnalyzer {
    threshold: usize,
    t3_ratio: f64,
    t4_ratio: f64,
}

impl CouplingAnalyzer {
    pub fn new() -> Self {
        Self::from_config(&EngineConfig::default())
    }

    /// `[detectors.coupling] thresholds = { max_degree = .. }` overrides
    /// `[graph] coupling_threshold`
    pub fn from_config(config: &EngineConfig) -> Self {
        let threshold = config
            .get_threshold_i64(DETECTOR_NAME, "max_degree")
            .map(|v| v.max(1) as usize)
            .unwrap_or(config.graph.coupling_threshold)
            .max(1);
        Self {
            threshold,
            t3_ratio: config.graph.coupling_t3_ratio,
            t4_ratio: config.graph.coupling_t4_ratio,
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    fn tier_for(&self, degree: usize) -> u8 {
        let ratio = degree as f64 / self.threshold as f64;
        if ratio > self.t4_ratio {
            4
        } else if ratio > self.t3_ratio {
            3
        } else {
            2
        }
    }
}

impl Default for CouplingAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphAnalyzer for CouplingAnalyzer {
    fn name(&self) -> &'static str {
        DETECTOR_NAME
    }

    fn description(&self) -> &'static str {
        "Detects units with excessive combined fan-in and fan-out"
    }

    fn analyze(&self, graph: &DependencyGraph) -> Vec<RawFinding> {
        let records: Vec<RawFinding> = graph
            .nodes()
            .into_iter()
            .filter_map(|node| {
                let metrics = graph.coupling_metrics(&node.path)?;
                let degree = metrics.degree();
                if degree <= self.threshold {
                    return None;
                }
                Some(
                    RawFinding::new(DETECTOR_NAME, &node.path, self.tier_for(degree))
                        .with_anchor(node.path.clone())
                        .with_summary(format!(
                            "{} is coupled to {} units (fan-in {}, fan-out {}; threshold {})",
                            node.path, degree, metrics.fan_in, metrics.fan_out, self.threshold
                        ))
                        .with_confidence("medium")
                        .with_detail("fan_in", metrics.fan_in)
                        .with_detail("fan_out", metrics.fan_out)
                        .with_detail("instability", metrics.instability)
                        .with_detail("threshold", self.threshold)
                        .with_detail("excess", degree - self.threshold),
                )
            })
            .collect();

        debug!(
            "Found {} coupling hotspots (threshold {})",
            records.len(),
            self.threshold
        );
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;

    fn hub_graph(importers: usize, imports: usize) -> DependencyGraph {
        let mut builder = GraphBuilder::new();
        for i in 0..importers {
            builder.add_edge(&format!("in{}.py", i), "hub.py");
        }
        for i in 0..imports {
            builder.add_edge("hub.py", &format!("out{}.py", i));
        }
        builder.build()
    }

    #[test]
    fn test_below_threshold_is_clean() {
        let graph = hub_graph(2, 2);
        assert!(CouplingAnalyzer::new().with_threshold(4).analyze(&graph).is_empty());
    }

    #[test]
    fn test_hub_above_threshold() {
        let graph = hub_graph(3, 3);
        let records = CouplingAnalyzer::new().with_threshold(4).analyze(&graph);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file.as_deref(), Some("hub.py"));
        assert_eq!(records[0].detail["excess"], serde_json::json!(2));
        assert_eq!(records[0].tier, Some(serde_json::json!(2)));
    }

    #[test]
    fn test_tier_scales_with_excess() {
        let analyzer = CouplingAnalyzer::new().with_threshold(10);
        assert_eq!(analyzer.tier_for(15), 2);
        assert_eq!(analyzer.tier_for(16), 3);
        assert_eq!(analyzer.tier_for(21), 4);
    }

    #[test]
    fn test_threshold_override_from_detector_config() {
        let config: EngineConfig =
            toml::from_str("[detectors.coupling]\nthresholds = { max_degree = 3 }\n").unwrap();
        let records = CouplingAnalyzer::from_config(&config).analyze(&hub_graph(2, 2));
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_empty_graph() {
        assert!(CouplingAnalyzer::new()
            .analyze(&GraphBuilder::new().build())
            .is_empty());
    }
}
