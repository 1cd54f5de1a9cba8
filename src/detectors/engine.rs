//! Detector execution engine
//!
//! The DetectorEngine runs everything that produces raw findings for one
//! scan:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    DetectorEngine                       │
//! ├─────────────────────────────────────────────────────────┤
//! │  1. Register plugin detectors and graph analyzers       │
//! │  2. Skip anything disabled in config                    │
//! │  3. Run plugin detectors, isolating failures            │
//! │  4. Run graph analyzers over the dependency graph       │
//! │  5. Collect raw records and a summary                   │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Execution is sequential; a scan is single-threaded end to end. A failing
//! detector contributes no records. That looks exactly like "all its
//! findings disappeared", which is what the suspect guard in the merge
//! engine exists to catch.

use crate::config::EngineConfig;
use crate::detectors::base::{
    DetectionSummary, Detector, DetectorResult, GraphAnalyzer, RawFinding, ScanScope,
};
use crate::detectors::{CouplingAnalyzer, CycleAnalyzer, OrphanAnalyzer};
use crate::graph::DependencyGraph;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything one detection pass produced
#[derive(Debug, Clone, Default)]
pub struct DetectionOutcome {
    pub records: Vec<RawFinding>,
    pub results: Vec<DetectorResult>,
    pub summary: DetectionSummary,
}

/// Orchestrates detectors and graph analyzers for a scan
#[derive(Default)]
pub struct DetectorEngine {
    detectors: Vec<Arc<dyn Detector>>,
    analyzers: Vec<Box<dyn GraphAnalyzer>>,
}

impl DetectorEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine preloaded with the cycle, orphan and coupling analyzers
    pub fn with_structural_analyzers(config: &EngineConfig) -> Self {
        let mut engine = Self::new();
        engine.register_analyzer(Box::new(CycleAnalyzer::from_config(config)));
        engine.register_analyzer(Box::new(OrphanAnalyzer::from_config(config)));
        engine.register_analyzer(Box::new(CouplingAnalyzer::from_config(config)));
        engine
    }

    pub fn register(&mut self, detector: Arc<dyn Detector>) {
        self.detectors.push(detector);
    }

    pub fn register_all(&mut self, detectors: impl IntoIterator<Item = Arc<dyn Detector>>) {
        for d in detectors {
            self.register(d);
        }
    }

    pub fn register_analyzer(&mut self, analyzer: Box<dyn GraphAnalyzer>) {
        self.analyzers.push(analyzer);
    }

    pub fn detector_count(&self) -> usize {
        self.detectors.len() + self.analyzers.len()
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors
            .iter()
            .map(|d| d.name())
            .chain(self.analyzers.iter().map(|a| a.name()))
            .collect()
    }

    /// Run every enabled detector, then every enabled analyzer.
    pub fn run(
        &self,
        scope: &ScanScope,
        graph: &DependencyGraph,
        config: &EngineConfig,
    ) -> DetectionOutcome {
        let start = Instant::now();
        let mut outcome = DetectionOutcome::default();

        for detector in &self.detectors {
            if !config.is_detector_enabled(detector.name()) {
                debug!("Skipping disabled detector {}", detector.name());
                continue;
            }
            let t = Instant::now();
            let result = match detector.detect(scope, config) {
                Ok(records) => DetectorResult::success(
                    detector.name().to_string(),
                    records,
                    t.elapsed().as_millis() as u64,
                ),
                Err(e) => {
                    warn!("Detector {} failed: {:#}", detector.name(), e);
                    DetectorResult::failure(
                        detector.name().to_string(),
                        format!("{:#}", e),
                        t.elapsed().as_millis() as u64,
                    )
                }
            };
            outcome.summary.add_result(&result);
            outcome.records.extend(result.records.iter().cloned());
            outcome.results.push(result);
        }

        for analyzer in &self.analyzers {
            if !config.is_detector_enabled(analyzer.name()) {
                debug!("Skipping disabled analyzer {}", analyzer.name());
                continue;
            }
            let t = Instant::now();
            let records = analyzer.analyze(graph);
            let result = DetectorResult::success(
                analyzer.name().to_string(),
                records,
                t.elapsed().as_millis() as u64,
            );
            outcome.summary.add_result(&result);
            outcome.records.extend(result.records.iter().cloned());
            outcome.results.push(result);
        }

        info!(
            "Detection for {} finished: {} records from {} detectors ({} failed) in {}ms",
            scope.language,
            outcome.summary.total_records,
            outcome.summary.detectors_run,
            outcome.summary.detectors_failed,
            start.elapsed().as_millis()
        );
        outcome
    }
}
