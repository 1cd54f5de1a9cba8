//! Scan pipeline
//!
//! Orchestrates one scan from raw detector output to a committed ledger:
//! 1. Look up the language plugin
//! 2. Build the dependency graph from plugin-supplied units and edges
//! 3. Run plugin detectors and the structural analyzers
//! 4. Normalize raw records into findings
//! 5. Under the ledger lock: zone findings, merge, resurface stale skips,
//!    refresh auto clusters
//! 6. Score the committed ledger

pub mod normalize;

pub use normalize::{build_scan_run, NormalizeOutcome, Normalizer};

use crate::classifier::ZoneClassifier;
use crate::config::EngineConfig;
use crate::detectors::{DetectionSummary, DetectorEngine, ScanScope};
use crate::error::{EngineError, EngineResult};
use crate::graph::GraphBuilder;
use crate::lang::LanguageRegistry;
use crate::models::{ScanRun, Zone};
use crate::plan::{auto_cluster, resurface_stale_skips};
use crate::scoring::{HealthScorer, ScoreBundle};
use crate::state::merge::{merge_scan, MergeOptions, MergeReport};
use crate::state::overrides::rezone;
use crate::state::StateStore;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

/// What to scan
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub language: String,
    pub root: PathBuf,
    /// Relative to `root`; `.` scans the whole project
    pub scan_path: String,
    pub options: MergeOptions,
}

impl ScanRequest {
    pub fn new(language: &str, root: impl Into<PathBuf>) -> Self {
        Self {
            language: language.to_string(),
            root: root.into(),
            scan_path: ".".to_string(),
            options: MergeOptions::default(),
        }
    }

    pub fn with_scan_path(mut self, scan_path: &str) -> Self {
        self.scan_path = scan_path.to_string();
        self
    }

    /// Bypass the suspect guard for this scan
    pub fn force_resolve(mut self) -> Self {
        self.options.force_resolve = true;
        self
    }

    pub fn with_exclude(mut self, patterns: Vec<String>) -> Self {
        self.options.exclude = patterns;
        self
    }
}

/// Result of a full scan
#[derive(Debug)]
pub struct ScanOutcome {
    pub scan_id: String,
    pub detection: DetectionSummary,
    /// Raw records the normalizer rejected
    pub malformed: Vec<EngineError>,
    pub duplicates: usize,
    pub merge: MergeReport,
    pub resurfaced: Vec<String>,
    pub auto_clusters: Vec<String>,
    pub scores: ScoreBundle,
    pub duration_ms: u64,
}

/// Full scan pipeline.
pub struct ScanPipeline<'a> {
    registry: &'a LanguageRegistry,
    config: &'a EngineConfig,
}

impl<'a> ScanPipeline<'a> {
    pub fn new(registry: &'a LanguageRegistry, config: &'a EngineConfig) -> Self {
        Self { registry, config }
    }

    /// Run one scan and commit it to `store`.
    pub fn run(&self, store: &mut StateStore, request: &ScanRequest) -> EngineResult<ScanOutcome> {
        let start = Instant::now();
        let config = self.config;
        let plugin = self.registry.get(&request.language)?;
        if store.language() != request.language {
            return Err(EngineError::InvalidCommand(format!(
                "ledger for '{}' cannot take a '{}' scan",
                store.language(),
                request.language
            )));
        }

        let scope = ScanScope::new(&request.language, request.root.clone(), &request.scan_path);
        let classifier = ZoneClassifier::from_config(config, &plugin.zone_rules())?;

        // Graph analyzers treat a failed edge supplier as an empty graph.
        // Their findings then vanish, which the suspect guard catches.
        let edges = plugin.dependency_edges(&scope).unwrap_or_else(|e| {
            warn!("Dependency edges for {} unavailable: {:#}", scope.language, e);
            Vec::new()
        });
        let units = plugin.source_units(&scope).unwrap_or_else(|e| {
            warn!("Source units for {} unavailable: {:#}", scope.language, e);
            Vec::new()
        });
        let overrides = store.document().zone_overrides().clone();
        let mut builder = GraphBuilder::new()
            .edges(edges)
            .entry_points(plugin.entry_points(&scope))
            .with_production_filter(|path| {
                classifier.classify(path, &overrides).zone() == Zone::Scored
            });
        for unit in &units {
            builder.add_node(unit);
        }
        let graph = builder.build();

        let mut engine = DetectorEngine::with_structural_analyzers(config);
        engine.register_all(plugin.detectors());
        let detection = engine.run(&scope, &graph, config);

        let mut run = ScanRun::new(&request.language, &scope.scan_path, Vec::new());
        let normalized = Normalizer::for_run(&run).normalize(&detection.records);
        run.findings = normalized.findings;

        let (merge, resurfaced, auto_clusters) = store.update(|doc| {
            for finding in run.findings.iter_mut() {
                classifier.apply(finding, doc.zone_overrides());
            }
            rezone(doc, &classifier);
            let report = merge_scan(doc, &run, &request.options, config)?;
            let resurfaced = resurface_stale_skips(doc);
            let clusters = if config.planner.auto_cluster_min > 0 {
                auto_cluster(doc, config.planner.auto_cluster_min)
            } else {
                Vec::new()
            };
            Ok((report, resurfaced, clusters))
        })?;

        let scores = HealthScorer::new(config).score(store.document());
        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Scan {} of {} ({}) done in {}ms: score {:.1} ({}), strict {:.1}",
            run.id,
            request.language,
            run.scan_path,
            duration_ms,
            scores.overall,
            scores.grade,
            scores.strict
        );

        Ok(ScanOutcome {
            scan_id: run.id,
            detection: detection.summary,
            malformed: normalized.malformed,
            duplicates: normalized.duplicates,
            merge,
            resurfaced,
            auto_clusters,
            scores,
            duration_ms,
        })
    }
}
