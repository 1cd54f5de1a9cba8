//! Base detector traits and types
//!
//! This module defines the contracts through which raw findings reach the
//! engine:
//! - `Detector`: supplied by language plugins, runs against a scan scope
//! - `GraphAnalyzer`: pure structural analysis over a [`DependencyGraph`]
//! - `RawFinding`: the loosely-typed record both produce
//! - `DetectorResult` / `DetectionSummary` for capturing execution results

use crate::config::EngineConfig;
use crate::graph::DependencyGraph;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A raw finding record as produced by a detector or analyzer.
///
/// Every field is optional because collaborators are not trusted to fill
/// them; the normalizer decides which records are usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFinding {
    #[serde(default)]
    pub detector: Option<String>,
    #[serde(default, alias = "path")]
    pub file: Option<String>,
    /// Content-insensitive anchor (symbol name, member list, ...)
    #[serde(default, alias = "name")]
    pub anchor: Option<String>,
    /// Tier hint: `3`, `"3"` or `"T3"`
    #[serde(default)]
    pub tier: Option<serde_json::Value>,
    #[serde(default, alias = "message")]
    pub summary: Option<String>,
    #[serde(default)]
    pub confidence: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub detail: serde_json::Map<String, serde_json::Value>,
}

impl RawFinding {
    pub fn new(detector: &str, file: &str, tier: u8) -> Self {
        Self {
            detector: Some(detector.to_string()),
            file: Some(file.to_string()),
            tier: Some(serde_json::Value::from(tier)),
            ..Default::default()
        }
    }

    pub fn with_anchor(mut self, anchor: impl Into<String>) -> Self {
        self.anchor = Some(anchor.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_confidence(mut self, confidence: &str) -> Self {
        self.confidence = Some(confidence.to_string());
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.detail.insert(key.to_string(), value.into());
        self
    }

    /// Parse an external linter record. Unknown keys are ignored.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

/// Data handed to a detector for one scan invocation
#[derive(Debug, Clone, Default)]
pub struct ScanScope {
    pub language: String,
    /// Project root on disk
    pub root: PathBuf,
    /// Scanned path relative to the root (`.` for the whole project)
    pub scan_path: String,
}

impl ScanScope {
    pub fn new(language: &str, root: impl Into<PathBuf>, scan_path: &str) -> Self {
        Self {
            language: language.to_string(),
            root: root.into(),
            scan_path: crate::models::normalize_path(scan_path),
        }
    }
}

/// Result from running a single detector
#[derive(Debug, Clone)]
pub struct DetectorResult {
    pub detector_name: String,
    pub records: Vec<RawFinding>,
    pub duration_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

impl DetectorResult {
    pub fn success(detector_name: String, records: Vec<RawFinding>, duration_ms: u64) -> Self {
        Self {
            detector_name,
            records,
            duration_ms,
            success: true,
            error: None,
        }
    }

    pub fn failure(detector_name: String, error: String, duration_ms: u64) -> Self {
        Self {
            detector_name,
            records: Vec::new(),
            duration_ms,
            success: false,
            error: Some(error),
        }
    }
}

/// Trait for language-supplied detectors
///
/// ```ignore
/// struct UnusedImports;
///
/// impl Detector for UnusedImports {
///     fn name(&self) -> &'static str {
///         "unused"
///     }
///
///     fn description(&self) -> &'static str {
///         "Imports that are never referenced"
///     }
///
///     fn detect(&self, scope: &ScanScope, config: &EngineConfig) -> Result<Vec<RawFinding>> {
///         Ok(vec![RawFinding::new("unused", "src/app.py", 1).with_anchor("os")])
///     }
/// }
/// ```
pub trait Detector: Send + Sync {
    /// Unique identifier, also the `detector` of the findings it produces
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Run detection and return raw records
    fn detect(&self, scope: &ScanScope, config: &EngineConfig) -> Result<Vec<RawFinding>>;

    /// Used for grouping in reports
    fn category(&self) -> &'static str {
        "code_smell"
    }
}

/// Pure structural analysis over a dependency graph.
///
/// Implementations hold no state between calls and must return identical
/// output for identical graphs.
pub trait GraphAnalyzer: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn analyze(&self, graph: &DependencyGraph) -> Vec<RawFinding>;
}

/// Summary statistics from running all detectors
#[derive(Debug, Clone, Default)]
pub struct DetectionSummary {
    pub detectors_run: usize,
    pub detectors_succeeded: usize,
    pub detectors_failed: usize,
    pub total_records: usize,
    pub by_detector: BTreeMap<String, usize>,
    pub failed_detectors: Vec<String>,
    pub total_duration_ms: u64,
}

impl DetectionSummary {
    pub fn add_result(&mut self, result: &DetectorResult) {
        self.detectors_run += 1;
        self.total_duration_ms += result.duration_ms;

        if result.success {
            self.detectors_succeeded += 1;
            self.total_records += result.records.len();
            *self
                .by_detector
                .entry(result.detector_name.clone())
                .or_insert(0) += result.records.len();
        } else {
            self.detectors_failed += 1;
            self.failed_detectors.push(result.detector_name.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_finding_builder() {
        let raw = RawFinding::new("cycles", "a.py", 3)
            .with_anchor("a.py, b.py")
            .with_detail("size", 2);
        assert_eq!(raw.detector.as_deref(), Some("cycles"));
        assert_eq!(raw.tier, Some(serde_json::json!(3)));
        assert_eq!(raw.detail["size"], serde_json::json!(2));
    }

    #[test]
    fn test_raw_finding_from_linter_json() {
        let value = serde_json::json!({
            "detector": "unused",
            "path": "src/app.py",
            "name": "os",
            "tier": "T1",
            "message": "unused import os",
            "line": 4,
            "extra": true
        });
        let raw = RawFinding::from_json(&value).unwrap();
        assert_eq!(raw.file.as_deref(), Some("src/app.py"));
        assert_eq!(raw.anchor.as_deref(), Some("os"));
        assert_eq!(raw.summary.as_deref(), Some("unused import os"));
        assert_eq!(raw.line, Some(4));
    }

    #[test]
    fn test_detection_summary() {
        let mut summary = DetectionSummary::default();
        summary.add_result(&DetectorResult::success(
            "unused".to_string(),
            vec![RawFinding::default(), RawFinding::default()],
            10,
        ));
        summary.add_result(&DetectorResult::failure(
            "smells".to_string(),
            "boom".to_string(),
            5,
        ));
        assert_eq!(summary.detectors_run, 2);
        assert_eq!(summary.detectors_failed, 1);
        assert_eq!(summary.total_records, 2);
        assert_eq!(summary.by_detector["unused"], 2);
        assert_eq!(summary.failed_detectors, vec!["smells".to_string()]);
        assert_eq!(summary.total_duration_ms, 15);
    }
}
