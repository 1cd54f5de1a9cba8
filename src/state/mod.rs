//! Persisted finding ledger
//!
//! One [`StateDocument`] per language holds every finding ever observed,
//! keyed by id, plus the bookkeeping the merge engine, scorer and planner
//! need:
//!
//! - per (detector, scan path) open counts for the suspect guard
//! - sticky zone overrides and ignore rules
//! - subjective assessments per review dimension
//! - plan metadata (pins, skips, clusters, focus, done markers)
//!
//! Fields are crate-private. Callers read through accessors and change the
//! document only through the operations in [`merge`], [`resolution`],
//! [`overrides`], [`crate::plan`] and [`crate::review`], usually inside
//! [`StateStore::update`].

pub mod merge;
pub mod overrides;
pub mod resolution;
pub mod store;

pub use merge::{merge_scan, MergeOptions, MergeReport, SuspectWarning};
pub use overrides::{add_ignore_rule, clear_zone_override, remove_ignore_rule, set_zone_override};
pub use resolution::{
    confirm_suspects, match_findings, reopen_findings, resolve_findings, ResolveOutcome,
    ResolveRequest, SuspectDecision,
};
pub use store::StateStore;

use crate::models::{normalize_path, Finding, ZoneCategory};
use crate::plan::PlanState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bump when the on-disk layout changes incompatibly
pub const STATE_VERSION: u32 = 1;

/// Scan records kept in the document
pub const MAX_SCAN_HISTORY: usize = 20;

/// One merged scan, for history and idempotence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub scan_id: String,
    pub scan_path: String,
    pub scanned_at: DateTime<Utc>,
    pub new: usize,
    pub reopened: usize,
    pub auto_resolved: usize,
    pub held: usize,
    pub open_after: usize,
}

/// Subjective score for one review dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    /// 0-100
    pub score: f64,
    /// Set when a finding of this dimension was fixed since the last review
    #[serde(default)]
    pub needs_refresh: bool,
    pub assessed_at: DateTime<Utc>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Persistent ignore rule; new findings matching it start as `ignored`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IgnoreRule {
    pub pattern: String,
    pub note: String,
    pub added_at: DateTime<Utc>,
}

/// The per-language ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    pub(crate) version: u32,
    pub(crate) language: String,
    pub(crate) created_at: DateTime<Utc>,
    #[serde(default)]
    pub(crate) scan_count: u32,
    #[serde(default)]
    pub(crate) scan_history: Vec<ScanRecord>,
    #[serde(default)]
    pub(crate) findings: BTreeMap<String, Finding>,
    /// detector -> scan path -> open count at the last merge
    #[serde(default)]
    pub(crate) detector_counts: BTreeMap<String, BTreeMap<String, usize>>,
    #[serde(default)]
    pub(crate) zone_overrides: BTreeMap<String, ZoneCategory>,
    #[serde(default)]
    pub(crate) ignore_rules: Vec<IgnoreRule>,
    #[serde(default)]
    pub(crate) assessments: BTreeMap<String, Assessment>,
    #[serde(default)]
    pub(crate) plan: PlanState,
}

impl StateDocument {
    pub fn new(language: &str) -> Self {
        Self {
            version: STATE_VERSION,
            language: language.to_string(),
            created_at: Utc::now(),
            scan_count: 0,
            scan_history: Vec::new(),
            findings: BTreeMap::new(),
            detector_counts: BTreeMap::new(),
            zone_overrides: BTreeMap::new(),
            ignore_rules: Vec::new(),
            assessments: BTreeMap::new(),
            plan: PlanState::default(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn scan_count(&self) -> u32 {
        self.scan_count
    }

    pub fn scan_history(&self) -> &[ScanRecord] {
        &self.scan_history
    }

    pub fn last_scan(&self) -> Option<&ScanRecord> {
        self.scan_history.last()
    }

    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.values()
    }

    pub fn finding(&self, id: &str) -> Option<&Finding> {
        self.findings.get(id)
    }

    pub fn finding_count(&self) -> usize {
        self.findings.len()
    }

    /// Open findings, suspect-held ones included
    pub fn open_findings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.values().filter(|f| f.is_open())
    }

    /// Suspect guard counter for a detector under a scan path
    pub fn detector_count(&self, detector: &str, scan_path: &str) -> Option<usize> {
        self.detector_counts
            .get(detector)
            .and_then(|by_path| by_path.get(&normalize_path(scan_path)))
            .copied()
    }

    pub fn zone_overrides(&self) -> &BTreeMap<String, ZoneCategory> {
        &self.zone_overrides
    }

    pub fn ignore_rules(&self) -> &[IgnoreRule] {
        &self.ignore_rules
    }

    pub fn assessments(&self) -> &BTreeMap<String, Assessment> {
        &self.assessments
    }

    pub fn assessment(&self, dimension: &str) -> Option<&Assessment> {
        self.assessments.get(dimension)
    }

    pub fn plan(&self) -> &PlanState {
        &self.plan
    }

    /// Open findings reopened at least twice
    pub fn chronic_reopeners(&self) -> Vec<&Finding> {
        self.open_findings().filter(|f| f.reopen_count >= 2).collect()
    }

    pub(crate) fn has_merged(&self, scan_id: &str) -> bool {
        self.scan_history.iter().any(|s| s.scan_id == scan_id)
    }

    pub(crate) fn record_scan(&mut self, record: ScanRecord) {
        self.scan_count += 1;
        self.scan_history.push(record);
        if self.scan_history.len() > MAX_SCAN_HISTORY {
            let excess = self.scan_history.len() - MAX_SCAN_HISTORY;
            self.scan_history.drain(..excess);
        }
    }
}
