//! Merge engine
//!
//! Reconciles a fresh [`ScanRun`] against the ledger for its language.
//!
//! # Algorithm
//!
//! ```text
//! 1. Scope      only findings whose file lies within the run's scan path
//!               are eligible for auto-resolution
//! 2. Match      fresh ids that already exist: refresh last_seen, release a
//!               suspect hold, reopen if it had been fixed
//! 3. Create     unknown ids start open (or ignored, if an ignore rule hits)
//! 4. Resolve    eligible open mechanical findings the run no longer
//!               reports become fixed, unless the suspect guard holds them
//! 5. Terminal   wontfix / false_positive / ignored are never touched
//! ```
//!
//! # Suspect guard
//!
//! For every (detector, scan path) the document keeps the open count seen at
//! the previous merge, capped at what is still open in scope. If that prior
//! count is at or above the configured threshold and the run reports nothing
//! for the detector, the drop is
//! treated as a broken detector rather than a mass fix: its findings are
//! held open with a [`SuspectHold`], a [`SuspectWarning`] is returned, and
//! the stored count is left alone so the next empty run trips again.
//! `MergeOptions::force_resolve` bypasses the guard for one pass.
//!
//! Merging the same run twice is a no-op the second time: every timestamp
//! written comes from the run itself, and scan bookkeeping is keyed by the
//! run id.

use crate::config::{build_glob_set, EngineConfig};
use crate::error::{EngineError, EngineResult};
use crate::models::{
    path_in_scope, Finding, ResolutionKind, Resolution, ScanRun, Status, SuspectHold,
};
use crate::state::overrides::matching_ignore_rule;
use crate::state::{ScanRecord, StateDocument};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Per-merge switches
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Bypass the suspect guard for this pass
    pub force_resolve: bool,
    /// Extra globs whose findings are never auto-resolved
    pub exclude: Vec<String>,
}

/// Surfaced when the suspect guard holds a detector's findings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuspectWarning {
    pub detector: String,
    pub scan_path: String,
    pub prior_count: usize,
    pub threshold: usize,
    pub held: usize,
}

impl std::fmt::Display for SuspectWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "detector '{}' dropped from {} open findings to 0 under '{}' (threshold {}); {} held as suspect",
            self.detector, self.prior_count, self.scan_path, self.threshold, self.held
        )
    }
}

/// What a merge pass changed
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    pub scan_id: String,
    pub scan_path: String,
    /// The run had been merged before; nothing changed
    pub already_merged: bool,
    pub new: Vec<String>,
    pub new_ignored: Vec<String>,
    pub reopened: Vec<String>,
    pub auto_resolved: Vec<String>,
    pub held: Vec<String>,
    pub released: Vec<String>,
    /// Open findings left alone because they lie outside the scan path
    pub out_of_scope: usize,
    /// Eligible findings left alone because of exclude patterns
    pub excluded: usize,
    pub suspect_warnings: Vec<SuspectWarning>,
    pub chronic_reopeners: Vec<String>,
}

impl MergeReport {
    pub fn has_suspects(&self) -> bool {
        !self.suspect_warnings.is_empty()
    }
}

/// Reconcile `run` into `doc`.
pub fn merge_scan(
    doc: &mut StateDocument,
    run: &ScanRun,
    options: &MergeOptions,
    config: &EngineConfig,
) -> EngineResult<MergeReport> {
    if run.language != doc.language {
        return Err(EngineError::InvalidCommand(format!(
            "scan for '{}' cannot be merged into the '{}' ledger",
            run.language, doc.language
        )));
    }

    let scope = run.scan_path.as_str();
    let threshold = config.suspect_guard.threshold;
    let mut report = MergeReport {
        scan_id: run.id.clone(),
        scan_path: scope.to_string(),
        already_merged: doc.has_merged(&run.id),
        ..Default::default()
    };

    let mut exclude_patterns = config.exclude.paths.clone();
    exclude_patterns.extend(options.exclude.iter().cloned());
    let exclude = build_glob_set(&exclude_patterns)
        .map_err(|e| EngineError::Config(format!("exclude patterns: {}", e)))?;

    // Fresh findings by id, same language only.
    let mut fresh: BTreeMap<&str, &Finding> = BTreeMap::new();
    for f in &run.findings {
        if f.language != doc.language {
            warn!("Ignoring fresh finding {} for language {}", f.id, f.language);
            continue;
        }
        fresh.insert(f.id.as_str(), f);
    }
    let mut fresh_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for f in fresh.values() {
        *fresh_counts.entry(f.detector.as_str()).or_insert(0) += 1;
    }

    // A finding is in scope by where it lives, not by which scan found it.
    let eligible = |f: &Finding| f.is_mechanical() && path_in_scope(&f.file, scope);

    // Suspect guard: prior counts per detector in this scope.
    let mut live_counts: BTreeMap<String, usize> = BTreeMap::new();
    for f in doc.findings.values() {
        if f.is_open() && eligible(f) {
            *live_counts.entry(f.detector.clone()).or_insert(0) += 1;
        }
    }
    let mut detectors: BTreeSet<String> = live_counts.keys().cloned().collect();
    detectors.extend(fresh_counts.keys().map(|d| d.to_string()));
    for (detector, by_path) in &doc.detector_counts {
        if by_path.contains_key(scope) {
            detectors.insert(detector.clone());
        }
    }

    let mut suspects: BTreeMap<String, usize> = BTreeMap::new();
    for detector in &detectors {
        // Never more than what is still open here to hold.
        let live = live_counts.get(detector).copied().unwrap_or(0);
        let prior = doc.detector_count(detector, scope).unwrap_or(live).min(live);
        let fresh_count = fresh_counts.get(detector.as_str()).copied().unwrap_or(0);
        if prior > 0 && prior >= threshold && fresh_count == 0 {
            if options.force_resolve {
                info!(
                    "Suspect guard bypassed for '{}' ({} -> 0 under '{}')",
                    detector, prior, scope
                );
            } else {
                suspects.insert(detector.clone(), prior);
            }
        }
    }

    // Matches and new findings.
    for (id, incoming) in &fresh {
        match doc.findings.get_mut(*id) {
            Some(existing) => {
                refresh(existing, incoming);
                if existing.suspect.take().is_some() {
                    report.released.push(id.to_string());
                }
                if existing.status == Status::Fixed && !doc.plan.done.contains_key(*id) {
                    let was = existing
                        .resolution
                        .as_ref()
                        .map(|r| r.kind)
                        .unwrap_or(ResolutionKind::Manual);
                    existing.status = Status::Open;
                    existing.resolution = None;
                    existing.reopen_count += 1;
                    existing.note = Some(format!(
                        "Reopened by scan {}: reported again after {} resolution",
                        run.id,
                        match was {
                            ResolutionKind::Auto => "auto",
                            ResolutionKind::Manual => "manual",
                            ResolutionKind::Done => "done",
                        }
                    ));
                    report.reopened.push(id.to_string());
                }
            }
            None => {
                let mut created = (*incoming).clone();
                created.status = Status::Open;
                created.suspect = None;
                created.resolution = None;
                created.reopen_count = 0;
                if let Some(rule) = matching_ignore_rule(&doc.ignore_rules, &created) {
                    created.status = Status::Ignored;
                    created.note = Some(format!("Matched ignore rule '{}': {}", rule.pattern, rule.note));
                    report.new_ignored.push(id.to_string());
                } else {
                    report.new.push(id.to_string());
                }
                doc.findings.insert(id.to_string(), created);
            }
        }
    }

    // Disappeared findings.
    let mut held_per_detector: BTreeMap<String, usize> = BTreeMap::new();
    for (id, f) in doc.findings.iter_mut() {
        if !f.is_open() || !f.is_mechanical() || fresh.contains_key(id.as_str()) {
            continue;
        }
        if !eligible(f) {
            report.out_of_scope += 1;
            continue;
        }
        if exclude.is_match(&f.file) {
            report.excluded += 1;
            continue;
        }
        if let Some(&prior) = suspects.get(&f.detector) {
            if f.suspect.is_none() {
                f.suspect = Some(SuspectHold {
                    scan_id: run.id.clone(),
                    scan_path: scope.to_string(),
                    prior_count: prior,
                    threshold,
                    held_at: run.started_at,
                });
            }
            *held_per_detector.entry(f.detector.clone()).or_insert(0) += 1;
            report.held.push(id.clone());
            continue;
        }
        f.status = Status::Fixed;
        f.suspect = None;
        f.resolution = Some(Resolution {
            kind: ResolutionKind::Auto,
            note: None,
            attestation: None,
            attested: true,
            scan_id: Some(run.id.clone()),
            resolved_at: run.started_at,
        });
        report.auto_resolved.push(id.clone());
    }

    // A detector whose findings were all excluded held nothing.
    suspects.retain(|detector, _| held_per_detector.contains_key(detector));

    // Guard counters: a tripped detector keeps its prior count.
    for detector in &detectors {
        let count = match suspects.get(detector) {
            Some(&prior) => prior,
            None => fresh_counts.get(detector.as_str()).copied().unwrap_or(0),
        };
        doc.detector_counts
            .entry(detector.clone())
            .or_default()
            .insert(scope.to_string(), count);
    }

    for (detector, &prior) in &suspects {
        let warning = SuspectWarning {
            detector: detector.clone(),
            scan_path: scope.to_string(),
            prior_count: prior,
            threshold,
            held: held_per_detector.get(detector).copied().unwrap_or(0),
        };
        warn!("Suspect regression: {}", warning);
        report.suspect_warnings.push(warning);
    }

    report.chronic_reopeners = doc.chronic_reopeners().iter().map(|f| f.id.clone()).collect();

    if !report.already_merged {
        let open_after = doc.open_findings().count();
        doc.record_scan(ScanRecord {
            scan_id: run.id.clone(),
            scan_path: scope.to_string(),
            scanned_at: run.started_at,
            new: report.new.len(),
            reopened: report.reopened.len(),
            auto_resolved: report.auto_resolved.len(),
            held: report.held.len(),
            open_after,
        });
    } else {
        debug!("Scan {} already merged, bookkeeping unchanged", run.id);
    }

    info!(
        "Merged scan {} ({} under '{}'): {} new, {} reopened, {} auto-resolved, {} held, {} out of scope",
        run.id,
        run.language,
        scope,
        report.new.len(),
        report.reopened.len(),
        report.auto_resolved.len(),
        report.held.len(),
        report.out_of_scope
    );
    Ok(report)
}

/// Copy observation data from a fresh sighting. Identity, status and
/// resolution history stay with the ledger.
fn refresh(existing: &mut Finding, incoming: &Finding) {
    existing.last_seen = incoming.last_seen.clone();
    existing.last_seen_at = incoming.last_seen_at;
    existing.scan_path = incoming.scan_path.clone();
    existing.tier = incoming.tier;
    existing.confidence = incoming.confidence;
    existing.summary = incoming.summary.clone();
    existing.detail = incoming.detail.clone();
    existing.line = incoming.line;
    existing.zone = incoming.zone;
    existing.zone_category = incoming.zone_category;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{records, run};

    fn merge(doc: &mut StateDocument, run: &ScanRun) -> MergeReport {
        merge_scan(doc, run, &MergeOptions::default(), &EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_new_findings_are_open() {
        let mut doc = StateDocument::new("python");
        let report = merge(&mut doc, &run(".", &records("unused", "src", 3)));
        assert_eq!(report.new.len(), 3);
        assert_eq!(doc.open_findings().count(), 3);
        assert_eq!(doc.scan_count(), 1);
        assert_eq!(doc.detector_count("unused", "."), Some(3));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut doc = StateDocument::new("python");
        merge(&mut doc, &run(".", &records("unused", "src", 4)));
        let second = run(".", &records("unused", "src", 2));
        merge(&mut doc, &second);
        let snapshot = doc.clone();
        let report = merge(&mut doc, &second);
        assert!(report.already_merged);
        assert_eq!(doc, snapshot);
    }

    #[test]
    fn test_disappeared_findings_auto_resolve() {
        let mut doc = StateDocument::new("python");
        merge(&mut doc, &run(".", &records("unused", "src", 3)));
        let report = merge(&mut doc, &run(".", &records("unused", "src", 1)));
        assert_eq!(report.auto_resolved.len(), 2);
        let fixed: Vec<&Finding> = doc.findings().filter(|f| f.status == Status::Fixed).collect();
        assert_eq!(fixed.len(), 2);
        let resolution = fixed[0].resolution.as_ref().unwrap();
        assert_eq!(resolution.kind, ResolutionKind::Auto);
        assert!(resolution.attested);
    }

    #[test]
    fn test_reappearing_fixed_finding_reopens() {
        let mut doc = StateDocument::new("python");
        let all = records("unused", "src", 2);
        merge(&mut doc, &run(".", &all));
        merge(&mut doc, &run(".", &all[..1]));
        let report = merge(&mut doc, &run(".", &all));
        assert_eq!(report.reopened.len(), 1);
        let reopened = doc.finding(&report.reopened[0]).unwrap();
        assert_eq!(reopened.status, Status::Open);
        assert_eq!(reopened.reopen_count, 1);
        assert!(reopened.resolution.is_none());
    }

    #[test]
    fn test_subdirectory_scan_leaves_other_paths_alone() {
        let mut doc = StateDocument::new("python");
        let mut all = records("unused", "src", 2);
        all.extend(records("unused", "lib", 2));
        merge(&mut doc, &run(".", &all));
        merge(&mut doc, &run("src", &records("unused", "src", 2)));

        let report = merge(&mut doc, &run("src", &[]));
        assert_eq!(report.auto_resolved.len(), 2);
        assert_eq!(report.out_of_scope, 2);
        for f in doc.findings() {
            if f.file.starts_with("lib/") {
                assert_eq!(f.status, Status::Open);
            } else {
                assert_eq!(f.status, Status::Fixed);
            }
        }
    }

    #[test]
    fn test_subdirectory_scan_resolves_findings_from_full_scan() {
        let mut doc = StateDocument::new("python");
        let mut all = records("unused", "src", 2);
        all.extend(records("unused", "lib", 2));
        merge(&mut doc, &run(".", &all));

        let report = merge(&mut doc, &run("src", &[]));
        assert_eq!(report.auto_resolved.len(), 2);
        assert_eq!(report.out_of_scope, 2);
        assert!(doc
            .findings()
            .filter(|f| f.file.starts_with("src/"))
            .all(|f| f.status == Status::Fixed));
        assert!(doc
            .findings()
            .filter(|f| f.file.starts_with("lib/"))
            .all(|f| f.is_open()));
    }

    #[test]
    fn test_guard_counter_follows_manual_resolution() {
        let mut doc = StateDocument::new("python");
        merge(&mut doc, &run(".", &records("smells", "src", 5)));
        for f in doc.findings.values_mut() {
            f.status = Status::Fixed;
        }

        let report = merge(&mut doc, &run(".", &[]));
        assert!(report.suspect_warnings.is_empty());
        assert!(report.held.is_empty());
        assert_eq!(doc.detector_count("smells", "."), Some(0));

        let again = merge(&mut doc, &run(".", &[]));
        assert!(again.suspect_warnings.is_empty());
    }

    #[test]
    fn test_excluded_drop_does_not_warn() {
        let mut doc = StateDocument::new("python");
        merge(&mut doc, &run(".", &records("smells", "gen", 5)));
        let report = merge_scan(
            &mut doc,
            &run(".", &[]),
            &MergeOptions {
                exclude: vec!["gen/".to_string()],
                ..Default::default()
            },
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(report.excluded, 5);
        assert!(report.suspect_warnings.is_empty());
        assert_eq!(doc.detector_count("smells", "."), Some(0));
    }

    #[test]
    fn test_suspect_guard_holds_then_force_resolves() {
        let mut doc = StateDocument::new("python");
        merge(&mut doc, &run(".", &records("smells", "src", 5)));

        let report = merge(&mut doc, &run(".", &[]));
        assert_eq!(report.held.len(), 5);
        assert!(report.auto_resolved.is_empty());
        assert_eq!(report.suspect_warnings.len(), 1);
        assert_eq!(report.suspect_warnings[0].prior_count, 5);
        assert!(doc.findings().all(|f| f.is_suspect()));
        assert_eq!(doc.detector_count("smells", "."), Some(5));

        // Still suspicious on the next empty scan.
        let again = merge(&mut doc, &run(".", &[]));
        assert_eq!(again.held.len(), 5);

        let forced = merge_scan(
            &mut doc,
            &run(".", &[]),
            &MergeOptions {
                force_resolve: true,
                ..Default::default()
            },
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(forced.auto_resolved.len(), 5);
        assert!(doc.findings().all(|f| f.status == Status::Fixed && f.suspect.is_none()));
        assert_eq!(doc.detector_count("smells", "."), Some(0));
    }

    #[test]
    fn test_below_threshold_resolves_normally() {
        let mut doc = StateDocument::new("python");
        merge(&mut doc, &run(".", &records("smells", "src", 4)));
        let report = merge(&mut doc, &run(".", &[]));
        assert_eq!(report.auto_resolved.len(), 4);
        assert!(report.suspect_warnings.is_empty());
    }

    #[test]
    fn test_partial_drop_is_not_suspect() {
        let mut doc = StateDocument::new("python");
        merge(&mut doc, &run(".", &records("smells", "src", 6)));
        let report = merge(&mut doc, &run(".", &records("smells", "src", 1)));
        assert_eq!(report.auto_resolved.len(), 5);
        assert!(report.held.is_empty());
    }

    #[test]
    fn test_held_finding_released_when_reported_again() {
        let mut doc = StateDocument::new("python");
        let all = records("smells", "src", 5);
        merge(&mut doc, &run(".", &all));
        merge(&mut doc, &run(".", &[]));
        let report = merge(&mut doc, &run(".", &all));
        assert_eq!(report.released.len(), 5);
        assert!(report.reopened.is_empty());
        assert!(doc.findings().all(|f| f.is_open() && !f.is_suspect()));
    }

    #[test]
    fn test_exclude_patterns_block_auto_resolution() {
        let mut doc = StateDocument::new("python");
        let mut all = records("unused", "src", 1);
        all.extend(records("unused", "gen", 1));
        merge(&mut doc, &run(".", &all));
        let report = merge_scan(
            &mut doc,
            &run(".", &[]),
            &MergeOptions {
                exclude: vec!["gen/".to_string()],
                ..Default::default()
            },
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(report.auto_resolved.len(), 1);
        assert_eq!(report.excluded, 1);
    }

    #[test]
    fn test_language_mismatch_is_rejected() {
        let mut doc = StateDocument::new("rust");
        let err = merge_scan(
            &mut doc,
            &run(".", &[]),
            &MergeOptions::default(),
            &EngineConfig::default(),
        );
        assert!(matches!(err, Err(EngineError::InvalidCommand(_))));
    }
}
