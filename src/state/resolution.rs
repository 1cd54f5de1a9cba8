//! Explicit resolution API
//!
//! Everything that changes a finding's status outside of a scan goes
//! through here: manual resolve/reopen, suspect confirmation, and the
//! planner's done markers.
//!
//! Patterns resolve to findings in this order, first non-empty wins:
//!
//! ```text
//! exact id            3f9a0c1d2e4b5a67
//! id prefix (6+ hex)  3f9a0c
//! detector::path      unused::src/app.py, unused::src/*.py
//! file glob           src/**/*.py
//! detector            unused
//! file or directory   src/app.py, src/
//! ```

use crate::config::{build_glob_set, EngineConfig};
use crate::error::{EngineError, EngineResult};
use crate::models::{
    normalize_path, path_in_scope, Finding, FindingOrigin, Resolution, ResolutionKind, Status,
};
use crate::state::{Assessment, StateDocument};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

fn is_glob(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?') || pattern.contains('[')
}

fn path_matches(pattern: &str, file: &str) -> bool {
    if is_glob(pattern) {
        build_glob_set(&[pattern.to_string()])
            .map(|set| set.is_match(file))
            .unwrap_or(false)
    } else {
        path_in_scope(file, pattern)
    }
}

fn select(doc: &StateDocument, pred: impl Fn(&Finding) -> bool) -> Vec<String> {
    doc.findings
        .values()
        .filter(|f| pred(f))
        .map(|f| f.id.clone())
        .collect()
}

/// Ids of the findings `pattern` refers to, sorted
pub fn match_findings(doc: &StateDocument, pattern: &str) -> Vec<String> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Vec::new();
    }

    if doc.findings.contains_key(pattern) {
        return vec![pattern.to_string()];
    }

    if pattern.len() >= 6 && pattern.chars().all(|c| c.is_ascii_hexdigit()) {
        let lowered = pattern.to_ascii_lowercase();
        let ids: Vec<String> = doc
            .findings
            .keys()
            .filter(|id| id.starts_with(&lowered))
            .cloned()
            .collect();
        if !ids.is_empty() {
            return ids;
        }
    }

    if let Some((detector, path)) = pattern.split_once("::") {
        return select(doc, |f| f.detector == detector && path_matches(path, &f.file));
    }

    if is_glob(pattern) {
        return select(doc, |f| path_matches(pattern, &f.file));
    }

    let by_detector = select(doc, |f| f.detector == pattern);
    if !by_detector.is_empty() {
        return by_detector;
    }

    let path = normalize_path(pattern);
    if path == "." {
        return Vec::new();
    }
    select(doc, |f| path_in_scope(&f.file, &path))
}

/// A manual status change
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub pattern: String,
    pub status: Status,
    pub note: Option<String>,
    pub attestation: Option<String>,
    /// When set, every matched finding must lie within this path
    pub scope: Option<String>,
}

impl ResolveRequest {
    pub fn new(pattern: impl Into<String>, status: Status) -> Self {
        Self {
            pattern: pattern.into(),
            status,
            note: None,
            attestation: None,
            scope: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_attestation(mut self, attestation: impl Into<String>) -> Self {
        self.attestation = Some(attestation.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolveOutcome {
    pub resolved: Vec<String>,
    /// Matched, but already in the requested status
    pub unchanged: Vec<String>,
    /// Matched and resolved as fixed with an attestation that satisfied policy
    pub attested: Vec<String>,
}

/// Apply a manual status change to every finding `request.pattern` matches.
///
/// Nothing changes unless every check passes.
pub fn resolve_findings(
    doc: &mut StateDocument,
    request: &ResolveRequest,
    config: &EngineConfig,
) -> EngineResult<ResolveOutcome> {
    if request.status == Status::Open {
        return Err(EngineError::InvalidCommand(
            "use reopen to move findings back to open".to_string(),
        ));
    }
    let note = request.note.as_deref().map(str::trim).filter(|n| !n.is_empty());
    if matches!(request.status, Status::Fixed | Status::Wontfix) && note.is_none() {
        return Err(EngineError::InvalidCommand(format!(
            "resolving as {} requires a note",
            request.status
        )));
    }

    let ids = match_findings(doc, &request.pattern);
    if ids.is_empty() {
        return Err(EngineError::InvalidCommand(format!(
            "no findings match '{}'",
            request.pattern
        )));
    }

    if let Some(scope) = request.scope.as_deref() {
        let outside: Vec<String> = ids
            .iter()
            .filter(|id| {
                doc.findings
                    .get(id.as_str())
                    .map(|f| !path_in_scope(&f.file, scope))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        if !outside.is_empty() {
            return Err(EngineError::ScopeViolation {
                scope: normalize_path(scope),
                ids: outside,
            });
        }
    }

    let outcome = apply_resolution(
        doc,
        &ids,
        request.status,
        ResolutionKind::Manual,
        note,
        request.attestation.as_deref(),
        config,
    );
    info!(
        "Resolved {} findings as {} ({} unchanged, {} attested)",
        outcome.resolved.len(),
        request.status,
        outcome.unchanged.len(),
        outcome.attested.len()
    );
    Ok(outcome)
}

/// Set `status` on `ids`. Callers have already validated the request.
pub(crate) fn apply_resolution(
    doc: &mut StateDocument,
    ids: &[String],
    status: Status,
    kind: ResolutionKind,
    note: Option<&str>,
    attestation: Option<&str>,
    config: &EngineConfig,
) -> ResolveOutcome {
    let now = Utc::now();
    let attested = status == Status::Fixed && config.attestation.is_valid(attestation);
    if status == Status::Fixed && attestation.is_some() && !attested {
        warn!("Attestation does not contain the required phrases; resolution is unverified");
    }

    let mut outcome = ResolveOutcome::default();
    let mut reset_dimensions = Vec::new();
    for id in ids {
        let Some(finding) = doc.findings.get_mut(id) else {
            continue;
        };
        if finding.status == status {
            outcome.unchanged.push(id.clone());
            continue;
        }
        finding.status = status;
        finding.suspect = None;
        if let Some(note) = note {
            finding.note = Some(note.to_string());
        }
        finding.resolution = Some(Resolution {
            kind,
            note: note.map(str::to_string),
            attestation: attestation.map(str::to_string),
            attested,
            scan_id: None,
            resolved_at: now,
        });
        if status == Status::Fixed && finding.origin == FindingOrigin::Review {
            reset_dimensions.push(finding.detector.clone());
        }
        if attested {
            outcome.attested.push(id.clone());
        }
        outcome.resolved.push(id.clone());
    }

    for dimension in reset_dimensions {
        info!("Review finding in '{}' fixed; assessment reset pending re-review", dimension);
        let entry = doc.assessments.entry(dimension).or_insert_with(|| Assessment {
            score: 0.0,
            needs_refresh: true,
            assessed_at: now,
            source: None,
        });
        entry.score = 0.0;
        entry.needs_refresh = true;
    }
    outcome
}

/// Move matching non-open findings back to open.
pub fn reopen_findings(
    doc: &mut StateDocument,
    pattern: &str,
    note: Option<&str>,
) -> EngineResult<Vec<String>> {
    let ids = match_findings(doc, pattern);
    if ids.is_empty() {
        return Err(EngineError::InvalidCommand(format!(
            "no findings match '{}'",
            pattern
        )));
    }
    let mut reopened = Vec::new();
    for id in ids {
        let Some(finding) = doc.findings.get_mut(&id) else {
            continue;
        };
        if finding.is_open() {
            continue;
        }
        let previous = finding.status;
        finding.status = Status::Open;
        finding.resolution = None;
        finding.reopen_count += 1;
        finding.note = Some(match note {
            Some(n) => format!("Reopened from {}: {}", previous, n),
            None => format!("Reopened from {}", previous),
        });
        doc.plan.done.remove(&id);
        reopened.push(id);
    }
    info!("Reopened {} findings", reopened.len());
    Ok(reopened)
}

/// What to do with findings held by the suspect guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspectDecision {
    /// The drop was real: resolve the held findings
    Resolve,
    /// The detector is fine and the findings still stand: lift the hold
    Release,
}

/// Settle suspect holds, optionally for one detector only.
pub fn confirm_suspects(
    doc: &mut StateDocument,
    detector: Option<&str>,
    decision: SuspectDecision,
) -> Vec<String> {
    let now = Utc::now();
    let mut settled = Vec::new();
    let mut cleared_counters = Vec::new();
    for finding in doc.findings.values_mut() {
        if !finding.is_suspect() || detector.is_some_and(|d| d != finding.detector) {
            continue;
        }
        let Some(hold) = finding.suspect.take() else {
            continue;
        };
        if decision == SuspectDecision::Resolve {
            finding.status = Status::Fixed;
            finding.resolution = Some(Resolution {
                kind: ResolutionKind::Auto,
                note: Some("suspect drop confirmed".to_string()),
                attestation: None,
                attested: true,
                scan_id: Some(hold.scan_id.clone()),
                resolved_at: now,
            });
            cleared_counters.push((finding.detector.clone(), hold.scan_path.clone()));
        }
        settled.push(finding.id.clone());
    }
    for (detector, scan_path) in cleared_counters {
        if let Some(by_path) = doc.detector_counts.get_mut(&detector) {
            by_path.insert(scan_path, 0);
        }
    }
    info!("Settled {} suspect findings ({:?})", settled.len(), decision);
    settled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::merge::{merge_scan, MergeOptions};
    use crate::state::test_support::{records, run};

    fn seeded() -> StateDocument {
        let mut all = records("unused", "src", 2);
        all.extend(records("smells", "lib", 2));
        let mut doc = StateDocument::new("python");
        merge_scan(&mut doc, &run(".", &all), &MergeOptions::default(), &EngineConfig::default())
            .unwrap();
        doc
    }

    fn first_id(doc: &StateDocument) -> String {
        doc.findings().next().unwrap().id.clone()
    }

    #[test]
    fn test_match_forms() {
        let doc = seeded();
        let id = first_id(&doc);
        assert_eq!(match_findings(&doc, &id), vec![id.clone()]);
        assert!(match_findings(&doc, &id[..8]).contains(&id));
        assert_eq!(match_findings(&doc, "unused").len(), 2);
        assert_eq!(match_findings(&doc, "lib/").len(), 2);
        assert_eq!(match_findings(&doc, "src/f0.py").len(), 1);
        assert_eq!(match_findings(&doc, "**/f1.py").len(), 2);
        assert_eq!(match_findings(&doc, "smells::lib/*.py").len(), 2);
        assert!(match_findings(&doc, "nothing").is_empty());
        assert!(match_findings(&doc, ".").is_empty());
    }

    #[test]
    fn test_resolve_requires_note() {
        let mut doc = seeded();
        let err = resolve_findings(
            &mut doc,
            &ResolveRequest::new("unused", Status::Wontfix),
            &EngineConfig::default(),
        );
        assert!(matches!(err, Err(EngineError::InvalidCommand(_))));
        assert_eq!(doc.open_findings().count(), 4);
    }

    #[test]
    fn test_resolve_with_attestation() {
        let mut doc = seeded();
        let outcome = resolve_findings(
            &mut doc,
            &ResolveRequest::new("unused", Status::Fixed)
                .with_note("removed imports")
                .with_attestation("I have actually removed them, not gaming the score"),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(outcome.resolved.len(), 2);
        assert_eq!(outcome.attested.len(), 2);
        let fixed: Vec<&Finding> = doc.findings().filter(|f| f.status == Status::Fixed).collect();
        assert!(fixed.iter().all(|f| {
            let r = f.resolution.as_ref().unwrap();
            r.kind == ResolutionKind::Manual && r.attested
        }));
    }

    #[test]
    fn test_resolve_without_valid_attestation_is_unverified() {
        let mut doc = seeded();
        let outcome = resolve_findings(
            &mut doc,
            &ResolveRequest::new("unused", Status::Fixed)
                .with_note("done")
                .with_attestation("trust me"),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(outcome.resolved.len(), 2);
        assert!(outcome.attested.is_empty());
    }

    #[test]
    fn test_scope_violation_changes_nothing() {
        let mut doc = seeded();
        let before = doc.clone();
        let err = resolve_findings(
            &mut doc,
            &ResolveRequest::new("**/*.py", Status::FalsePositive).with_scope("src"),
            &EngineConfig::default(),
        );
        match err {
            Err(EngineError::ScopeViolation { scope, ids }) => {
                assert_eq!(scope, "src");
                assert_eq!(ids.len(), 2);
            }
            other => panic!("expected scope violation, got {:?}", other),
        }
        assert_eq!(doc, before);
    }

    #[test]
    fn test_reopen() {
        let mut doc = seeded();
        resolve_findings(
            &mut doc,
            &ResolveRequest::new("smells", Status::FalsePositive),
            &EngineConfig::default(),
        )
        .unwrap();
        let reopened = reopen_findings(&mut doc, "smells", Some("detector was right")).unwrap();
        assert_eq!(reopened.len(), 2);
        for id in &reopened {
            let f = doc.finding(id).unwrap();
            assert!(f.is_open());
            assert_eq!(f.reopen_count, 1);
        }
    }

    #[test]
    fn test_confirm_suspects() {
        let mut doc = StateDocument::new("python");
        let config = EngineConfig::default();
        merge_scan(&mut doc, &run(".", &records("smells", "src", 6)), &MergeOptions::default(), &config)
            .unwrap();
        merge_scan(&mut doc, &run(".", &[]), &MergeOptions::default(), &config).unwrap();
        assert_eq!(doc.findings().filter(|f| f.is_suspect()).count(), 6);

        assert!(confirm_suspects(&mut doc, Some("unused"), SuspectDecision::Resolve).is_empty());
        let settled = confirm_suspects(&mut doc, Some("smells"), SuspectDecision::Resolve);
        assert_eq!(settled.len(), 6);
        assert!(doc.findings().all(|f| f.status == Status::Fixed));
        assert_eq!(doc.detector_count("smells", "."), Some(0));
    }

    #[test]
    fn test_release_suspects_keeps_findings_open() {
        let mut doc = StateDocument::new("python");
        let config = EngineConfig::default();
        merge_scan(&mut doc, &run(".", &records("smells", "src", 5)), &MergeOptions::default(), &config)
            .unwrap();
        merge_scan(&mut doc, &run(".", &[]), &MergeOptions::default(), &config).unwrap();
        let settled = confirm_suspects(&mut doc, None, SuspectDecision::Release);
        assert_eq!(settled.len(), 5);
        assert!(doc.findings().all(|f| f.is_open() && !f.is_suspect()));
    }
}
