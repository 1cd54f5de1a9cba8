//! Review payload validation and import
//!
//! Validation is fail-closed: one bad record rejects the whole payload and
//! the ledger is left as it was. `allow_partial` drops bad records instead
//! and reports them.
//!
//! Grounding rules per assessed dimension:
//! - a score below `feedback_threshold` needs same-dimension feedback
//!   (a finding, or a dimension note with evidence)
//! - a score below `finding_threshold` needs a same-dimension finding

use super::{normalize_dimension, DimensionCatalog};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    deterministic_finding_id, normalize_anchor, normalize_path, Confidence, Finding,
    FindingOrigin, Resolution, ResolutionKind, Status, Tier, Zone, ZoneCategory,
};
use crate::state::{Assessment, StateDocument};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};
use uuid::Uuid;

/// A review finding that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewFinding {
    pub dimension: String,
    pub identifier: String,
    pub summary: String,
    pub related_files: Vec<String>,
    pub evidence: Vec<String>,
    pub suggestion: Option<String>,
    pub confidence: Confidence,
}

impl ReviewFinding {
    /// High-confidence review findings are treated as larger refactors
    pub fn tier(&self) -> Tier {
        match self.confidence {
            Confidence::High => Tier::T3,
            Confidence::Medium => Tier::T2,
            Confidence::Low => Tier::T1,
        }
    }
}

/// What survived validation
#[derive(Debug, Clone, Default)]
pub struct ValidatedPayload {
    pub assessments: BTreeMap<String, f64>,
    pub findings: Vec<ReviewFinding>,
    /// Failures of records that were dropped (partial mode only)
    pub dropped: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Dimensions this import may touch; `None` accepts any catalog dimension
    pub expected_dimensions: Option<BTreeSet<String>>,
    pub allow_partial: bool,
    /// Recorded on the assessments, e.g. the batch name
    pub source: Option<String>,
}

impl ImportOptions {
    pub fn expecting<I, S>(dimensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            expected_dimensions: Some(
                dimensions
                    .into_iter()
                    .map(|d| normalize_dimension(d.as_ref()))
                    .collect(),
            ),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub import_id: String,
    pub assessed: Vec<String>,
    pub new: Vec<String>,
    pub updated: Vec<String>,
    pub reopened: Vec<String>,
    /// Open review findings of a re-assessed dimension the payload dropped
    pub auto_resolved: Vec<String>,
    pub dropped: Vec<String>,
}

fn non_empty_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Evidence may be one string or a list of strings
fn evidence_list(value: Option<&Value>) -> Option<Vec<String>> {
    let items: Vec<String> = match value? {
        Value::String(s) => vec![s.trim().to_string()],
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(|s| s.trim().to_string()))
            .collect::<Option<Vec<_>>>()?,
        _ => return None,
    };
    let items: Vec<String> = items.into_iter().filter(|s| !s.is_empty()).collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

struct Checker<'a> {
    catalog: &'a DimensionCatalog,
    expected: Option<&'a BTreeSet<String>>,
}

impl Checker<'_> {
    fn dimension(&self, raw: &str) -> Result<String, String> {
        let dimension = normalize_dimension(raw);
        if dimension.is_empty() {
            return Err("empty dimension".to_string());
        }
        if !self.catalog.contains(&dimension) {
            return Err(format!("unrecognized dimension '{}'", raw));
        }
        if let Some(expected) = self.expected {
            if !expected.contains(&dimension) {
                return Err(format!("dimension '{}' was not requested by this review", dimension));
            }
        }
        Ok(dimension)
    }

    fn finding(&self, index: usize, value: &Value) -> Result<ReviewFinding, String> {
        let fail = |reason: String| format!("findings[{}]: {}", index, reason);
        let obj = value
            .as_object()
            .ok_or_else(|| fail("not an object".to_string()))?;

        let dimension = non_empty_str(obj, "dimension")
            .ok_or_else(|| fail("missing dimension".to_string()))
            .and_then(|d| self.dimension(d).map_err(fail))?;
        let identifier = non_empty_str(obj, "identifier")
            .ok_or_else(|| fail("missing identifier".to_string()))?;
        let summary =
            non_empty_str(obj, "summary").ok_or_else(|| fail("missing summary".to_string()))?;
        let evidence = evidence_list(obj.get("evidence"))
            .ok_or_else(|| fail("evidence must be a non-empty string or list of strings".to_string()))?;

        let related_files = match obj.get("related_files") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().map(normalize_path))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| fail("related_files must be a list of strings".to_string()))?,
            Some(_) => return Err(fail("related_files must be a list of strings".to_string())),
        };

        let confidence = match obj.get("confidence") {
            None | Some(Value::Null) => Confidence::default(),
            Some(Value::String(s)) => Confidence::parse(s)
                .ok_or_else(|| fail(format!("confidence must be high, medium or low, got '{}'", s)))?,
            Some(other) => return Err(fail(format!("invalid confidence {}", other))),
        };

        let suggestion = match obj.get("suggestion") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            Some(_) => return Err(fail("suggestion must be a string".to_string())),
        };

        Ok(ReviewFinding {
            dimension,
            identifier: identifier.to_string(),
            summary: summary.to_string(),
            related_files,
            evidence,
            suggestion,
            confidence,
        })
    }
}

/// Validate a raw payload.
///
/// Returns every failure when `allow_partial` is off and anything failed.
pub fn validate_payload(
    payload: &Value,
    catalog: &DimensionCatalog,
    config: &EngineConfig,
    options: &ImportOptions,
) -> Result<ValidatedPayload, Vec<String>> {
    let Some(root) = payload.as_object() else {
        return Err(vec!["payload must be a JSON object".to_string()]);
    };
    let checker = Checker {
        catalog,
        expected: options.expected_dimensions.as_ref(),
    };
    let mut failures = Vec::new();
    let mut validated = ValidatedPayload::default();

    // Assessments
    match root.get("assessments") {
        None | Some(Value::Null) => {}
        Some(Value::Object(scores)) => {
            for (raw, score) in scores {
                let dimension = match checker.dimension(raw) {
                    Ok(d) => d,
                    Err(e) => {
                        failures.push(format!("assessments: {}", e));
                        continue;
                    }
                };
                match score.as_f64() {
                    Some(s) if (0.0..=100.0).contains(&s) => {
                        validated.assessments.insert(dimension, s);
                    }
                    _ => failures.push(format!(
                        "assessments.{}: score must be a number between 0 and 100, got {}",
                        dimension, score
                    )),
                }
            }
        }
        Some(_) => failures.push("assessments must be an object".to_string()),
    }

    // Findings
    match root.get("findings") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for (index, item) in items.iter().enumerate() {
                match checker.finding(index, item) {
                    Ok(f) => validated.findings.push(f),
                    Err(e) => failures.push(e),
                }
            }
        }
        Some(_) => failures.push("findings must be a list".to_string()),
    }

    // Dimension notes only matter as feedback evidence
    let mut noted: BTreeSet<String> = BTreeSet::new();
    match root.get("dimension_notes") {
        None | Some(Value::Null) => {}
        Some(Value::Object(notes)) => {
            for (raw, note) in notes {
                match checker.dimension(raw) {
                    Ok(d) => {
                        if evidence_list(note.get("evidence")).is_some() {
                            noted.insert(d);
                        }
                    }
                    Err(e) => failures.push(format!("dimension_notes: {}", e)),
                }
            }
        }
        Some(_) => failures.push("dimension_notes must be an object".to_string()),
    }

    // Grounding
    let with_findings: BTreeSet<&str> = validated
        .findings
        .iter()
        .map(|f| f.dimension.as_str())
        .collect();
    let mut ungrounded = Vec::new();
    for (dimension, &score) in &validated.assessments {
        let has_finding = with_findings.contains(dimension.as_str());
        if score < config.review.finding_threshold && !has_finding {
            ungrounded.push((
                dimension.clone(),
                format!(
                    "assessments.{}: score {} is below {} but no finding backs it",
                    dimension, score, config.review.finding_threshold
                ),
            ));
        } else if score < config.review.feedback_threshold && !has_finding && !noted.contains(dimension) {
            ungrounded.push((
                dimension.clone(),
                format!(
                    "assessments.{}: score {} is below {} but has no finding or note evidence",
                    dimension, score, config.review.feedback_threshold
                ),
            ));
        }
    }
    for (dimension, failure) in ungrounded {
        validated.assessments.remove(&dimension);
        failures.push(failure);
    }

    if failures.is_empty() {
        return Ok(validated);
    }
    if options.allow_partial {
        for failure in &failures {
            warn!("Dropping review record: {}", failure);
        }
        validated.dropped = failures;
        Ok(validated)
    } else {
        Err(failures)
    }
}

/// Validate `payload` and fold it into `doc`.
///
/// Review findings become ordinary findings with origin `review` and the
/// dimension as detector. Assessed dimensions get their score replaced.
pub fn import_review(
    doc: &mut StateDocument,
    payload: &Value,
    catalog: &DimensionCatalog,
    config: &EngineConfig,
    options: &ImportOptions,
) -> EngineResult<ImportReport> {
    let validated = validate_payload(payload, catalog, config, options)
        .map_err(|failures| EngineError::ImportValidation { failures })?;

    let now = Utc::now();
    let import_id = Uuid::new_v4().to_string();
    let mut report = ImportReport {
        import_id: import_id.clone(),
        dropped: validated.dropped.clone(),
        ..Default::default()
    };

    let mut seen: BTreeSet<String> = BTreeSet::new();
    for rf in &validated.findings {
        let file = rf
            .related_files
            .first()
            .cloned()
            .unwrap_or_else(|| ".".to_string());
        let anchor = normalize_anchor(&rf.identifier);
        let id = deterministic_finding_id(&doc.language, &rf.dimension, &file, &anchor);
        if !seen.insert(id.clone()) {
            continue;
        }

        let mut detail = Map::new();
        detail.insert("evidence".to_string(), Value::from(rf.evidence.clone()));
        detail.insert("related_files".to_string(), Value::from(rf.related_files.clone()));
        if let Some(s) = &rf.suggestion {
            detail.insert("suggestion".to_string(), Value::from(s.clone()));
        }

        match doc.findings.get_mut(&id) {
            Some(existing) => {
                existing.summary = rf.summary.clone();
                existing.detail = detail;
                existing.confidence = rf.confidence;
                existing.tier = rf.tier();
                existing.last_seen = import_id.clone();
                existing.last_seen_at = now;
                if existing.status == Status::Fixed && !doc.plan.done.contains_key(&id) {
                    existing.status = Status::Open;
                    existing.resolution = None;
                    existing.reopen_count += 1;
                    existing.note = Some(format!("Reopened by review import {}", import_id));
                    report.reopened.push(id.clone());
                } else {
                    report.updated.push(id.clone());
                }
            }
            None => {
                doc.findings.insert(
                    id.clone(),
                    Finding {
                        id: id.clone(),
                        language: doc.language.clone(),
                        detector: rf.dimension.clone(),
                        origin: FindingOrigin::Review,
                        file,
                        anchor,
                        line: None,
                        tier: rf.tier(),
                        confidence: rf.confidence,
                        summary: rf.summary.clone(),
                        detail,
                        status: Status::Open,
                        suspect: None,
                        zone: Zone::Scored,
                        zone_category: ZoneCategory::Production,
                        scan_path: ".".to_string(),
                        first_seen: import_id.clone(),
                        last_seen: import_id.clone(),
                        first_seen_at: now,
                        last_seen_at: now,
                        note: None,
                        resolution: None,
                        reopen_count: 0,
                        cluster: None,
                    },
                );
                report.new.push(id);
            }
        }
    }

    // A fresh assessment supersedes the open findings the reviewer no longer reports.
    for f in doc.findings.values_mut() {
        if f.origin == FindingOrigin::Review
            && f.is_open()
            && validated.assessments.contains_key(&f.detector)
            && !seen.contains(&f.id)
        {
            f.status = Status::Fixed;
            f.resolution = Some(Resolution {
                kind: ResolutionKind::Auto,
                note: Some("no longer reported by review".to_string()),
                attestation: None,
                attested: true,
                scan_id: Some(import_id.clone()),
                resolved_at: now,
            });
            report.auto_resolved.push(f.id.clone());
        }
    }

    for (dimension, score) in &validated.assessments {
        doc.assessments.insert(
            dimension.clone(),
            Assessment {
                score: *score,
                needs_refresh: false,
                assessed_at: now,
                source: options.source.clone(),
            },
        );
        report.assessed.push(dimension.clone());
    }

    info!(
        "Imported review {}: {} assessed, {} new, {} updated, {} reopened, {} auto-resolved, {} dropped",
        import_id,
        report.assessed.len(),
        report.new.len(),
        report.updated.len(),
        report.reopened.len(),
        report.auto_resolved.len(),
        report.dropped.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn import(doc: &mut StateDocument, payload: &Value) -> EngineResult<ImportReport> {
        import_review(
            doc,
            payload,
            &DimensionCatalog::default(),
            &EngineConfig::default(),
            &ImportOptions::default(),
        )
    }

    fn finding(dimension: &str, identifier: &str) -> Value {
        json!({
            "dimension": dimension,
            "identifier": identifier,
            "summary": format!("{} problem", identifier),
            "related_files": ["src/api.py"],
            "evidence": ["src/api.py:10"],
            "confidence": "high",
        })
    }

    #[test]
    fn test_valid_import() {
        let mut doc = StateDocument::new("python");
        let report = import(
            &mut doc,
            &json!({
                "assessments": {"naming_quality": 70, "logic_clarity": 100},
                "findings": [finding("naming_quality", "vague_names")],
            }),
        )
        .unwrap();
        assert_eq!(report.new.len(), 1);
        assert_eq!(report.assessed, vec!["logic_clarity", "naming_quality"]);
        let f = doc.finding(&report.new[0]).unwrap();
        assert_eq!(f.origin, FindingOrigin::Review);
        assert_eq!(f.detector, "naming_quality");
        assert_eq!(f.tier, Tier::T3);
        assert_eq!(f.file, "src/api.py");
        assert_eq!(doc.assessment("naming_quality").unwrap().score, 70.0);
    }

    #[test]
    fn test_unknown_dimension_aborts_everything() {
        let mut doc = StateDocument::new("python");
        let before = doc.clone();
        let err = import(
            &mut doc,
            &json!({
                "assessments": {"naming_quality": 100},
                "findings": [finding("naming_quality", "a"), finding("vibes", "b")],
            }),
        );
        match err {
            Err(EngineError::ImportValidation { failures }) => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].contains("vibes"));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
        assert_eq!(doc, before);
    }

    #[test]
    fn test_grounding_rules() {
        let config = EngineConfig::default();
        let catalog = DimensionCatalog::default();
        let opts = ImportOptions::default();

        // Below 85 without a finding
        let low = json!({"assessments": {"type_safety": 60}});
        assert!(validate_payload(&low, &catalog, &config, &opts).is_err());

        // Below 100 with only a note is enough
        let noted = json!({
            "assessments": {"type_safety": 90},
            "dimension_notes": {"type_safety": {"evidence": ["Any used in 3 places"]}},
        });
        assert!(validate_payload(&noted, &catalog, &config, &opts).is_ok());

        // Below 100 with nothing
        let bare = json!({"assessments": {"type_safety": 95}});
        assert!(validate_payload(&bare, &catalog, &config, &opts).is_err());

        // Out of range
        let range = json!({"assessments": {"type_safety": 120}});
        assert!(validate_payload(&range, &catalog, &config, &opts).is_err());
    }

    #[test]
    fn test_schema_checks() {
        let config = EngineConfig::default();
        let catalog = DimensionCatalog::default();
        let opts = ImportOptions::default();
        let cases = [
            json!({"findings": [{"dimension": "naming_quality", "identifier": "x", "summary": "s"}]}),
            json!({"findings": [{"dimension": "naming_quality", "identifier": "x", "summary": "s",
                                 "evidence": ["e"], "confidence": "certain"}]}),
            json!({"findings": [{"dimension": "naming_quality", "identifier": "x", "summary": "s",
                                 "evidence": ["e"], "related_files": "src/a.py"}]}),
            json!({"findings": [{"dimension": "naming_quality", "summary": "s", "evidence": ["e"]}]}),
            json!(["not", "an", "object"]),
        ];
        for case in &cases {
            assert!(validate_payload(case, &catalog, &config, &opts).is_err(), "{}", case);
        }
    }

    #[test]
    fn test_expected_dimensions() {
        let payload = json!({"assessments": {"naming_quality": 100}});
        let result = validate_payload(
            &payload,
            &DimensionCatalog::default(),
            &EngineConfig::default(),
            &ImportOptions::expecting(["logic_clarity"]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_partial_import_drops_bad_records() {
        let mut doc = StateDocument::new("python");
        let report = import_review(
            &mut doc,
            &json!({
                "assessments": {"naming_quality": 100, "type_safety": 50},
                "findings": [finding("naming_quality", "a"), finding("vibes", "b")],
            }),
            &DimensionCatalog::default(),
            &EngineConfig::default(),
            &ImportOptions {
                allow_partial: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(report.new.len(), 1);
        assert_eq!(report.dropped.len(), 2);
        assert_eq!(report.assessed, vec!["naming_quality"]);
        assert!(doc.assessment("type_safety").is_none());
    }

    #[test]
    fn test_reassessment_resolves_dropped_findings() {
        let mut doc = StateDocument::new("python");
        let first = import(
            &mut doc,
            &json!({
                "assessments": {"naming_quality": 60},
                "findings": [finding("naming_quality", "a"), finding("naming_quality", "b")],
            }),
        )
        .unwrap();
        assert_eq!(first.new.len(), 2);

        let second = import(
            &mut doc,
            &json!({
                "assessments": {"naming_quality": 80},
                "findings": [finding("naming_quality", "a")],
            }),
        )
        .unwrap();
        assert_eq!(second.updated.len(), 1);
        assert_eq!(second.auto_resolved.len(), 1);
        assert_eq!(doc.open_findings().count(), 1);
    }
}
