//! Normalizer
//!
//! Turns heterogeneous raw records into canonical [`Finding`]s with a stable
//! identity. A record missing its detector, its file or a valid tier fails
//! on its own: it is logged and dropped, the rest of the scan carries on.
//! Nothing is ever guessed. A record without a tier does not get a default
//! one, a record without a detector is not attributed to whoever produced it.

use crate::detectors::RawFinding;
use crate::error::EngineError;
use crate::models::{
    deterministic_finding_id, normalize_anchor, normalize_path, Confidence, Finding,
    FindingOrigin, ScanRun, Status, Tier, Zone, ZoneCategory,
};
use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

/// Result of normalizing one batch of raw records
#[derive(Debug, Default)]
pub struct NormalizeOutcome {
    pub findings: Vec<Finding>,
    /// One `EngineError::MalformedRecord` per rejected record
    pub malformed: Vec<EngineError>,
    /// Records collapsed because an earlier record had the same id
    pub duplicates: usize,
}

/// Maps raw records into findings for one scan
pub struct Normalizer {
    language: String,
    scan_id: String,
    scan_path: String,
    observed_at: DateTime<Utc>,
}

impl Normalizer {
    pub fn new(language: &str, scan_id: &str, scan_path: &str) -> Self {
        Self {
            language: language.to_string(),
            scan_id: scan_id.to_string(),
            scan_path: normalize_path(scan_path),
            observed_at: Utc::now(),
        }
    }

    pub fn for_run(run: &ScanRun) -> Self {
        Self {
            language: run.language.clone(),
            scan_id: run.id.clone(),
            scan_path: run.scan_path.clone(),
            observed_at: run.started_at,
        }
    }

    /// Normalize a single record. `index` is only used for error context.
    pub fn normalize_record(&self, index: usize, raw: &RawFinding) -> Result<Finding, EngineError> {
        let malformed = |reason: &str| EngineError::MalformedRecord {
            index,
            reason: reason.to_string(),
        };

        let detector = raw
            .detector
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| malformed("missing detector"))?;
        let file = raw
            .file
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .ok_or_else(|| malformed("missing file"))?;
        let tier_hint = raw.tier.as_ref().ok_or_else(|| malformed("missing tier"))?;
        let tier = Tier::parse(tier_hint)
            .ok_or_else(|| malformed(&format!("invalid tier {}", tier_hint)))?;
        let confidence = match raw.confidence.as_deref() {
            None => Confidence::default(),
            Some(c) => Confidence::parse(c)
                .ok_or_else(|| malformed(&format!("invalid confidence '{}'", c)))?,
        };

        // Summaries carry counts and line numbers; only the anchor is identity.
        let anchor = normalize_anchor(raw.anchor.as_deref().unwrap_or_default());
        let file = normalize_path(file);
        let id = deterministic_finding_id(&self.language, detector, &file, &anchor);

        Ok(Finding {
            id,
            language: self.language.clone(),
            detector: detector.to_string(),
            origin: FindingOrigin::Mechanical,
            file,
            anchor,
            line: raw.line,
            tier,
            confidence,
            summary: raw.summary.clone().unwrap_or_default(),
            detail: raw.detail.clone(),
            status: Status::Open,
            suspect: None,
            zone: Zone::Scored,
            zone_category: ZoneCategory::Production,
            scan_path: self.scan_path.clone(),
            first_seen: self.scan_id.clone(),
            last_seen: self.scan_id.clone(),
            first_seen_at: self.observed_at,
            last_seen_at: self.observed_at,
            note: None,
            resolution: None,
            reopen_count: 0,
            cluster: None,
        })
    }

    /// Normalize a batch, dropping malformed records and duplicate ids.
    pub fn normalize(&self, records: &[RawFinding]) -> NormalizeOutcome {
        let mut outcome = NormalizeOutcome::default();
        let mut seen: FxHashSet<String> = FxHashSet::default();

        for (index, raw) in records.iter().enumerate() {
            match self.normalize_record(index, raw) {
                Ok(finding) => {
                    if seen.insert(finding.id.clone()) {
                        outcome.findings.push(finding);
                    } else {
                        debug!("Duplicate finding {} from {}", finding.id, finding.detector);
                        outcome.duplicates += 1;
                    }
                }
                Err(e) => {
                    warn!("Dropping raw finding: {}", e);
                    outcome.malformed.push(e);
                }
            }
        }

        debug!(
            "Normalized {} records: {} findings, {} malformed, {} duplicates",
            records.len(),
            outcome.findings.len(),
            outcome.malformed.len(),
            outcome.duplicates
        );
        outcome
    }
}

/// Normalize `records` into a fresh [`ScanRun`]. Malformed records are
/// returned alongside; they never make it into the run.
pub fn build_scan_run(
    language: &str,
    scan_path: &str,
    records: &[RawFinding],
) -> (ScanRun, Vec<EngineError>) {
    let mut run = ScanRun::new(language, scan_path, Vec::new());
    let outcome = Normalizer::for_run(&run).normalize(records);
    run.findings = outcome.findings;
    (run, outcome.malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> Normalizer {
        Normalizer::new("python", "scan-1", "./src")
    }

    #[test]
    fn test_valid_record() {
        let raw = RawFinding::new("unused", "./src/app.py", 1)
            .with_anchor("import  os")
            .with_summary("unused import os")
            .with_line(3);
        let f = normalizer().normalize_record(0, &raw).unwrap();
        assert_eq!(f.file, "src/app.py");
        assert_eq!(f.anchor, "import os");
        assert_eq!(f.tier, Tier::T1);
        assert_eq!(f.scan_path, "src");
        assert_eq!(f.first_seen, "scan-1");
        assert_eq!(f.status, Status::Open);
        assert_eq!(f.id, deterministic_finding_id("python", "unused", "src/app.py", "import os"));
    }

    #[test]
    fn test_line_shift_keeps_identity() {
        let a = RawFinding::new("unused", "src/app.py", 1).with_anchor("os").with_line(3);
        let b = RawFinding::new("unused", "src/app.py", 1).with_anchor("os").with_line(40);
        let n = normalizer();
        assert_eq!(
            n.normalize_record(0, &a).unwrap().id,
            n.normalize_record(1, &b).unwrap().id
        );
    }

    #[test]
    fn test_missing_fields_fail_only_that_record() {
        let records = vec![
            RawFinding::new("unused", "src/a.py", 1).with_anchor("x"),
            RawFinding {
                detector: None,
                ..RawFinding::new("unused", "src/b.py", 1)
            },
            RawFinding {
                tier: None,
                ..RawFinding::new("unused", "src/c.py", 1)
            },
            RawFinding::new("unused", "src/d.py", 9),
            RawFinding::new("unused", "", 2),
            RawFinding::new("unused", "src/e.py", 2).with_confidence("certain"),
        ];
        let outcome = normalizer().normalize(&records);
        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.malformed.len(), 5);
        assert!(outcome
            .malformed
            .iter()
            .all(|e| matches!(e, EngineError::MalformedRecord { .. })));
    }

    #[test]
    fn test_duplicates_collapse() {
        let records = vec![
            RawFinding::new("unused", "src/a.py", 1).with_anchor("x").with_line(1),
            RawFinding::new("unused", "src/a.py", 1).with_anchor("x").with_line(2),
        ];
        let outcome = normalizer().normalize(&records);
        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(outcome.findings[0].line, Some(1));
    }

    #[test]
    fn test_reworded_summary_keeps_identity() {
        let before = RawFinding::new("smells", "src/a.py", 2).with_summary("function is 52 lines");
        let after = RawFinding::new("smells", "src/a.py", 2).with_summary("function is 60 lines");
        let n = normalizer();
        let a = n.normalize_record(0, &before).unwrap();
        let b = n.normalize_record(1, &after).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.anchor, "");
        assert_eq!(b.summary, "function is 60 lines");
    }

    #[test]
    fn test_string_tier_hint() {
        let raw = RawFinding {
            tier: Some(serde_json::json!("T4")),
            ..RawFinding::new("smells", "src/a.py", 1)
        };
        assert_eq!(normalizer().normalize_record(0, &raw).unwrap().tier, Tier::T4);
    }
}
