//! Sticky zone overrides and ignore rules

use crate::classifier::ZoneClassifier;
use crate::config::build_glob_set;
use crate::error::{EngineError, EngineResult};
use crate::models::{normalize_path, path_in_scope, Finding, Status, ZoneCategory};
use crate::state::{IgnoreRule, StateDocument};
use chrono::Utc;
use tracing::info;

/// Pin `path` (file or directory) to `category`. Existing findings under the
/// path are re-zoned immediately. Returns how many changed zone category.
pub fn set_zone_override(
    doc: &mut StateDocument,
    path: &str,
    category: ZoneCategory,
    classifier: &ZoneClassifier,
) -> usize {
    let key = normalize_path(path);
    doc.zone_overrides.insert(key.clone(), category);
    let changed = rezone(doc, classifier);
    info!("Zone override {} -> {} ({} findings re-zoned)", key, category, changed);
    changed
}

/// Drop the override for `path`; findings fall back to the heuristics.
pub fn clear_zone_override(
    doc: &mut StateDocument,
    path: &str,
    classifier: &ZoneClassifier,
) -> EngineResult<usize> {
    let key = normalize_path(path);
    if doc.zone_overrides.remove(&key).is_none() {
        return Err(EngineError::InvalidCommand(format!(
            "no zone override for '{}'",
            key
        )));
    }
    let changed = rezone(doc, classifier);
    info!("Zone override {} cleared ({} findings re-zoned)", key, changed);
    Ok(changed)
}

/// Re-zone every finding against the current overrides
pub(crate) fn rezone(doc: &mut StateDocument, classifier: &ZoneClassifier) -> usize {
    let mut changed = 0;
    for finding in doc.findings.values_mut() {
        let before = finding.zone_category;
        classifier.apply(finding, &doc.zone_overrides);
        if finding.zone_category != before {
            changed += 1;
        }
    }
    changed
}

/// Whether an ignore pattern covers `finding`.
///
/// Pattern forms: `detector::glob`, a bare detector name, or a file glob
/// (`dir/` and bare directory names cover everything beneath).
pub(crate) fn ignore_pattern_matches(pattern: &str, finding: &Finding) -> bool {
    let pattern = pattern.trim();
    if let Some((detector, glob)) = pattern.split_once("::") {
        return detector == finding.detector && file_matches(glob, &finding.file);
    }
    pattern == finding.detector || file_matches(pattern, &finding.file)
}

fn file_matches(glob: &str, file: &str) -> bool {
    if glob.contains('*') || glob.contains('?') || glob.contains('[') {
        build_glob_set(&[glob.to_string()])
            .map(|set| set.is_match(file))
            .unwrap_or(false)
    } else {
        path_in_scope(file, glob) && normalize_path(glob) != "."
    }
}

pub(crate) fn matching_ignore_rule<'a>(
    rules: &'a [IgnoreRule],
    finding: &Finding,
) -> Option<&'a IgnoreRule> {
    rules.iter().find(|r| ignore_pattern_matches(&r.pattern, finding))
}

/// Persist an ignore rule. Open findings it covers become `ignored` now;
/// new findings matching it start out ignored. Returns the ids changed.
pub fn add_ignore_rule(doc: &mut StateDocument, pattern: &str, note: &str) -> EngineResult<Vec<String>> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Err(EngineError::InvalidCommand("ignore pattern is empty".to_string()));
    }
    if note.trim().is_empty() {
        return Err(EngineError::InvalidCommand(
            "ignore rules require a note".to_string(),
        ));
    }
    if doc.ignore_rules.iter().any(|r| r.pattern == pattern) {
        return Err(EngineError::InvalidCommand(format!(
            "ignore rule '{}' already exists",
            pattern
        )));
    }

    let mut ignored = Vec::new();
    for finding in doc.findings.values_mut() {
        if finding.is_open() && ignore_pattern_matches(pattern, finding) {
            finding.status = Status::Ignored;
            finding.suspect = None;
            finding.note = Some(format!("Matched ignore rule '{}': {}", pattern, note));
            ignored.push(finding.id.clone());
        }
    }
    doc.ignore_rules.push(IgnoreRule {
        pattern: pattern.to_string(),
        note: note.to_string(),
        added_at: Utc::now(),
    });
    info!("Ignore rule '{}' added, {} findings ignored", pattern, ignored.len());
    Ok(ignored)
}

/// Remove an ignore rule. Findings it ignored stay ignored until reopened.
pub fn remove_ignore_rule(doc: &mut StateDocument, pattern: &str) -> EngineResult<()> {
    let before = doc.ignore_rules.len();
    doc.ignore_rules.retain(|r| r.pattern != pattern.trim());
    if doc.ignore_rules.len() == before {
        return Err(EngineError::InvalidCommand(format!(
            "no ignore rule '{}'",
            pattern
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::detectors::RawFinding;
    use crate::models::Zone;
    use crate::state::merge::{merge_scan, MergeOptions};
    use crate::state::test_support::{records, run};

    fn seeded(records: &[RawFinding]) -> StateDocument {
        let mut doc = StateDocument::new("python");
        merge_scan(
            &mut doc,
            &run(".", records),
            &MergeOptions::default(),
            &EngineConfig::default(),
        )
        .unwrap();
        doc
    }

    #[test]
    fn test_zone_override_rezones_and_clears() {
        let mut doc = seeded(&records("unused", "vendor/ours", 2));
        let classifier = ZoneClassifier::new(&[]).unwrap();
        rezone(&mut doc, &classifier);
        assert!(doc.findings().all(|f| f.zone == Zone::Excluded));

        let changed = set_zone_override(&mut doc, "vendor/ours/", ZoneCategory::Production, &classifier);
        assert_eq!(changed, 2);
        assert!(doc.findings().all(|f| f.zone == Zone::Scored));
        assert!(doc.zone_overrides().contains_key("vendor/ours"));

        let changed = clear_zone_override(&mut doc, "vendor/ours", &classifier).unwrap();
        assert_eq!(changed, 2);
        assert!(doc.findings().all(|f| f.zone_category == ZoneCategory::Vendor));
        assert!(clear_zone_override(&mut doc, "vendor/ours", &classifier).is_err());
    }

    #[test]
    fn test_ignore_rule_forms() {
        let doc = seeded(&records("unused", "src", 1));
        let f = doc.findings().next().unwrap();
        assert!(ignore_pattern_matches("unused", f));
        assert!(ignore_pattern_matches("src", f));
        assert!(ignore_pattern_matches("src/*.py", f));
        assert!(ignore_pattern_matches("unused::src/**", f));
        assert!(!ignore_pattern_matches("smells::src/**", f));
        assert!(!ignore_pattern_matches("sr", f));
    }

    #[test]
    fn test_ignore_rule_applies_now_and_later() {
        let mut doc = seeded(&records("unused", "src", 2));
        let ignored = add_ignore_rule(&mut doc, "unused", "handled by the linter").unwrap();
        assert_eq!(ignored.len(), 2);
        assert!(doc.findings().all(|f| f.status == Status::Ignored));

        let report = merge_scan(
            &mut doc,
            &run(".", &records("unused", "lib", 1)),
            &MergeOptions::default(),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(report.new_ignored.len(), 1);
        assert_eq!(doc.open_findings().count(), 0);

        remove_ignore_rule(&mut doc, "unused").unwrap();
        assert!(doc.ignore_rules().is_empty());
        assert!(remove_ignore_rule(&mut doc, "unused").is_err());
    }

    #[test]
    fn test_ignore_rule_requires_note() {
        let mut doc = StateDocument::new("python");
        assert!(matches!(
            add_ignore_rule(&mut doc, "unused", " "),
            Err(EngineError::InvalidCommand(_))
        ));
    }
}
