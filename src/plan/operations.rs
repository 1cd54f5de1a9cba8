//! Plan mutations. All of them work on a [`StateDocument`] inside
//! [`crate::state::StateStore::update`].

use super::{Cluster, DoneMarker, SkipEntry, SkipKind};
use crate::config::{EngineConfig, PlannerConfig};
use crate::error::{EngineError, EngineResult};
use crate::models::{ResolutionKind, Status};
use crate::state::resolution::{apply_resolution, match_findings, ResolveOutcome};
use crate::state::StateDocument;
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Reserved prefix for clusters managed by [`auto_cluster`]
pub const AUTO_CLUSTER_PREFIX: &str = "auto/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovePosition {
    Top,
    Bottom,
}

fn require_note(note: &str, what: &str) -> EngineResult<String> {
    let note = note.trim();
    if note.is_empty() {
        return Err(EngineError::InvalidCommand(format!("{} requires a note", what)));
    }
    Ok(note.to_string())
}

/// Open findings matching `pattern`; errors when there are none
fn open_matches(doc: &StateDocument, pattern: &str) -> EngineResult<Vec<String>> {
    let ids: Vec<String> = match_findings(doc, pattern)
        .into_iter()
        .filter(|id| doc.finding(id).is_some_and(|f| f.is_open()))
        .collect();
    if ids.is_empty() {
        return Err(EngineError::InvalidCommand(format!(
            "no open findings match '{}'",
            pattern
        )));
    }
    Ok(ids)
}

fn require_cluster(doc: &StateDocument, name: &str) -> EngineResult<()> {
    if doc.plan.clusters.contains_key(name) {
        Ok(())
    } else {
        Err(EngineError::InvalidCommand(format!("unknown cluster '{}'", name)))
    }
}

/// Pin matching findings to the top or bottom of the queue. Moved items
/// keep their relative order and go ahead of (top) or after (bottom)
/// anything already pinned there. Moving also lifts a skip.
pub fn move_items(
    doc: &mut StateDocument,
    pattern: &str,
    position: MovePosition,
) -> EngineResult<Vec<String>> {
    let ids = open_matches(doc, pattern)?;
    let plan = &mut doc.plan;
    for id in &ids {
        plan.unpin(id);
        plan.skips.remove(id);
    }
    match position {
        MovePosition::Top => {
            let mut pinned = ids.clone();
            pinned.append(&mut plan.pinned_top);
            plan.pinned_top = pinned;
        }
        MovePosition::Bottom => plan.pinned_bottom.extend(ids.iter().cloned()),
    }
    debug!("Moved {} items to {:?}", ids.len(), position);
    Ok(ids)
}

/// Skip matching open findings. Temporary skips without `review_after`
/// use the configured default.
pub fn skip_items(
    doc: &mut StateDocument,
    pattern: &str,
    kind: SkipKind,
    note: &str,
    review_after: Option<u32>,
    config: &PlannerConfig,
) -> EngineResult<Vec<String>> {
    let note = require_note(note, "skipping")?;
    let ids = open_matches(doc, pattern)?;
    let review_after = match kind {
        SkipKind::Temporary => Some(review_after.unwrap_or(config.skip_review_after)),
        SkipKind::Permanent => None,
    };
    let now = Utc::now();
    let scan_count = doc.scan_count;
    for id in &ids {
        doc.plan.unpin(id);
        doc.plan.skips.insert(
            id.clone(),
            SkipEntry {
                kind,
                note: note.clone(),
                skipped_at_scan: scan_count,
                review_after,
                skipped_at: now,
            },
        );
    }
    info!("Skipped {} findings ({:?})", ids.len(), kind);
    Ok(ids)
}

pub fn unskip_items(doc: &mut StateDocument, pattern: &str) -> EngineResult<Vec<String>> {
    let ids: Vec<String> = match_findings(doc, pattern)
        .into_iter()
        .filter(|id| doc.plan.skips.contains_key(id))
        .collect();
    if ids.is_empty() {
        return Err(EngineError::InvalidCommand(format!(
            "no skipped findings match '{}'",
            pattern
        )));
    }
    for id in &ids {
        doc.plan.skips.remove(id);
    }
    Ok(ids)
}

/// Bring back temporary skips whose review window has passed and drop skip
/// entries of findings that are no longer open. Returns the resurfaced ids.
pub fn resurface_stale_skips(doc: &mut StateDocument) -> Vec<String> {
    let scan_count = doc.scan_count;
    let findings = &doc.findings;
    let mut resurfaced = Vec::new();
    doc.plan.skips.retain(|id, entry| {
        if !findings.get(id).is_some_and(|f| f.is_open()) {
            return false;
        }
        let stale = entry.kind == SkipKind::Temporary
            && entry
                .review_after
                .is_some_and(|after| scan_count >= entry.skipped_at_scan + after);
        if stale {
            resurfaced.push(id.clone());
        }
        !stale
    });
    if !resurfaced.is_empty() {
        info!("Resurfaced {} stale skips", resurfaced.len());
    }
    resurfaced
}

pub fn create_cluster(doc: &mut StateDocument, name: &str, description: &str) -> EngineResult<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::InvalidCommand("cluster name is empty".to_string()));
    }
    if name.starts_with(AUTO_CLUSTER_PREFIX) {
        return Err(EngineError::InvalidCommand(format!(
            "cluster names starting with '{}' are reserved",
            AUTO_CLUSTER_PREFIX
        )));
    }
    if doc.plan.clusters.contains_key(name) {
        return Err(EngineError::InvalidCommand(format!(
            "cluster '{}' already exists",
            name
        )));
    }
    doc.plan.clusters.insert(
        name.to_string(),
        Cluster {
            name: name.to_string(),
            description: description.trim().to_string(),
            auto: false,
            created_at: Utc::now(),
        },
    );
    Ok(())
}

/// Add matching findings to `cluster`, taking them out of any other one
pub fn add_to_cluster(doc: &mut StateDocument, cluster: &str, pattern: &str) -> EngineResult<Vec<String>> {
    require_cluster(doc, cluster)?;
    let ids = match_findings(doc, pattern);
    if ids.is_empty() {
        return Err(EngineError::InvalidCommand(format!(
            "no findings match '{}'",
            pattern
        )));
    }
    for id in &ids {
        if let Some(f) = doc.findings.get_mut(id) {
            f.cluster = Some(cluster.to_string());
        }
    }
    Ok(ids)
}

pub fn remove_from_cluster(
    doc: &mut StateDocument,
    cluster: &str,
    pattern: &str,
) -> EngineResult<Vec<String>> {
    require_cluster(doc, cluster)?;
    let mut removed = Vec::new();
    for id in match_findings(doc, pattern) {
        if let Some(f) = doc.findings.get_mut(&id) {
            if f.cluster.as_deref() == Some(cluster) {
                f.cluster = None;
                removed.push(id);
            }
        }
    }
    Ok(removed)
}

/// Delete a cluster. Members stay, unclustered.
pub fn delete_cluster(doc: &mut StateDocument, name: &str) -> EngineResult<()> {
    if doc.plan.clusters.remove(name).is_none() {
        return Err(EngineError::InvalidCommand(format!("unknown cluster '{}'", name)));
    }
    for f in doc.findings.values_mut() {
        if f.cluster.as_deref() == Some(name) {
            f.cluster = None;
        }
    }
    if doc.plan.focus.as_deref() == Some(name) {
        doc.plan.focus = None;
    }
    Ok(())
}

pub fn set_focus(doc: &mut StateDocument, cluster: &str) -> EngineResult<()> {
    require_cluster(doc, cluster)?;
    doc.plan.focus = Some(cluster.to_string());
    Ok(())
}

pub fn clear_focus(doc: &mut StateDocument) {
    doc.plan.focus = None;
}

/// Group unclustered open mechanical findings by detector into system
/// clusters (`auto/<detector>`) once a detector has `min_size` of them.
/// Auto clusters left without open members are removed.
/// Returns the names of clusters that gained members.
pub fn auto_cluster(doc: &mut StateDocument, min_size: usize) -> Vec<String> {
    let mut candidates: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for f in doc.open_findings() {
        let unclustered = match f.cluster.as_deref() {
            None => true,
            Some(c) => c.starts_with(AUTO_CLUSTER_PREFIX),
        };
        if f.is_mechanical() && unclustered {
            candidates.entry(f.detector.clone()).or_default().push(f.id.clone());
        }
    }

    let now = Utc::now();
    let mut grown = Vec::new();
    for (detector, ids) in candidates {
        if ids.len() < min_size.max(1) {
            continue;
        }
        let name = format!("{}{}", AUTO_CLUSTER_PREFIX, detector);
        doc.plan.clusters.entry(name.clone()).or_insert_with(|| Cluster {
            name: name.clone(),
            description: format!("Open {} findings", detector),
            auto: true,
            created_at: now,
        });
        let mut added = 0;
        for id in ids {
            if let Some(f) = doc.findings.get_mut(&id) {
                if f.cluster.as_deref() != Some(name.as_str()) {
                    f.cluster = Some(name.clone());
                    added += 1;
                }
            }
        }
        if added > 0 {
            grown.push(name);
        }
    }

    let live: Vec<String> = doc
        .plan
        .clusters
        .values()
        .filter(|c| c.auto)
        .map(|c| c.name.clone())
        .filter(|name| {
            doc.open_findings()
                .any(|f| f.cluster.as_deref() == Some(name.as_str()))
        })
        .collect();
    let empty: Vec<String> = doc
        .plan
        .clusters
        .values()
        .filter(|c| c.auto && !live.contains(&c.name))
        .map(|c| c.name.clone())
        .collect();
    for name in empty {
        debug!("Dropping empty auto cluster {}", name);
        doc.plan.clusters.remove(&name);
        for f in doc.findings.values_mut() {
            if f.cluster.as_deref() == Some(name.as_str()) {
                f.cluster = None;
            }
        }
        if doc.plan.focus.as_deref() == Some(name.as_str()) {
            doc.plan.focus = None;
        }
    }
    grown
}

/// Record a done marker for matching open findings and resolve them as
/// fixed through the resolution API.
pub fn mark_done(
    doc: &mut StateDocument,
    pattern: &str,
    note: &str,
    attestation: Option<&str>,
    config: &EngineConfig,
) -> EngineResult<ResolveOutcome> {
    let note = require_note(note, "marking done")?;
    let ids = open_matches(doc, pattern)?;
    let now = Utc::now();
    for id in &ids {
        doc.plan.unpin(id);
        doc.plan.skips.remove(id);
        doc.plan.done.insert(
            id.clone(),
            DoneMarker {
                note: note.clone(),
                marked_at: now,
            },
        );
    }
    let outcome = apply_resolution(
        doc,
        &ids,
        Status::Fixed,
        ResolutionKind::Done,
        Some(note.as_str()),
        attestation,
        config,
    );
    info!("Marked {} findings done", outcome.resolved.len());
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::merge::{merge_scan, MergeOptions};
    use crate::state::test_support::{records, run};

    fn seeded() -> StateDocument {
        let mut all = records("unused", "src", 3);
        all.extend(records("smells", "lib", 2));
        let mut doc = StateDocument::new("python");
        merge_scan(&mut doc, &run(".", &all), &MergeOptions::default(), &EngineConfig::default())
            .unwrap();
        doc
    }

    #[test]
    fn test_move_top_prepends() {
        let mut doc = seeded();
        move_items(&mut doc, "src/f0.py", MovePosition::Top).unwrap();
        let moved = move_items(&mut doc, "lib/f1.py", MovePosition::Top).unwrap();
        assert_eq!(doc.plan.pinned_top[0], moved[0]);
        assert_eq!(doc.plan.pinned_top.len(), 2);

        move_items(&mut doc, "lib/f1.py", MovePosition::Bottom).unwrap();
        assert_eq!(doc.plan.pinned_top.len(), 1);
        assert_eq!(doc.plan.pinned_bottom, moved);
    }

    #[test]
    fn test_skip_needs_note_and_resurfaces() {
        let mut doc = seeded();
        let config = PlannerConfig::default();
        assert!(skip_items(&mut doc, "unused", SkipKind::Temporary, "", None, &config).is_err());

        let skipped = skip_items(&mut doc, "unused", SkipKind::Temporary, "later", Some(2), &config).unwrap();
        assert_eq!(skipped.len(), 3);
        skip_items(&mut doc, "smells", SkipKind::Permanent, "accepted", None, &config).unwrap();

        doc.scan_count += 1;
        assert!(resurface_stale_skips(&mut doc).is_empty());
        doc.scan_count += 1;
        let back = resurface_stale_skips(&mut doc);
        assert_eq!(back.len(), 3);
        assert_eq!(doc.plan.skips.len(), 2);
        assert!(doc.plan.skips.values().all(|s| s.kind == SkipKind::Permanent));
    }

    #[test]
    fn test_skip_pruned_when_finding_closes() {
        let mut doc = seeded();
        skip_items(&mut doc, "smells", SkipKind::Permanent, "accepted", None, &PlannerConfig::default())
            .unwrap();
        merge_scan(
            &mut doc,
            &run(".", &records("unused", "src", 3)),
            &MergeOptions::default(),
            &EngineConfig::default(),
        )
        .unwrap();
        resurface_stale_skips(&mut doc);
        assert!(doc.plan.skips.is_empty());
    }

    #[test]
    fn test_unskip() {
        let mut doc = seeded();
        skip_items(&mut doc, "smells", SkipKind::Temporary, "later", None, &PlannerConfig::default())
            .unwrap();
        assert_eq!(unskip_items(&mut doc, "smells").unwrap().len(), 2);
        assert!(unskip_items(&mut doc, "smells").is_err());
    }

    #[test]
    fn test_cluster_lifecycle() {
        let mut doc = seeded();
        assert!(create_cluster(&mut doc, "auto/x", "").is_err());
        create_cluster(&mut doc, "imports", "Tidy imports").unwrap();
        assert!(create_cluster(&mut doc, "imports", "").is_err());
        assert!(add_to_cluster(&mut doc, "missing", "unused").is_err());

        create_cluster(&mut doc, "other", "").unwrap();
        add_to_cluster(&mut doc, "other", "unused").unwrap();
        add_to_cluster(&mut doc, "imports", "unused").unwrap();
        assert!(doc
            .findings()
            .filter(|f| f.detector == "unused")
            .all(|f| f.cluster.as_deref() == Some("imports")));

        let removed = remove_from_cluster(&mut doc, "imports", "src/f0.py").unwrap();
        assert_eq!(removed.len(), 1);

        set_focus(&mut doc, "imports").unwrap();
        delete_cluster(&mut doc, "imports").unwrap();
        assert!(doc.plan.focus.is_none());
        assert!(doc.findings().all(|f| f.cluster.as_deref() != Some("imports")));
    }

    #[test]
    fn test_auto_cluster_by_detector() {
        let mut doc = seeded();
        let grown = auto_cluster(&mut doc, 3);
        assert_eq!(grown, vec!["auto/unused".to_string()]);
        assert!(doc.plan.clusters["auto/unused"].auto);
        assert!(!doc.plan.clusters.contains_key("auto/smells"));

        // Idempotent
        assert!(auto_cluster(&mut doc, 3).is_empty());

        // Emptied clusters disappear
        merge_scan(
            &mut doc,
            &run(".", &records("smells", "lib", 2)),
            &MergeOptions::default(),
            &EngineConfig::default(),
        )
        .unwrap();
        auto_cluster(&mut doc, 3);
        assert!(!doc.plan.clusters.contains_key("auto/unused"));
    }

    #[test]
    fn test_mark_done_resolves_and_sticks() {
        let mut doc = seeded();
        let config = EngineConfig::default();
        assert!(mark_done(&mut doc, "smells", " ", None, &config).is_err());

        let outcome = mark_done(&mut doc, "smells", "rewrote module", None, &config).unwrap();
        assert_eq!(outcome.resolved.len(), 2);
        for id in &outcome.resolved {
            let f = doc.finding(id).unwrap();
            assert_eq!(f.status, Status::Fixed);
            assert_eq!(f.resolution.as_ref().unwrap().kind, ResolutionKind::Done);
            assert!(doc.plan.is_done(id));
        }

        // Reported again: stays fixed because of the done marker
        let mut all = records("unused", "src", 3);
        all.extend(records("smells", "lib", 2));
        let report = merge_scan(&mut doc, &run(".", &all), &MergeOptions::default(), &config).unwrap();
        assert!(report.reopened.is_empty());
    }
}
