use crate::config::PlannerConfig;
use crate::models::{Finding, FindingOrigin, Tier};
use crate::state::StateDocument;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct QueueOptions {
    pub include_skipped: bool,
    pub include_suspect: bool,
    /// Restrict to one cluster, overriding the plan's focus
    pub cluster: Option<String>,
    pub ignore_focus: bool,
    pub limit: Option<usize>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            include_skipped: false,
            include_suspect: true,
            cluster: None,
            ignore_focus: false,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueItem {
    pub id: String,
    pub detector: String,
    pub file: String,
    pub tier: Tier,
    pub impact: f64,
    pub summary: String,
    pub cluster: Option<String>,
    pub suspect: bool,
    pub skipped: bool,
    pub pinned: bool,
}

fn impact(finding: &Finding, config: &PlannerConfig) -> f64 {
    let base = config.impact_for(&finding.detector);
    match finding.origin {
        FindingOrigin::Review => base * finding.confidence.weight(),
        FindingOrigin::Mechanical => base,
    }
}

fn item(finding: &Finding, config: &PlannerConfig, doc: &StateDocument, pinned: bool) -> QueueItem {
    QueueItem {
        id: finding.id.clone(),
        detector: finding.detector.clone(),
        file: finding.file.clone(),
        tier: finding.tier,
        impact: impact(finding, config),
        summary: finding.summary.clone(),
        cluster: finding.cluster.clone(),
        suspect: finding.is_suspect(),
        skipped: doc.plan.is_skipped(&finding.id),
        pinned,
    }
}

/// Ordered work queue for a ledger
pub fn build_queue(doc: &StateDocument, config: &PlannerConfig, options: &QueueOptions) -> Vec<QueueItem> {
    let plan = doc.plan();
    let cluster = options.cluster.as_deref().or(if options.ignore_focus {
        None
    } else {
        plan.focus.as_deref()
    });

    let wanted = |f: &Finding| {
        f.is_open()
            && !plan.is_done(&f.id)
            && (options.include_suspect || !f.is_suspect())
            && (options.include_skipped || !plan.is_skipped(&f.id))
            && cluster.map_or(true, |c| f.cluster.as_deref() == Some(c))
    };

    let pinned_ids: HashSet<&str> = plan
        .pinned_top
        .iter()
        .chain(plan.pinned_bottom.iter())
        .map(String::as_str)
        .collect();

    let pinned = |ids: &[String]| -> Vec<QueueItem> {
        ids.iter()
            .filter_map(|id| doc.finding(id))
            .filter(|f| wanted(f))
            .map(|f| item(f, config, doc, true))
            .collect()
    };

    let mut rest: Vec<QueueItem> = doc
        .findings()
        .filter(|f| wanted(f) && !pinned_ids.contains(f.id.as_str()))
        .map(|f| item(f, config, doc, false))
        .collect();
    rest.sort_by(|a, b| {
        b.tier
            .cmp(&a.tier)
            .then_with(|| b.impact.total_cmp(&a.impact))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut queue = pinned(&plan.pinned_top);
    queue.extend(rest);
    queue.extend(pinned(&plan.pinned_bottom));
    if let Some(limit) = options.limit {
        queue.truncate(limit);
    }
    queue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::detectors::RawFinding;
    use crate::plan::{
        add_to_cluster, create_cluster, move_items, set_focus, skip_items, MovePosition, SkipKind,
    };
    use crate::state::merge::{merge_scan, MergeOptions};
    use crate::state::test_support::run;

    fn seeded() -> StateDocument {
        let records = vec![
            RawFinding::new("unused", "src/a.py", 1).with_anchor("a"),
            RawFinding::new("cycles", "src/b.py", 3).with_anchor("b"),
            RawFinding::new("smells", "src/c.py", 3).with_anchor("c"),
            RawFinding::new("coupling", "src/d.py", 4).with_anchor("d"),
        ];
        let mut doc = StateDocument::new("python");
        merge_scan(&mut doc, &run(".", &records), &MergeOptions::default(), &EngineConfig::default())
            .unwrap();
        doc
    }

    fn weighted() -> PlannerConfig {
        let mut config = PlannerConfig::default();
        config.impact_weights.insert("cycles".to_string(), 2.0);
        config
    }

    fn detectors(queue: &[QueueItem]) -> Vec<&str> {
        queue.iter().map(|i| i.detector.as_str()).collect()
    }

    #[test]
    fn test_order_tier_then_impact() {
        let doc = seeded();
        let queue = build_queue(&doc, &weighted(), &QueueOptions::default());
        assert_eq!(detectors(&queue), vec!["coupling", "cycles", "smells", "unused"]);
    }

    #[test]
    fn test_pins_and_skips() {
        let mut doc = seeded();
        move_items(&mut doc, "unused", MovePosition::Top).unwrap();
        move_items(&mut doc, "coupling", MovePosition::Bottom).unwrap();
        skip_items(&mut doc, "smells", SkipKind::Temporary, "later", None, &PlannerConfig::default())
            .unwrap();

        let queue = build_queue(&doc, &weighted(), &QueueOptions::default());
        assert_eq!(detectors(&queue), vec!["unused", "cycles", "coupling"]);
        assert!(queue[0].pinned);

        let with_skipped = build_queue(
            &doc,
            &weighted(),
            &QueueOptions {
                include_skipped: true,
                ..Default::default()
            },
        );
        assert_eq!(with_skipped.len(), 4);
        assert!(with_skipped.iter().any(|i| i.skipped));
    }

    #[test]
    fn test_focus_restricts_to_cluster() {
        let mut doc = seeded();
        create_cluster(&mut doc, "graph", "").unwrap();
        add_to_cluster(&mut doc, "graph", "cycles").unwrap();
        add_to_cluster(&mut doc, "graph", "coupling").unwrap();
        set_focus(&mut doc, "graph").unwrap();

        let queue = build_queue(&doc, &weighted(), &QueueOptions::default());
        assert_eq!(detectors(&queue), vec!["coupling", "cycles"]);
        assert!(queue.iter().all(|i| i.cluster.as_deref() == Some("graph")));

        let all = build_queue(
            &doc,
            &weighted(),
            &QueueOptions {
                ignore_focus: true,
                limit: Some(3),
                ..Default::default()
            },
        );
        assert_eq!(all.len(), 3);
    }
}
