use crate::config::EngineConfig;
use crate::models::{Finding, Status, Tier};
use crate::state::StateDocument;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Per-tier breakdown of the mechanical sub-score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierBreakdown {
    pub tier: Tier,
    pub count: usize,
    pub open: usize,
    pub weighted_total: f64,
    pub weighted_resolved: f64,
    pub weighted_strict_resolved: f64,
    pub score: f64,
    pub strict_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionKind {
    /// A mechanical detector
    Mechanical,
    /// A subjective review dimension
    Subjective,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionScore {
    pub name: String,
    pub kind: DimensionKind,
    pub score: f64,
    /// Strict variant; equals `score` for subjective dimensions
    pub strict_score: f64,
    pub open: usize,
    pub total: usize,
    /// Subjective only: a fix since the last review made the score stale
    pub needs_refresh: bool,
}

/// Every score variant for one ledger snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBundle {
    /// Lenient blend of objective and subjective
    pub overall: f64,
    pub strict: f64,
    pub verified: f64,
    /// Lenient mechanical sub-score
    pub objective: f64,
    pub objective_strict: f64,
    pub objective_verified: f64,
    /// `None` when no review dimension is active
    pub subjective: Option<f64>,
    pub grade: String,
    pub by_tier: Vec<TierBreakdown>,
    pub by_dimension: Vec<DimensionScore>,
}

#[derive(Default)]
struct Tally {
    count: usize,
    open: usize,
    total: f64,
    lenient: f64,
    strict: f64,
    verified: f64,
}

impl Tally {
    fn add(&mut self, finding: &Finding, doc: &StateDocument) {
        let weight = finding.tier.weight();
        self.count += 1;
        self.total += weight;
        if finding.is_open() {
            self.open += 1;
        }
        if lenient_resolved(finding, doc) {
            self.lenient += weight;
        }
        if strict_resolved(finding) {
            self.strict += weight;
        }
        if verified_resolved(finding) {
            self.verified += weight;
        }
    }

    fn pct(&self, resolved: f64) -> f64 {
        if self.total <= 0.0 {
            100.0
        } else {
            resolved / self.total * 100.0
        }
    }
}

/// Dismissed debt and permanent skips count as resolved
fn lenient_resolved(finding: &Finding, doc: &StateDocument) -> bool {
    match finding.status {
        Status::Open => doc.plan().is_permanently_skipped(&finding.id),
        Status::Fixed | Status::Wontfix | Status::FalsePositive | Status::Ignored => true,
    }
}

/// Only real fixes and detector mistakes count as resolved
fn strict_resolved(finding: &Finding) -> bool {
    matches!(finding.status, Status::Fixed | Status::FalsePositive)
}

fn verified_resolved(finding: &Finding) -> bool {
    finding.status == Status::Fixed && finding.resolution.as_ref().is_some_and(|r| r.attested)
}

/// Letter grade for a 0-100 score
pub fn grade_from_score(score: f64) -> &'static str {
    if score >= 97.0 {
        "A+"
    } else if score >= 93.0 {
        "A"
    } else if score >= 90.0 {
        "A-"
    } else if score >= 87.0 {
        "B+"
    } else if score >= 83.0 {
        "B"
    } else if score >= 80.0 {
        "B-"
    } else if score >= 77.0 {
        "C+"
    } else if score >= 73.0 {
        "C"
    } else if score >= 70.0 {
        "C-"
    } else if score >= 67.0 {
        "D+"
    } else if score >= 63.0 {
        "D"
    } else if score >= 60.0 {
        "D-"
    } else {
        "F"
    }
}

/// Ledger health scorer
pub struct HealthScorer {
    objective_weight: f64,
    subjective_weight: f64,
    dimensions: Vec<String>,
}

impl HealthScorer {
    pub fn new(config: &EngineConfig) -> Self {
        let mut scoring = config.scoring.clone();
        if !scoring.is_valid() {
            scoring.normalize();
        }
        Self {
            objective_weight: scoring.objective_weight,
            subjective_weight: scoring.subjective_weight,
            dimensions: config.review.dimensions.clone(),
        }
    }

    fn blend(&self, objective: f64, subjective: Option<f64>) -> f64 {
        match subjective {
            Some(s) => objective * self.objective_weight + s * self.subjective_weight,
            None => objective,
        }
    }

    /// Compute every variant from a ledger snapshot
    pub fn score(&self, doc: &StateDocument) -> ScoreBundle {
        let mut overall = Tally::default();
        let mut tiers: BTreeMap<Tier, Tally> = BTreeMap::new();
        let mut detectors: BTreeMap<String, Tally> = BTreeMap::new();

        for finding in doc.findings().filter(|f| f.is_mechanical() && f.is_scored()) {
            overall.add(finding, doc);
            tiers.entry(finding.tier).or_default().add(finding, doc);
            detectors
                .entry(finding.detector.clone())
                .or_default()
                .add(finding, doc);
        }

        let objective = overall.pct(overall.lenient);
        let objective_strict = overall.pct(overall.strict);
        let objective_verified = overall.pct(overall.verified);

        // Configured dimensions plus anything a review has assessed
        let mut active: BTreeSet<String> = self.dimensions.iter().cloned().collect();
        active.extend(doc.assessments().keys().cloned());
        let dimension_scores: Vec<(String, f64, bool)> = active
            .into_iter()
            .map(|name| {
                let (score, refresh) = doc
                    .assessment(&name)
                    .map(|a| (a.score.clamp(0.0, 100.0), a.needs_refresh))
                    .unwrap_or((0.0, false));
                (name, score, refresh)
            })
            .collect();
        let subjective = if dimension_scores.is_empty() {
            None
        } else {
            let sum: f64 = dimension_scores.iter().map(|(_, s, _)| s).sum();
            Some(sum / dimension_scores.len() as f64)
        };

        let by_tier = Tier::ALL
            .iter()
            .map(|tier| {
                let t = tiers.remove(tier).unwrap_or_default();
                TierBreakdown {
                    tier: *tier,
                    count: t.count,
                    open: t.open,
                    weighted_total: t.total,
                    weighted_resolved: t.lenient,
                    weighted_strict_resolved: t.strict,
                    score: t.pct(t.lenient),
                    strict_score: t.pct(t.strict),
                }
            })
            .collect();

        let mut by_dimension: Vec<DimensionScore> = detectors
            .into_iter()
            .map(|(name, t)| DimensionScore {
                score: t.pct(t.lenient),
                strict_score: t.pct(t.strict),
                name,
                kind: DimensionKind::Mechanical,
                open: t.open,
                total: t.count,
                needs_refresh: false,
            })
            .collect();
        for (name, score, needs_refresh) in dimension_scores {
            let findings: Vec<&Finding> = doc
                .findings()
                .filter(|f| !f.is_mechanical() && f.detector == name)
                .collect();
            by_dimension.push(DimensionScore {
                name,
                kind: DimensionKind::Subjective,
                score,
                strict_score: score,
                open: findings.iter().filter(|f| f.is_open()).count(),
                total: findings.len(),
                needs_refresh,
            });
        }

        let overall_score = self.blend(objective, subjective);
        let bundle = ScoreBundle {
            overall: overall_score,
            strict: self.blend(objective_strict, subjective),
            verified: self.blend(objective_verified, subjective),
            objective,
            objective_strict,
            objective_verified,
            subjective,
            grade: grade_from_score(overall_score).to_string(),
            by_tier,
            by_dimension,
        };
        debug!(
            "Scored {} ledger: overall {:.1}, strict {:.1}, verified {:.1}, objective {:.1}",
            doc.language(),
            bundle.overall,
            bundle.strict,
            bundle.verified,
            bundle.objective
        );
        bundle
    }

    /// Overall score gain if finding `id` were fixed. `None` for unknown ids.
    pub fn score_impact(&self, doc: &StateDocument, id: &str) -> Option<f64> {
        let finding = doc.finding(id)?;
        if finding.status == Status::Fixed {
            return Some(0.0);
        }
        let before = self.score(doc).overall;
        let mut what_if = doc.clone();
        if let Some(f) = what_if.findings.get_mut(id) {
            f.status = Status::Fixed;
        }
        Some(self.score(&what_if).overall - before)
    }
}
