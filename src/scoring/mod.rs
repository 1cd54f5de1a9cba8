//! Zone-aware Health Scoring
//!
//! Scores are always derived from a ledger snapshot, never stored.
//!
//! # Scoring Formula
//!
//! ```text
//! Objective  = Σ weight(resolved) / Σ weight(all) × 100
//!              over scored-zone mechanical findings, weight = T1×1 … T4×4
//!              (no findings → 100)
//! Subjective = mean(assessment score) over active review dimensions
//!              (configured ∪ assessed, unassessed → 0)
//! Overall    = Objective × 0.4 + Subjective × 0.6
//!              (no active dimensions → Objective)
//! ```
//!
//! # Variants
//!
//! | Variant  | Counts as resolved                                            |
//! |----------|---------------------------------------------------------------|
//! | lenient  | fixed, false_positive, wontfix, ignored, permanently skipped  |
//! | strict   | fixed, false_positive                                         |
//! | verified | fixed with an accepted attestation (scan-verified or manual)  |
//!
//! Every variant blends with the same subjective sub-score, so
//! `verified ≤ strict ≤ overall` always holds.
//! Suspect-held findings are open in every variant.

mod health_scorer;

pub use health_scorer::{
    grade_from_score, DimensionKind, DimensionScore, HealthScorer, ScoreBundle, TierBreakdown,
};
