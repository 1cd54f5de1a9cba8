//! Subjective review import
//!
//! A review (human or model) assesses the code along named dimensions and
//! returns a JSON payload:
//!
//! ```json
//! {
//!   "assessments": { "naming_quality": 72 },
//!   "findings": [{
//!     "dimension": "naming_quality",
//!     "identifier": "ambiguous_handler_names",
//!     "summary": "handle/process/run used interchangeably",
//!     "related_files": ["src/api.py"],
//!     "evidence": ["api.py:12 handle()", "api.py:40 process()"],
//!     "suggestion": "pick one verb per layer",
//!     "confidence": "high"
//!   }],
//!   "dimension_notes": { "naming_quality": { "evidence": ["..."] } }
//! }
//! ```
//!
//! [`import::import_review`] validates the payload fail-closed and folds it
//! into the ledger. [`batch::run_batches`] runs several reviews in parallel
//! and imports each result on its own.

pub mod batch;
pub mod import;

pub use batch::{run_batches, BatchFailure, BatchOutcome, ReviewBatch};
pub use import::{import_review, validate_payload, ImportOptions, ImportReport, ValidatedPayload};

use crate::config::EngineConfig;
use std::collections::BTreeSet;

/// Built-in review dimensions
pub const KNOWN_DIMENSIONS: &[&str] = &[
    "naming_quality",
    "logic_clarity",
    "type_safety",
    "contract_coherence",
    "error_consistency",
    "abstraction_fitness",
    "design_coherence",
    "cross_module_architecture",
    "initialization_coupling",
    "convention_outlier",
    "dependency_health",
    "test_strategy",
    "api_surface_coherence",
    "authorization_consistency",
    "ai_generated_debt",
    "incomplete_migration",
    "package_organization",
    "high_level_elegance",
    "mid_level_elegance",
    "low_level_elegance",
];

/// `Naming Quality`, `naming-quality` and `naming_quality` are one dimension
pub fn normalize_dimension(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Dimensions accepted on import
#[derive(Debug, Clone)]
pub struct DimensionCatalog {
    known: BTreeSet<String>,
}

impl DimensionCatalog {
    /// Built-ins plus configured custom dimensions plus plugin dimensions
    pub fn new(config: &EngineConfig, plugin_dimensions: &[String]) -> Self {
        let known = KNOWN_DIMENSIONS
            .iter()
            .map(|d| d.to_string())
            .chain(config.review.custom_dimensions.iter().map(|d| normalize_dimension(d)))
            .chain(config.review.dimensions.iter().map(|d| normalize_dimension(d)))
            .chain(plugin_dimensions.iter().map(|d| normalize_dimension(d)))
            .collect();
        Self { known }
    }

    pub fn contains(&self, dimension: &str) -> bool {
        self.known.contains(&normalize_dimension(dimension))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.known.iter().map(String::as_str)
    }
}

impl Default for DimensionCatalog {
    fn default() -> Self {
        Self::new(&EngineConfig::default(), &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_dimension() {
        assert_eq!(normalize_dimension("Naming Quality"), "naming_quality");
        assert_eq!(normalize_dimension(" type-safety "), "type_safety");
    }

    #[test]
    fn test_catalog_includes_custom() {
        let mut config = EngineConfig::default();
        config.review.custom_dimensions.push("Query Hygiene".to_string());
        let catalog = DimensionCatalog::new(&config, &["async_discipline".to_string()]);
        assert!(catalog.contains("query_hygiene"));
        assert!(catalog.contains("async-discipline"));
        assert!(catalog.contains("design_coherence"));
        assert!(!catalog.contains("vibes"));
    }
}
