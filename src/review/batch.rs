//! Parallel review batches
//!
//! Reviews are slow and independent, so the runner fans them out on a
//! bounded rayon pool. Imports stay sequential: each batch result goes
//! through its own locked [`StateStore::update`] with the batch's
//! dimensions as the expected set. A batch whose runner fails or whose
//! payload is rejected is reported for retry and does not affect others.

use super::import::{import_review, ImportOptions, ImportReport};
use super::{normalize_dimension, DimensionCatalog};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::state::StateStore;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One unit of review work
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewBatch {
    pub name: String,
    pub dimensions: Vec<String>,
    pub files: Vec<String>,
}

impl ReviewBatch {
    pub fn new(name: impl Into<String>, dimensions: &[&str]) -> Self {
        Self {
            name: name.into(),
            dimensions: dimensions.iter().map(|d| normalize_dimension(d)).collect(),
            files: Vec::new(),
        }
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub batch: String,
    pub reasons: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct BatchOutcome {
    pub imported: Vec<(String, ImportReport)>,
    /// Batches to retry
    pub failed: Vec<BatchFailure>,
    pub duration_ms: u64,
}

impl BatchOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run `runner` on every batch with at most `config.review.workers`
/// concurrent runs, then import each result fail-closed.
///
/// Ledger errors (lock, corruption, I/O) abort the whole run.
pub fn run_batches<F>(
    store: &mut StateStore,
    batches: &[ReviewBatch],
    catalog: &DimensionCatalog,
    config: &EngineConfig,
    runner: F,
) -> EngineResult<BatchOutcome>
where
    F: Fn(&ReviewBatch) -> anyhow::Result<Value> + Send + Sync,
{
    let start = Instant::now();
    let workers = config.review.workers.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| EngineError::Config(format!("review worker pool: {}", e)))?;

    debug!("Running {} review batches on {} workers", batches.len(), workers);
    let results: Vec<(&ReviewBatch, anyhow::Result<Value>)> = pool.install(|| {
        batches
            .par_iter()
            .map(|batch| (batch, runner(batch)))
            .collect()
    });

    let mut outcome = BatchOutcome::default();
    for (batch, result) in results {
        let payload = match result {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Review batch {} failed: {:#}", batch.name, e);
                outcome.failed.push(BatchFailure {
                    batch: batch.name.clone(),
                    reasons: vec![format!("{:#}", e)],
                });
                continue;
            }
        };

        let options = ImportOptions {
            source: Some(batch.name.clone()),
            ..ImportOptions::expecting(&batch.dimensions)
        };
        match store.update(|doc| import_review(doc, &payload, catalog, config, &options)) {
            Ok(report) => outcome.imported.push((batch.name.clone(), report)),
            Err(EngineError::ImportValidation { failures }) => {
                warn!(
                    "Review batch {} rejected: {} validation failures",
                    batch.name,
                    failures.len()
                );
                outcome.failed.push(BatchFailure {
                    batch: batch.name.clone(),
                    reasons: failures,
                });
            }
            Err(e) => return Err(e),
        }
    }

    outcome.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Review batches: {} imported, {} failed in {}ms",
        outcome.imported.len(),
        outcome.failed.len(),
        outcome.duration_ms
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn payload(dimension: &str) -> Value {
        json!({
            "assessments": {dimension: 70},
            "findings": [{
                "dimension": dimension,
                "identifier": format!("{}_issue", dimension),
                "summary": "needs work",
                "related_files": ["src/app.py"],
                "evidence": ["src/app.py:1"],
                "confidence": "medium",
            }],
        })
    }

    #[test]
    fn test_failures_are_isolated() {
        let tmp = TempDir::new().unwrap();
        let mut store = StateStore::open(tmp.path(), "python").unwrap();
        let batches = vec![
            ReviewBatch::new("naming", &["naming_quality"]),
            ReviewBatch::new("types", &["type_safety"]),
            ReviewBatch::new("broken", &["logic_clarity"]),
            ReviewBatch::new("off-topic", &["error_consistency"]),
        ];

        let outcome = run_batches(
            &mut store,
            &batches,
            &DimensionCatalog::default(),
            &EngineConfig::default(),
            |batch| match batch.name.as_str() {
                "broken" => anyhow::bail!("reviewer timed out"),
                // Answers for a dimension it was not asked about
                "off-topic" => Ok(payload("naming_quality")),
                _ => Ok(payload(&batch.dimensions[0])),
            },
        )
        .unwrap();

        assert_eq!(outcome.imported.len(), 2);
        let mut failed: Vec<&str> = outcome.failed.iter().map(|f| f.batch.as_str()).collect();
        failed.sort();
        assert_eq!(failed, vec!["broken", "off-topic"]);

        let reopened = StateStore::open(tmp.path(), "python").unwrap();
        assert_eq!(reopened.document().finding_count(), 2);
        assert!(reopened.document().assessment("naming_quality").is_some());
        assert!(reopened.document().assessment("type_safety").is_some());
        assert!(reopened.document().assessment("logic_clarity").is_none());
    }
}
