//! On-disk ledger persistence
//!
//! ```text
//! <state_dir>/
//!   state-<language>.json   pretty JSON, versioned
//!   state-<language>.lock   advisory lock for writers
//! ```
//!
//! Writers go through [`StateStore::update`]: take the exclusive file lock,
//! reload the last committed document, run the mutation on a copy, and on
//! success write it to a temp file and rename it over the ledger. A failed
//! mutation leaves both the file and the in-memory document untouched.
//!
//! A ledger that cannot be read back is reported as
//! [`EngineError::StateCorruption`] and never silently replaced.

use crate::error::{EngineError, EngineResult};
use crate::state::{StateDocument, STATE_VERSION};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub fn state_path(state_dir: &Path, language: &str) -> PathBuf {
    state_dir.join(format!("state-{}.json", language))
}

fn lock_path(state_dir: &Path, language: &str) -> PathBuf {
    state_dir.join(format!("state-{}.lock", language))
}

/// Handle on one language's ledger
pub struct StateStore {
    path: PathBuf,
    lock_path: PathBuf,
    language: String,
    document: StateDocument,
}

impl StateStore {
    /// Open the ledger for `language` under `state_dir`, creating an empty
    /// document (not yet written) when none exists.
    pub fn open(state_dir: &Path, language: &str) -> EngineResult<Self> {
        let path = state_path(state_dir, language);
        let document = load_document(&path, language)?;
        Ok(Self {
            lock_path: lock_path(state_dir, language),
            path,
            language: language.to_string(),
            document,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Last committed document
    pub fn document(&self) -> &StateDocument {
        &self.document
    }

    /// Re-read the ledger from disk
    pub fn reload(&mut self) -> EngineResult<()> {
        self.document = load_document(&self.path, &self.language)?;
        Ok(())
    }

    /// Apply `mutation` under the exclusive lock and persist the result.
    pub fn update<T>(
        &mut self,
        mutation: impl FnOnce(&mut StateDocument) -> EngineResult<T>,
    ) -> EngineResult<T> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|source| EngineError::Lock {
                path: self.lock_path.clone(),
                source,
            })?;
        let mut lock = fd_lock::RwLock::new(lock_file);
        let _guard = lock.write().map_err(|source| EngineError::Lock {
            path: self.lock_path.clone(),
            source,
        })?;

        // Another writer may have committed since we last looked.
        let mut working = load_document(&self.path, &self.language)?;
        let value = mutation(&mut working)?;
        write_document(&self.path, &working)?;
        self.document = working;
        Ok(value)
    }
}

fn load_document(path: &Path, language: &str) -> EngineResult<StateDocument> {
    if !path.exists() {
        debug!("No ledger at {:?}, starting empty", path);
        return Ok(StateDocument::new(language));
    }

    let corruption = |reason: String| EngineError::StateCorruption {
        path: path.to_path_buf(),
        reason,
    };

    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Err(corruption("file is empty".to_string()));
    }
    let value: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| corruption(format!("invalid JSON: {}", e)))?;

    let version = value
        .get("version")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| corruption("missing schema version".to_string()))?;
    if version != u64::from(STATE_VERSION) {
        return Err(corruption(format!(
            "unsupported schema version {} (expected {})",
            version, STATE_VERSION
        )));
    }

    let document: StateDocument =
        serde_json::from_value(value).map_err(|e| corruption(format!("invalid ledger: {}", e)))?;
    if document.language() != language {
        return Err(corruption(format!(
            "ledger belongs to '{}', not '{}'",
            document.language(),
            language
        )));
    }

    debug!(
        "Loaded {} ledger with {} findings",
        language,
        document.finding_count()
    );
    Ok(document)
}

fn write_document(path: &Path, document: &StateDocument) -> EngineResult<()> {
    // Write to temp file first, then rename (atomic on POSIX)
    let tmp_file = path.with_extension("json.tmp");
    {
        let file = File::create(&tmp_file)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, document)?;
        writer.flush()?;
    }
    fs::rename(&tmp_file, path)?;
    info!(
        "Saved {} ledger ({} findings, scan {})",
        document.language(),
        document.finding_count(),
        document.scan_count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::state::merge::{merge_scan, MergeOptions};
    use crate::state::test_support::{records, run};
    use tempfile::TempDir;

    #[test]
    fn test_open_missing_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::open(tmp.path(), "python").unwrap();
        assert_eq!(store.document().finding_count(), 0);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_update_persists() {
        let tmp = TempDir::new().unwrap();
        let mut store = StateStore::open(tmp.path(), "python").unwrap();
        let report = store
            .update(|doc| {
                merge_scan(
                    doc,
                    &run(".", &records("unused", "src", 3)),
                    &MergeOptions::default(),
                    &EngineConfig::default(),
                )
            })
            .unwrap();
        assert_eq!(report.new.len(), 3);

        let reopened = StateStore::open(tmp.path(), "python").unwrap();
        assert_eq!(reopened.document(), store.document());
        assert_eq!(reopened.document().finding_count(), 3);
    }

    #[test]
    fn test_failed_update_changes_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut store = StateStore::open(tmp.path(), "python").unwrap();
        store
            .update(|doc| {
                merge_scan(
                    doc,
                    &run(".", &records("unused", "src", 1)),
                    &MergeOptions::default(),
                    &EngineConfig::default(),
                )
            })
            .unwrap();
        let on_disk = fs::read_to_string(store.path()).unwrap();
        let before = store.document().clone();

        let result: EngineResult<()> = store.update(|doc| {
            doc.scan_count += 10;
            Err(EngineError::InvalidCommand("nope".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(store.document(), &before);
        assert_eq!(fs::read_to_string(store.path()).unwrap(), on_disk);
    }

    #[test]
    fn test_corrupt_ledger_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let path = state_path(tmp.path(), "python");

        fs::write(&path, "").unwrap();
        assert!(matches!(
            StateStore::open(tmp.path(), "python"),
            Err(EngineError::StateCorruption { .. })
        ));

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            StateStore::open(tmp.path(), "python"),
            Err(EngineError::StateCorruption { .. })
        ));

        let mut doc = serde_json::to_value(StateDocument::new("python")).unwrap();
        doc["version"] = serde_json::json!(99);
        fs::write(&path, doc.to_string()).unwrap();
        assert!(matches!(
            StateStore::open(tmp.path(), "python"),
            Err(EngineError::StateCorruption { .. })
        ));

        // The broken file is left for the user to inspect.
        assert!(path.exists());
    }

    #[test]
    fn test_language_mismatch_is_corruption() {
        let tmp = TempDir::new().unwrap();
        let doc = StateDocument::new("rust");
        fs::write(state_path(tmp.path(), "python"), serde_json::to_string(&doc).unwrap()).unwrap();
        assert!(matches!(
            StateStore::open(tmp.path(), "python"),
            Err(EngineError::StateCorruption { .. })
        ));
    }
}
