//! Error taxonomy for the engine
//!
//! Locally recoverable conditions (a malformed raw record) are logged and
//! skipped by their producer. Everything else surfaces to the caller with
//! the ids, scope, or path needed to act on it. A suspect-guard trip is not
//! an error; see [`crate::state::merge::SuspectWarning`].

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the finding state and scoring engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Malformed finding record #{index}: {reason}")]
    MalformedRecord { index: usize, reason: String },

    #[error("Findings outside scope '{scope}' cannot be resolved: {}", ids.join(", "))]
    ScopeViolation { scope: String, ids: Vec<String> },

    #[error("Review import rejected ({} problem(s)): {}", failures.len(), failures.join("; "))]
    ImportValidation { failures: Vec<String> },

    #[error("State file {} is corrupt: {reason}", path.display())]
    StateCorruption { path: PathBuf, reason: String },

    #[error("Could not lock {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown language: {0}")]
    UnknownLanguage(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used across the engine's public API
pub type EngineResult<T> = Result<T, EngineError>;
