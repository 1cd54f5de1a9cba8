//! debtledger - finding state and scoring engine
//!
//! Tracks code-quality findings across repeated scans, reconciles them into a
//! per-language ledger, computes a gaming-resistant health score, and orders
//! remediation work.
//!
//! Data flow:
//!
//! ```text
//! raw detector output ─► Normalizer ─► Zone Classifier ─► Merge Engine ─► StateStore
//!                                                                           │
//!                                                    Scoring Engine ◄───────┤
//!                                                    Planner        ◄───────┘
//! ```
//!
//! Dependency graphs are built per scan by [`graph::GraphBuilder`] and fed to
//! the structural analyzers in [`detectors`]. Per-language behavior comes
//! from [`lang::LanguagePlugin`] implementations registered once in a
//! [`lang::LanguageRegistry`].

pub mod classifier;
pub mod config;
pub mod detectors;
pub mod error;
pub mod graph;
pub mod lang;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod plan;
pub mod review;
pub mod scoring;
pub mod state;

pub use error::{EngineError, EngineResult};
pub use models::{Finding, ScanRun, Status, Tier, Zone, ZoneCategory};
pub use state::{StateDocument, StateStore};
