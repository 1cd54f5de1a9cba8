//! Detectors and structural analyzers
//!
//! This module provides the detector framework and the graph-based analyzers
//! that feed raw findings into the normalizer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     DetectorEngine                          │
//! │  - Registers plugin detectors and graph analyzers           │
//! │  - Runs them once per scan, isolating failures              │
//! │  - Collects raw records and a summary                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┴───────────────┐
//!              ▼                               ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │ Detector trait           │   │ GraphAnalyzer trait          │
//! │ (supplied by language    │   │ (pure functions of the       │
//! │  plugins: AST checks,    │   │  DependencyGraph: cycles,    │
//! │  external linters)       │   │  orphans, coupling)          │
//! └──────────────────────────┘   └──────────────────────────────┘
//! ```

mod base;
pub mod circular_dependency;
pub mod coupling;
mod engine;
pub mod orphaned;

pub use base::{
    DetectionSummary, Detector, DetectorResult, GraphAnalyzer, RawFinding, ScanScope,
};
pub use circular_dependency::CycleAnalyzer;
pub use coupling::CouplingAnalyzer;
pub use engine::{DetectionOutcome, DetectorEngine};
pub use orphaned::OrphanAnalyzer;
