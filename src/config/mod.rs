//! Configuration module for debtledger
//!
//! This module handles:
//! - Engine configuration (debtledger.toml / .debtledgerrc.json)
//! - Detector enable flags and threshold overrides
//! - Policy constants for the suspect guard, analyzers, scoring and planning

mod engine_config;

pub use engine_config::{
    build_glob_set,
    load_engine_config,
    normalize_detector_name,
    AttestationConfig,
    DetectorConfigOverride,
    EngineConfig,
    ExcludeConfig,
    GraphConfig,
    PlannerConfig,
    ReviewConfig,
    ScoringConfig,
    SuspectGuardConfig,
    ThresholdValue,
    ZoneConfig,
    ZoneRuleConfig,
};
