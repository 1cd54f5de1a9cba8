//! Engine configuration support
//!
//! Loads per-project configuration from `debtledger.toml` or
//! `.debtledgerrc.json` in the project root.
//!
//! # Configuration Format
//!
//! ```toml
//! # debtledger.toml
//!
//! [detectors.coupling]
//! enabled = true
//! thresholds = { max_degree = 30 }
//!
//! [suspect_guard]
//! threshold = 5
//!
//! [graph]
//! cycle_t3_min_size = 3
//! cycle_t4_min_size = 5
//! coupling_threshold = 20
//! entry_markers = ["main.", "cli."]
//!
//! [scoring]
//! objective_weight = 0.4
//! subjective_weight = 0.6
//!
//! [[zones.rules]]
//! pattern = "**/fixtures/**"
//! category = "test"
//!
//! [review]
//! dimensions = ["naming_quality", "logic_clarity"]
//!
//! [planner]
//! impact_weights = { cycles = 2.0, orphaned = 0.5 }
//!
//! [exclude]
//! paths = ["generated/", "vendor/**"]
//! ```

use crate::models::ZoneCategory;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Engine configuration loaded from debtledger.toml or similar
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngineConfig {
    /// Per-detector configuration overrides
    #[serde(default)]
    pub detectors: HashMap<String, DetectorConfigOverride>,

    #[serde(default)]
    pub suspect_guard: SuspectGuardConfig,

    /// Structural analyzer policy constants
    #[serde(default)]
    pub graph: GraphConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Extra zone rules appended to the built-in heuristics
    #[serde(default)]
    pub zones: ZoneConfig,

    #[serde(default)]
    pub review: ReviewConfig,

    #[serde(default)]
    pub planner: PlannerConfig,

    #[serde(default)]
    pub attestation: AttestationConfig,

    /// Paths never auto-resolved by a scan
    #[serde(default)]
    pub exclude: ExcludeConfig,
}

/// Configuration override for a specific detector
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DetectorConfigOverride {
    /// Whether the detector is enabled (default: true)
    #[serde(default)]
    pub enabled: Option<bool>,

    /// Detector-specific threshold overrides
    #[serde(default)]
    pub thresholds: HashMap<String, ThresholdValue>,
}

/// A threshold value can be an integer, float, boolean or string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ThresholdValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
}

impl ThresholdValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ThresholdValue::Integer(v) => Some(*v),
            ThresholdValue::Float(v) => Some(*v as i64),
            _ => None,
        }
    }
}

/// Suspect guard policy
#[derive(Debug, Clone, Deserialize)]
pub struct SuspectGuardConfig {
    /// Minimum prior open count before a drop to zero is suspicious (default: 5)
    #[serde(default = "default_suspect_threshold")]
    pub threshold: usize,
}

impl Default for SuspectGuardConfig {
    fn default() -> Self {
        Self {
            threshold: default_suspect_threshold(),
        }
    }
}

fn default_suspect_threshold() -> usize {
    5
}

/// Structural analyzer policy constants
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    /// Smallest cycle that is T3 (smaller cycles and self-loops are T2)
    #[serde(default = "default_cycle_t3_min_size")]
    pub cycle_t3_min_size: usize,

    /// Smallest cycle that is T4
    #[serde(default = "default_cycle_t4_min_size")]
    pub cycle_t4_min_size: usize,

    /// fan-in + fan-out above this is a coupling finding
    #[serde(default = "default_coupling_threshold")]
    pub coupling_threshold: usize,

    /// degree / threshold ratio at which coupling becomes T3
    #[serde(default = "default_coupling_t3_ratio")]
    pub coupling_t3_ratio: f64,

    /// degree / threshold ratio at which coupling becomes T4
    #[serde(default = "default_coupling_t4_ratio")]
    pub coupling_t4_ratio: f64,

    /// Path fragments that mark a unit as an entry point for orphan detection
    #[serde(default = "default_entry_markers")]
    pub entry_markers: Vec<String>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            cycle_t3_min_size: default_cycle_t3_min_size(),
            cycle_t4_min_size: default_cycle_t4_min_size(),
            coupling_threshold: default_coupling_threshold(),
            coupling_t3_ratio: default_coupling_t3_ratio(),
            coupling_t4_ratio: default_coupling_t4_ratio(),
            entry_markers: default_entry_markers(),
        }
    }
}

fn default_cycle_t3_min_size() -> usize {
    3
}
fn default_cycle_t4_min_size() -> usize {
    5
}
fn default_coupling_threshold() -> usize {
    20
}
fn default_coupling_t3_ratio() -> f64 {
    1.5
}
fn default_coupling_t4_ratio() -> f64 {
    2.0
}
fn default_entry_markers() -> Vec<String> {
    [
        "main.", "__main__", "index.", "__init__.", "setup.py", "conftest", "lib.rs", "mod.rs",
        "build.rs", "cli.",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Blend weights for the overall health score
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Weight of the mechanical sub-score (default: 0.4)
    #[serde(default = "default_objective_weight")]
    pub objective_weight: f64,

    /// Weight of the subjective sub-score (default: 0.6)
    #[serde(default = "default_subjective_weight")]
    pub subjective_weight: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            objective_weight: default_objective_weight(),
            subjective_weight: default_subjective_weight(),
        }
    }
}

fn default_objective_weight() -> f64 {
    0.4
}
fn default_subjective_weight() -> f64 {
    0.6
}

impl ScoringConfig {
    /// Validate that both weights are non-negative and sum to 1.0 (with tolerance)
    pub fn is_valid(&self) -> bool {
        let usable = |w: f64| w.is_finite() && w >= 0.0;
        let sum = self.objective_weight + self.subjective_weight;
        usable(self.objective_weight) && usable(self.subjective_weight) && (sum - 1.0).abs() < 0.001
    }

    /// Normalize weights to sum to 1.0. Negative or non-finite weights
    /// count as zero; if nothing is left the defaults apply.
    pub fn normalize(&mut self) {
        let clamp = |w: f64| if w.is_finite() && w > 0.0 { w } else { 0.0 };
        let objective = clamp(self.objective_weight);
        let subjective = clamp(self.subjective_weight);
        let sum = objective + subjective;
        if sum > 0.0 {
            self.objective_weight = objective / sum;
            self.subjective_weight = subjective / sum;
        } else {
            *self = Self::default();
        }
    }
}

/// A zone rule: glob pattern mapped to a category
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ZoneRuleConfig {
    pub pattern: String,
    pub category: ZoneCategory,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ZoneConfig {
    #[serde(default)]
    pub rules: Vec<ZoneRuleConfig>,
}

/// Subjective review policy
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewConfig {
    /// Dimensions that count toward the subjective sub-score before any import
    #[serde(default = "default_review_dimensions")]
    pub dimensions: Vec<String>,

    /// Extra dimension names accepted on import beyond the built-in catalog
    #[serde(default)]
    pub custom_dimensions: Vec<String>,

    /// Scores below this require same-dimension feedback (default: 100)
    #[serde(default = "default_feedback_threshold")]
    pub feedback_threshold: f64,

    /// Scores below this require a same-dimension finding (default: 85)
    #[serde(default = "default_finding_threshold")]
    pub finding_threshold: f64,

    /// Concurrent review batches (default: 4)
    #[serde(default = "default_review_workers")]
    pub workers: usize,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            dimensions: default_review_dimensions(),
            custom_dimensions: Vec::new(),
            feedback_threshold: default_feedback_threshold(),
            finding_threshold: default_finding_threshold(),
            workers: default_review_workers(),
        }
    }
}

fn default_review_dimensions() -> Vec<String> {
    [
        "naming_quality",
        "logic_clarity",
        "type_safety",
        "error_consistency",
        "abstraction_fitness",
        "design_coherence",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_feedback_threshold() -> f64 {
    100.0
}
fn default_finding_threshold() -> f64 {
    85.0
}
fn default_review_workers() -> usize {
    4
}

/// Planner ordering and skip policy
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerConfig {
    /// Impact weight per detector; unlisted detectors use `default_impact`
    #[serde(default)]
    pub impact_weights: HashMap<String, f64>,

    #[serde(default = "default_impact")]
    pub default_impact: f64,

    /// Scans after which a temporary skip without explicit review_after resurfaces
    #[serde(default = "default_skip_review_after")]
    pub skip_review_after: u32,

    /// Minimum open findings per detector before an auto cluster is formed
    #[serde(default = "default_auto_cluster_min")]
    pub auto_cluster_min: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            impact_weights: HashMap::new(),
            default_impact: default_impact(),
            skip_review_after: default_skip_review_after(),
            auto_cluster_min: default_auto_cluster_min(),
        }
    }
}

fn default_impact() -> f64 {
    1.0
}
fn default_skip_review_after() -> u32 {
    5
}
fn default_auto_cluster_min() -> usize {
    3
}

impl PlannerConfig {
    pub fn impact_for(&self, detector: &str) -> f64 {
        self.impact_weights
            .get(detector)
            .or_else(|| self.impact_weights.get(&normalize_detector_name(detector)))
            .copied()
            .unwrap_or(self.default_impact)
    }
}

/// Phrases a manual resolution attestation must contain to count as verified
#[derive(Debug, Clone, Deserialize)]
pub struct AttestationConfig {
    #[serde(default = "default_required_phrases")]
    pub required_phrases: Vec<String>,
}

impl Default for AttestationConfig {
    fn default() -> Self {
        Self {
            required_phrases: default_required_phrases(),
        }
    }
}

fn default_required_phrases() -> Vec<String> {
    vec!["i have actually".to_string(), "not gaming".to_string()]
}

impl AttestationConfig {
    /// Case- and whitespace-insensitive check for every required phrase
    pub fn is_valid(&self, attestation: Option<&str>) -> bool {
        let Some(text) = attestation else {
            return false;
        };
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        !normalized.is_empty()
            && self
                .required_phrases
                .iter()
                .all(|p| normalized.contains(&p.to_lowercase()))
    }
}

/// Path exclusion configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ExcludeConfig {
    #[serde(default)]
    pub paths: Vec<String>,
}

/// Load engine configuration from the project root.
///
/// Searches for configuration files in this order:
/// 1. `debtledger.toml`
/// 2. `.debtledgerrc.json`
///
/// Returns default configuration if no config file is found or it fails to
/// parse (the failure is logged).
pub fn load_engine_config(project_root: &Path) -> EngineConfig {
    let toml_path = project_root.join("debtledger.toml");
    if toml_path.exists() {
        match load_toml_config(&toml_path) {
            Ok(config) => {
                debug!("Loaded engine config from {}", toml_path.display());
                return config;
            }
            Err(e) => {
                warn!("Failed to load {}: {}", toml_path.display(), e);
            }
        }
    }

    let json_path = project_root.join(".debtledgerrc.json");
    if json_path.exists() {
        match load_json_config(&json_path) {
            Ok(config) => {
                debug!("Loaded engine config from {}", json_path.display());
                return config;
            }
            Err(e) => {
                warn!("Failed to load {}: {}", json_path.display(), e);
            }
        }
    }

    debug!("No engine config found, using defaults");
    EngineConfig::default()
}

fn load_toml_config(path: &Path) -> anyhow::Result<EngineConfig> {
    let content = std::fs::read_to_string(path)?;
    let mut config: EngineConfig = toml::from_str(&content)?;
    config.finish();
    Ok(config)
}

fn load_json_config(path: &Path) -> anyhow::Result<EngineConfig> {
    let content = std::fs::read_to_string(path)?;
    let mut config: EngineConfig = serde_json::from_str(&content)?;
    config.finish();
    Ok(config)
}

impl EngineConfig {
    fn finish(&mut self) {
        if !self.scoring.is_valid() {
            warn!(
                "Scoring weights sum to {:.3}, normalizing",
                self.scoring.objective_weight + self.scoring.subjective_weight
            );
            self.scoring.normalize();
        }
    }

    fn detector_override(&self, name: &str) -> Option<&DetectorConfigOverride> {
        let normalized = normalize_detector_name(name);
        self.detectors
            .get(&normalized)
            .or_else(|| self.detectors.get(name))
    }

    /// Check if a detector is enabled (defaults to true if not specified)
    pub fn is_detector_enabled(&self, name: &str) -> bool {
        self.detector_override(name)
            .and_then(|c| c.enabled)
            .unwrap_or(true)
    }

    pub fn get_threshold(&self, detector_name: &str, threshold_name: &str) -> Option<&ThresholdValue> {
        self.detector_override(detector_name)
            .and_then(|c| c.thresholds.get(threshold_name))
    }

    pub fn get_threshold_i64(&self, detector_name: &str, threshold_name: &str) -> Option<i64> {
        self.get_threshold(detector_name, threshold_name)
            .and_then(|v| v.as_i64())
    }

    /// Compile the exclude patterns. Bare directory prefixes (`vendor/`)
    /// are widened to match everything beneath them.
    pub fn exclude_set(&self) -> anyhow::Result<GlobSet> {
        build_glob_set(&self.exclude.paths)
    }
}

/// Compile glob patterns, treating `dir/` as `dir/**`.
pub fn build_glob_set(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            continue;
        }
        let expanded = if pattern.ends_with('/') {
            format!("{}**", pattern)
        } else {
            pattern.to_string()
        };
        builder.add(strict_glob(&expanded)?);
        if !pattern.ends_with('/') && !pattern.contains('*') {
            builder.add(strict_glob(&format!("{}/**", pattern))?);
        }
    }
    Ok(builder.build()?)
}

fn strict_glob(pattern: &str) -> anyhow::Result<globset::Glob> {
    Ok(GlobBuilder::new(pattern).literal_separator(true).build()?)
}

/// Normalize detector name for config lookup
/// Converts various formats to kebab-case for matching
pub fn normalize_detector_name(name: &str) -> String {
    // CouplingDetector -> coupling
    // SQLInjectionDetector -> sql-injection
    // orphaned_units -> orphaned-units
    let mut result = String::new();
    let chars: Vec<char> = name.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_is_lower = i > 0 && chars[i - 1].is_lowercase();
            let is_acronym_end = i > 0
                && chars[i - 1].is_uppercase()
                && i + 1 < chars.len()
                && chars[i + 1].is_lowercase();

            if prev_is_lower || is_acronym_end {
                result.push('-');
            }
            result.extend(c.to_lowercase());
        } else if *c == '_' {
            result.push('-');
        } else {
            result.push(*c);
        }
    }

    result.trim_end_matches("-detector").to_string()
}
