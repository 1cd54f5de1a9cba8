//! Zone classifier
//!
//! Maps a path to a [`ZoneCategory`] and from there to a scored or excluded
//! [`Zone`]. Resolution order:
//!
//! 1. Manual override persisted in the state document (exact path or
//!    directory prefix, longest wins)
//! 2. Configured rules, in file order
//! 3. Language plugin rules, in registration order
//! 4. Built-in heuristics: generated > vendor > test > config > script
//! 5. Production

use crate::config::{EngineConfig, ZoneRuleConfig};
use crate::error::{EngineError, EngineResult};
use crate::models::{normalize_path, Finding, ZoneCategory};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::BTreeMap;

pub use crate::config::ZoneRuleConfig as ZoneRule;

const GENERATED_PATTERNS: &[&str] = &[
    "**/generated/**",
    "**/__generated__/**",
    "**/*_pb2.py",
    "**/*_pb2_grpc.py",
    "**/*.pb.go",
    "**/*.pb.rs",
    "**/*.generated.*",
    "**/*_generated.*",
    "**/*.g.dart",
    "**/*.min.js",
    "**/*.d.ts",
];

const VENDOR_PATTERNS: &[&str] = &[
    "**/vendor/**",
    "**/vendored/**",
    "**/third_party/**",
    "**/node_modules/**",
    "**/site-packages/**",
    "**/.venv/**",
];

const TEST_PATTERNS: &[&str] = &[
    "**/test/**",
    "**/tests/**",
    "**/__tests__/**",
    "**/spec/**",
    "**/testdata/**",
    "**/test_*.py",
    "**/*_test.py",
    "**/*_test.go",
    "**/*_test.rs",
    "**/*.test.*",
    "**/*.spec.*",
    "**/conftest.py",
];

const CONFIG_PATTERNS: &[&str] = &[
    "**/*.toml",
    "**/*.yaml",
    "**/*.yml",
    "**/*.ini",
    "**/*.cfg",
    "**/*.json",
    "**/setup.py",
    "**/conf.py",
    "**/*.config.js",
    "**/*.config.ts",
    "**/*.config.mjs",
];

const SCRIPT_PATTERNS: &[&str] = &["**/scripts/**", "**/bin/**", "**/tools/**", "**/*.sh"];

fn compile(patterns: impl IntoIterator<Item = String>) -> EngineResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(&pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| EngineError::Config(format!("bad zone pattern '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| EngineError::Config(format!("zone rules: {}", e)))
}

/// Ordered rule list where the first matching rule wins
struct RuleList {
    set: GlobSet,
    categories: Vec<ZoneCategory>,
}

impl RuleList {
    fn new(rules: &[ZoneRule]) -> EngineResult<Self> {
        Ok(Self {
            set: compile(rules.iter().map(|r| r.pattern.clone()))?,
            categories: rules.iter().map(|r| r.category).collect(),
        })
    }

    fn first_match(&self, path: &str) -> Option<ZoneCategory> {
        self.set
            .matches(path)
            .into_iter()
            .min()
            .map(|idx| self.categories[idx])
    }
}

/// Path to zone classifier
pub struct ZoneClassifier {
    custom: RuleList,
    builtin: Vec<(ZoneCategory, GlobSet)>,
}

impl ZoneClassifier {
    /// Classifier with the built-in heuristics plus `rules` checked first
    pub fn new(rules: &[ZoneRule]) -> EngineResult<Self> {
        let table: [(ZoneCategory, &[&str]); 5] = [
            (ZoneCategory::Generated, GENERATED_PATTERNS),
            (ZoneCategory::Vendor, VENDOR_PATTERNS),
            (ZoneCategory::Test, TEST_PATTERNS),
            (ZoneCategory::Config, CONFIG_PATTERNS),
            (ZoneCategory::Script, SCRIPT_PATTERNS),
        ];
        let mut builtin = Vec::with_capacity(table.len());
        for (category, patterns) in table {
            builtin.push((category, compile(patterns.iter().map(|p| p.to_string()))?));
        }
        Ok(Self {
            custom: RuleList::new(rules)?,
            builtin,
        })
    }

    /// Configured rules first, then the language plugin's
    pub fn from_config(config: &EngineConfig, plugin_rules: &[ZoneRule]) -> EngineResult<Self> {
        let mut rules: Vec<ZoneRuleConfig> = config.zones.rules.clone();
        rules.extend(plugin_rules.iter().cloned());
        Self::new(&rules)
    }

    /// Heuristic category, ignoring manual overrides
    pub fn classify_heuristic(&self, path: &str) -> ZoneCategory {
        let path = normalize_path(path);
        if let Some(category) = self.custom.first_match(&path) {
            return category;
        }
        self.builtin
            .iter()
            .find(|(_, set)| set.is_match(&path))
            .map(|(category, _)| *category)
            .unwrap_or(ZoneCategory::Production)
    }

    pub fn classify(&self, path: &str, overrides: &BTreeMap<String, ZoneCategory>) -> ZoneCategory {
        override_for(path, overrides).unwrap_or_else(|| self.classify_heuristic(path))
    }

    /// Re-zone a finding in place
    pub fn apply(&self, finding: &mut Finding, overrides: &BTreeMap<String, ZoneCategory>) {
        let category = self.classify(&finding.file, overrides);
        finding.zone_category = category;
        finding.zone = category.zone();
    }
}

/// Longest override that equals `path` or is one of its parent directories
pub fn override_for(path: &str, overrides: &BTreeMap<String, ZoneCategory>) -> Option<ZoneCategory> {
    let path = normalize_path(path);
    overrides
        .iter()
        .filter(|(key, _)| {
            path == **key || key.as_str() == "." || path.starts_with(&format!("{}/", key))
        })
        .max_by_key(|(key, _)| if key.as_str() == "." { 0 } else { key.len() })
        .map(|(_, category)| *category)
}
