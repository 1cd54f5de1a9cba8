//! Language plugins
//!
//! Per-language behavior lives behind one capability trait. The engine
//! never branches on a language name; it looks the plugin up in a
//! [`LanguageRegistry`] populated once at startup and consumes whatever the
//! plugin supplies:
//!
//! ```text
//! LanguagePlugin
//!   ├─ detectors()          Vec<Arc<dyn Detector>>
//!   ├─ source_units()       every unit, including ones without imports
//!   ├─ dependency_edges()   import edges for the graph analyzers
//!   ├─ entry_points()       files never reported as orphaned
//!   ├─ zone_rules()         extra path → zone category rules
//!   └─ review_dimensions()  extra subjective dimensions
//! ```

use crate::classifier::ZoneRule;
use crate::detectors::{Detector, ScanScope};
use crate::error::{EngineError, EngineResult};
use crate::graph::ImportEdge;
use std::collections::BTreeMap;
use std::sync::Arc;

pub trait LanguagePlugin: Send + Sync {
    /// Ledger key, e.g. `python`
    fn name(&self) -> &'static str;

    fn detectors(&self) -> Vec<Arc<dyn Detector>>;

    /// Import edges between source units under `scope`
    fn dependency_edges(&self, scope: &ScanScope) -> anyhow::Result<Vec<ImportEdge>>;

    /// Units to add as graph nodes even when no edge touches them
    fn source_units(&self, _scope: &ScanScope) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn entry_points(&self, _scope: &ScanScope) -> Vec<String> {
        Vec::new()
    }

    fn zone_rules(&self) -> Vec<ZoneRule> {
        Vec::new()
    }

    fn review_dimensions(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Immutable name → plugin table
#[derive(Default)]
pub struct LanguageRegistry {
    plugins: BTreeMap<&'static str, Arc<dyn LanguagePlugin>>,
}

impl LanguageRegistry {
    pub fn builder() -> LanguageRegistryBuilder {
        LanguageRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> EngineResult<Arc<dyn LanguagePlugin>> {
        self.plugins
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownLanguage(name.to_string()))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[derive(Default)]
pub struct LanguageRegistryBuilder {
    plugins: Vec<Arc<dyn LanguagePlugin>>,
}

impl LanguageRegistryBuilder {
    pub fn register(mut self, plugin: Arc<dyn LanguagePlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Fails on duplicate or empty names
    pub fn build(self) -> EngineResult<LanguageRegistry> {
        let mut plugins = BTreeMap::new();
        for plugin in self.plugins {
            let name = plugin.name();
            if name.trim().is_empty() {
                return Err(EngineError::Config("language plugin with empty name".to_string()));
            }
            if plugins.insert(name, plugin).is_some() {
                return Err(EngineError::Config(format!(
                    "language '{}' registered twice",
                    name
                )));
            }
        }
        Ok(LanguageRegistry { plugins })
    }
}
