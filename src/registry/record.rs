//! Persisted module registry data model
//!
//! The registry is the root aggregate: a content-id version counter plus the
//! installed modules in install order, each carrying its dependency records.
//! It is persisted as one tree through the internal file plugin; every
//! transaction replaces it wholesale.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::{MetaError, Result};
use crate::plugin::{DatastoreKind, DsBindings};

/// A path-reference dependency on another module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafrefDep {
    /// Canonical resolved target path
    pub target_path: String,
    /// Foreign module the path reaches into
    pub target_module: String,
}

/// An instance-locator dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceIdDep {
    /// Canonical data path of the locator node itself
    pub source_path: String,
    /// Canonical target path of the node's default value, when the default
    /// points into a foreign module
    pub default_target_path: Option<String>,
}

/// A conditional-expression dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XPathDep {
    /// Canonical expression text
    pub expression: String,
    /// Distinct foreign modules the expression may touch; may be empty
    pub target_modules: Vec<String>,
}

/// Dependency records collected for one schema subtree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySection {
    pub lrefs: Vec<LeafrefDep>,
    pub inst_ids: Vec<InstanceIdDep>,
    pub xpaths: Vec<XPathDep>,
}

impl DependencySection {
    pub fn is_empty(&self) -> bool {
        self.lrefs.is_empty() && self.inst_ids.is_empty() && self.xpaths.is_empty()
    }

    /// Modules referenced by this section (with duplicates)
    pub(crate) fn target_modules(&self) -> impl Iterator<Item = &str> {
        self.lrefs
            .iter()
            .map(|l| l.target_module.as_str())
            .chain(
                self.xpaths
                    .iter()
                    .flat_map(|x| x.target_modules.iter().map(String::as_str)),
            )
    }
}

/// Dependencies of one request/reply-style operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcDeps {
    /// Canonical data path of the operation, the entry key
    pub path: String,
    /// Dependencies of the input subtree
    pub input: DependencySection,
    /// Dependencies of the output subtree
    pub output: DependencySection,
}

/// Dependencies of one event-style operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifDeps {
    /// Canonical data path of the notification, the entry key
    pub path: String,
    pub deps: DependencySection,
}

/// Replay-support marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySupport {
    /// Earliest notification instant replay can serve
    pub earliest_notif: SystemTime,
}

/// One storage plugin binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginBinding {
    pub datastore: DatastoreKind,
    pub plugin: String,
}

/// One installed module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// Module name, unique within the registry
    pub name: String,
    /// Revision label at install/update time
    pub revision: Option<String>,
    /// Enabled feature names, ordered
    pub enabled_features: Vec<String>,
    /// One storage plugin per datastore kind
    pub plugins: Vec<PluginBinding>,
    /// Present while event replay is enabled for the module
    pub replay_support: Option<ReplaySupport>,
    /// Data dependencies of the module's own tree
    pub deps: DependencySection,
    /// Request/reply operations with dependencies, keyed by path
    pub rpcs: Vec<RpcDeps>,
    /// Event operations with dependencies, keyed by path
    pub notifications: Vec<NotifDeps>,
    /// Names of modules whose dependencies reference this one; derived
    pub inverse_deps: Vec<String>,
}

impl ModuleRecord {
    /// Fresh record with no dependency data
    pub fn new(name: &str, revision: Option<&str>, bindings: &DsBindings) -> Self {
        Self {
            name: name.to_string(),
            revision: revision.map(str::to_string),
            enabled_features: Vec::new(),
            plugins: DatastoreKind::ALL
                .iter()
                .map(|&ds| PluginBinding {
                    datastore: ds,
                    plugin: bindings.get(ds).to_string(),
                })
                .collect(),
            replay_support: None,
            deps: DependencySection::default(),
            rpcs: Vec::new(),
            notifications: Vec::new(),
            inverse_deps: Vec::new(),
        }
    }

    /// Drop all dependency data (including derived inverse deps)
    fn clear_deps(&mut self) {
        self.deps = DependencySection::default();
        self.rpcs.clear();
        self.notifications.clear();
        self.inverse_deps.clear();
    }

    /// Record an inverse dependency unless already present
    pub(crate) fn add_inverse_dep(&mut self, module: &str) {
        if !self.inverse_deps.iter().any(|m| m == module) {
            self.inverse_deps.push(module.to_string());
        }
    }
}

/// The persisted registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    /// Version counter, bumped exactly once per schema-changing transaction
    pub content_id: u32,
    /// Installed modules in install order
    pub modules: Vec<ModuleRecord>,
}

impl Registry {
    /// Find a module record by name
    pub fn module(&self, name: &str) -> Option<&ModuleRecord> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Find a module record by name, mutably
    pub fn module_mut(&mut self, name: &str) -> Option<&mut ModuleRecord> {
        self.modules.iter_mut().find(|m| m.name == name)
    }

    /// Detach a module record
    pub(crate) fn detach(&mut self, name: &str) -> Option<ModuleRecord> {
        let idx = self.modules.iter().position(|m| m.name == name)?;
        Some(self.modules.remove(idx))
    }

    /// Drop every dependency record across the whole registry
    pub(crate) fn clear_deps_all(&mut self) {
        for module in &mut self.modules {
            module.clear_deps();
        }
    }

    /// Check the invariants owed before persisting
    pub(crate) fn validate(&self) -> Result<()> {
        if self.content_id == 0 {
            return Err(MetaError::internal("registry content-id is zero"));
        }
        for (i, module) in self.modules.iter().enumerate() {
            if self.modules[..i].iter().any(|m| m.name == module.name) {
                return Err(MetaError::internal(format!(
                    "duplicate module record \"{}\"",
                    module.name
                )));
            }
            for inv in &module.inverse_deps {
                if self.module(inv).is_none() {
                    return Err(MetaError::internal(format!(
                        "inverse dependency of \"{}\" names uninstalled module \"{}\"",
                        module.name, inv
                    )));
                }
            }
        }
        Ok(())
    }

    /// Encode for persistence
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| MetaError::internal(format!("registry encode: {e}")))
    }

    /// Decode a persisted registry
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| MetaError::internal(format!("registry decode: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> ModuleRecord {
        ModuleRecord::new(name, Some("2024-01-01"), &DsBindings::default())
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut registry = Registry {
            content_id: 3,
            modules: vec![record("a"), record("b")],
        };
        registry.modules[0].deps.lrefs.push(LeafrefDep {
            target_path: "/b:things/thing/name".to_string(),
            target_module: "b".to_string(),
        });
        registry.modules[1].add_inverse_dep("a");
        registry.modules[0].replay_support = Some(ReplaySupport {
            earliest_notif: SystemTime::UNIX_EPOCH,
        });

        let decoded = Registry::decode(&registry.encode().unwrap()).unwrap();
        assert_eq!(decoded, registry);
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let registry = Registry {
            content_id: 1,
            modules: vec![record("dup"), record("dup")],
        };
        assert!(registry.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_dangling_inverse_dep() {
        let mut registry = Registry {
            content_id: 1,
            modules: vec![record("a")],
        };
        registry.modules[0].add_inverse_dep("ghost");
        assert!(registry.validate().is_err());
    }

    #[test]
    fn test_inverse_dep_dedup() {
        let mut rec = record("a");
        rec.add_inverse_dep("x");
        rec.add_inverse_dep("x");
        assert_eq!(rec.inverse_deps, ["x"]);
    }
}
