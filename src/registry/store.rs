//! Module metadata store
//!
//! Owns the persisted registry and runs every transaction against it: each
//! operation is one load → mutate → recompute → persist cycle. Persistence
//! happens exactly once, after validation, so a failure at any step leaves
//! the stored registry untouched. Callers must serialize mutating
//! transactions externally (the datastore's lock manager does, built on the
//! [`crate::cond`] primitive).
//!
//! Dependency data is never patched incrementally: any transaction that
//! changes the module set, enabled features, or revisions deletes every
//! dependency record in the registry and recomputes all of them from the
//! current compiled schema, then re-derives inverse dependencies from
//! scratch.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::info;

use crate::error::{MetaError, Result};
use crate::plugin::{DatastoreKind, DatastorePlugin, DsBindings, NotificationLog};
use crate::registry::collector::collect_module;
use crate::registry::record::{ModuleRecord, Registry, ReplaySupport};
use crate::schema::{ModuleId, SchemaContext};

/// Module name the registry tree itself is persisted under
pub const REGISTRY_MODULE: &str = "modstore";

/// Built-in schema modules that must be compiled and implemented in every
/// context the store bootstraps from
pub const BUILTIN_MODULES: &[&str] = &["modstore", "datastores", "module-library"];

/// Identity-keyed set of modules already handled by the running transaction
///
/// Owned by the top-level operation and threaded through the recursive
/// import walk to break import cycles; also returned to the caller as the
/// list of modules the transaction actually installed, in install order.
#[derive(Debug, Default)]
pub struct ModuleSet {
    order: Vec<ModuleId>,
    seen: HashSet<ModuleId>,
}

impl ModuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: ModuleId) -> bool {
        self.seen.contains(&id)
    }

    fn insert(&mut self, id: ModuleId) {
        if self.seen.insert(id) {
            self.order.push(id);
        }
    }

    /// Modules in insertion order
    pub fn iter(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Logging mode of the recursive install walk
///
/// `Primary` logs the first actually-installed module as the primary install
/// and degrades to `Dependency` for the rest of that walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstallLog {
    Silent,
    Primary,
    Dependency,
}

/// The module metadata store
pub struct ModuleStore {
    plugin: Arc<dyn DatastorePlugin>,
    default_bindings: DsBindings,
}

impl ModuleStore {
    /// Create a store persisting through the given plugin with default
    /// plugin bindings for bootstrap-installed modules
    pub fn new(plugin: Arc<dyn DatastorePlugin>) -> Self {
        Self {
            plugin,
            default_bindings: DsBindings::default(),
        }
    }

    /// Override the bindings assigned to bootstrap-installed modules
    pub fn with_default_bindings(plugin: Arc<dyn DatastorePlugin>, bindings: DsBindings) -> Self {
        Self {
            plugin,
            default_bindings: bindings,
        }
    }

    /// Open a store persisting through the internal file plugin rooted at
    /// the configured data directory
    pub fn open(config: &crate::config::StoreConfig) -> Result<Self> {
        let plugin = crate::plugin::FilePlugin::new(&config.data_dir)?;
        Ok(Self::new(Arc::new(plugin)))
    }

    /// Load the persisted registry
    ///
    /// With `allow_create`, a missing registry triggers bootstrap: every
    /// implemented module known to the engine is registered and the result
    /// persisted. Without it, a missing registry is an internal error (the
    /// caller expected an initialized store).
    pub fn load(&self, ctx: &SchemaContext, allow_create: bool) -> Result<Registry> {
        match self.read_persisted()? {
            Some(registry) => Ok(registry),
            None if allow_create => self.create(ctx),
            None => Err(MetaError::internal("no persisted registry")),
        }
    }

    /// Install a module and its transitively implemented imports
    ///
    /// Modules already present are skipped but their imports are still
    /// followed: a previously registered module may pull in newly
    /// implemented transitive imports. `mod_set` collects what was actually
    /// installed, for the caller's per-module initialization.
    pub fn install_module(
        &self,
        ctx: &SchemaContext,
        name: &str,
        bindings: &DsBindings,
        mod_set: &mut ModuleSet,
    ) -> Result<Registry> {
        let id = ctx
            .module_id(name)
            .ok_or_else(|| MetaError::schema(format!("module \"{name}\" not in context")))?;

        let mut registry = self.load(ctx, false)?;
        self.add_module_with_imps(ctx, &mut registry, id, bindings, InstallLog::Primary, mod_set)?;

        if !mod_set.is_empty() {
            registry.content_id += 1;
        }
        self.recompute_deps(ctx, &mut registry)?;
        self.persist(&registry)?;
        Ok(registry)
    }

    /// Remove modules in one batch
    ///
    /// The removed records are detached into a separate registry returned to
    /// the caller for module-specific cleanup; they keep the dependency data
    /// they had when last persisted. `ctx` must already reflect the
    /// post-removal module set.
    pub fn remove_modules(
        &self,
        ctx: &SchemaContext,
        names: &[&str],
    ) -> Result<(Registry, Registry)> {
        let mut registry = self.load(ctx, false)?;

        let mut removed = Registry {
            content_id: registry.content_id,
            modules: Vec::new(),
        };
        for &name in names {
            let record = registry
                .detach(name)
                .ok_or_else(|| MetaError::internal(format!("module \"{name}\" not installed")))?;
            removed.modules.push(record);
            info!("Module \"{}\" removed", name);
        }

        if !names.is_empty() {
            registry.content_id += 1;
        }
        self.recompute_deps(ctx, &mut registry)?;
        self.persist(&registry)?;
        Ok((removed, registry))
    }

    /// Replace a module's stored revision with the one in `ctx`
    pub fn update_module(&self, ctx: &SchemaContext, name: &str) -> Result<Registry> {
        let id = ctx
            .module_id(name)
            .ok_or_else(|| MetaError::schema(format!("module \"{name}\" not in context")))?;
        let revision = ctx
            .module(id)
            .revision
            .clone()
            .ok_or_else(|| MetaError::internal(format!("updated module \"{name}\" has no revision")))?;

        let mut registry = self.load(ctx, false)?;
        let record = registry
            .module_mut(name)
            .ok_or_else(|| MetaError::internal(format!("module \"{name}\" not installed")))?;
        record.revision = Some(revision);

        registry.content_id += 1;
        self.recompute_deps(ctx, &mut registry)?;
        self.persist(&registry)?;
        info!("Module \"{}\" updated", name);
        Ok(registry)
    }

    /// Enable or disable one feature of a module
    ///
    /// `ctx` must already reflect the new feature state; feature state
    /// changes which schema nodes and constraints are reachable, so the full
    /// dependency recomputation runs as for any schema change.
    pub fn set_feature(
        &self,
        ctx: &SchemaContext,
        name: &str,
        feature: &str,
        enable: bool,
    ) -> Result<Registry> {
        let mut registry = self.load(ctx, false)?;
        let record = registry
            .module_mut(name)
            .ok_or_else(|| MetaError::schema(format!("module \"{name}\" not installed")))?;

        if enable {
            if record.enabled_features.iter().any(|f| f == feature) {
                return Err(MetaError::schema(format!(
                    "feature \"{feature}\" already enabled in module \"{name}\""
                )));
            }
            record.enabled_features.push(feature.to_string());
            info!("Module \"{}\" feature \"{}\" enabled", name, feature);
        } else {
            let idx = record
                .enabled_features
                .iter()
                .position(|f| f == feature)
                .ok_or_else(|| {
                    MetaError::schema(format!(
                        "feature \"{feature}\" not enabled in module \"{name}\""
                    ))
                })?;
            record.enabled_features.remove(idx);
            info!("Module \"{}\" feature \"{}\" disabled", name, feature);
        }

        registry.content_id += 1;
        self.recompute_deps(ctx, &mut registry)?;
        self.persist(&registry)?;
        Ok(registry)
    }

    /// Enable or disable replay support for one module or for all of them
    ///
    /// Enabling stamps the marker with the earliest retained notification
    /// timestamp from the log, falling back to the current time when nothing
    /// is retained. Returns the names whose flag actually flipped; no-op
    /// transitions are excluded. Not a schema change: dependencies and the
    /// content-id are untouched.
    pub fn set_replay_support(
        &self,
        ctx: &SchemaContext,
        module: Option<&str>,
        enable: bool,
        log: &dyn NotificationLog,
    ) -> Result<(Registry, Vec<String>)> {
        let mut registry = self.load(ctx, false)?;
        let mut changed = Vec::new();

        match module {
            Some(name) => {
                let record = registry.module_mut(name).ok_or_else(|| {
                    MetaError::internal(format!("module \"{name}\" not installed"))
                })?;
                Self::update_replay_support(record, enable, log, &mut changed)?;
            }
            None => {
                for record in &mut registry.modules {
                    Self::update_replay_support(record, enable, log, &mut changed)?;
                }
            }
        }

        self.persist(&registry)?;
        Ok((registry, changed))
    }

    fn update_replay_support(
        record: &mut ModuleRecord,
        enable: bool,
        log: &dyn NotificationLog,
        changed: &mut Vec<String>,
    ) -> Result<()> {
        if !enable && record.replay_support.is_some() {
            record.replay_support = None;
            changed.push(record.name.clone());
            info!("Module \"{}\" replay support disabled", record.name);
        } else if enable && record.replay_support.is_none() {
            // earliest stored notification, or now if none retained
            let earliest = log
                .earliest(&record.name)?
                .unwrap_or_else(SystemTime::now);
            record.replay_support = Some(ReplaySupport {
                earliest_notif: earliest,
            });
            changed.push(record.name.clone());
            info!("Module \"{}\" replay support enabled", record.name);
        }
        Ok(())
    }

    /// Bootstrap: build and persist the initial registry
    fn create(&self, ctx: &SchemaContext) -> Result<Registry> {
        for &builtin in BUILTIN_MODULES {
            if ctx.module_id(builtin).is_none() {
                return Err(MetaError::internal(format!(
                    "built-in module \"{builtin}\" missing from context"
                )));
            }
        }

        let mut registry = Registry {
            content_id: 1,
            modules: Vec::new(),
        };
        let mut mod_set = ModuleSet::new();

        for (id, module) in ctx.implemented_modules() {
            self.add_module_with_imps(
                ctx,
                &mut registry,
                id,
                &self.default_bindings,
                InstallLog::Silent,
                &mut mod_set,
            )?;
            info!("Internal module \"{}\" installed", module.name);
        }

        self.recompute_deps(ctx, &mut registry)?;
        self.persist(&registry)?;
        Ok(registry)
    }

    /// Add one module record, without imports
    fn add_module(
        &self,
        registry: &mut Registry,
        ctx: &SchemaContext,
        id: ModuleId,
        bindings: &DsBindings,
    ) -> Result<()> {
        let module = ctx.module(id);
        let mut record = ModuleRecord::new(&module.name, module.revision.as_deref(), bindings);
        record.enabled_features = module.features.clone();
        registry.modules.push(record);
        Ok(())
    }

    /// Add a module and all of its implemented imports, recursively
    fn add_module_with_imps(
        &self,
        ctx: &SchemaContext,
        registry: &mut Registry,
        id: ModuleId,
        bindings: &DsBindings,
        mode: InstallLog,
        mod_set: &mut ModuleSet,
    ) -> Result<()> {
        let module = ctx.module(id);
        let mut mode = mode;

        if module.implemented {
            if mod_set.contains(id) {
                // installed in this batch, nothing else to do
                return Ok(());
            }
            if registry.module(&module.name).is_none() {
                self.add_module(registry, ctx, id, bindings)?;
                mod_set.insert(id);

                match mode {
                    InstallLog::Primary => {
                        info!("Module \"{}\" installed", module.name);
                        // the rest of the walk installs dependencies
                        mode = InstallLog::Dependency;
                    }
                    InstallLog::Dependency => {
                        info!("Dependency module \"{}\" installed", module.name);
                    }
                    InstallLog::Silent => {}
                }
            }
            // else: installed before, but its imports may carry newly
            // implemented modules anyway
        }

        for i in 0..ctx.module(id).imports.len() {
            let import = ctx.module(id).imports[i];
            self.add_module_with_imps(ctx, registry, import, bindings, mode, mod_set)?;
        }
        for i in 0..ctx.module(id).includes.len() {
            for j in 0..ctx.module(id).includes[i].imports.len() {
                let import = ctx.module(id).includes[i].imports[j];
                self.add_module_with_imps(ctx, registry, import, bindings, mode, mod_set)?;
            }
        }

        Ok(())
    }

    /// Rebuild every dependency record in the registry from `ctx`
    fn recompute_deps(&self, ctx: &SchemaContext, registry: &mut Registry) -> Result<()> {
        registry.clear_deps_all();

        for i in 0..registry.modules.len() {
            let name = registry.modules[i].name.clone();
            let id = ctx.module_id(&name).ok_or_else(|| {
                MetaError::internal(format!("installed module \"{name}\" missing from context"))
            })?;
            if !ctx.module(id).implemented {
                return Err(MetaError::internal(format!(
                    "installed module \"{name}\" not implemented in context"
                )));
            }

            let (deps, rpcs, notifications) = collect_module(ctx, id)?;
            let record = &mut registry.modules[i];
            record.deps = deps;
            record.rpcs = rpcs;
            record.notifications = notifications;
        }

        // derive inverse deps from the module-level sections
        let mut edges = Vec::new();
        for record in &registry.modules {
            for target in record.deps.target_modules() {
                edges.push((target.to_string(), record.name.clone()));
            }
        }
        for (target, dependent) in edges {
            let record = registry.module_mut(&target).ok_or_else(|| {
                MetaError::internal(format!(
                    "dependency of \"{dependent}\" targets uninstalled module \"{target}\""
                ))
            })?;
            record.add_inverse_dep(&dependent);
        }

        Ok(())
    }

    fn read_persisted(&self) -> Result<Option<Registry>> {
        self.plugin
            .load(REGISTRY_MODULE, DatastoreKind::Startup)?
            .map(|bytes| Registry::decode(&bytes))
            .transpose()
    }

    /// Validate and store the registry, exactly once per transaction
    fn persist(&self, registry: &Registry) -> Result<()> {
        registry.validate()?;
        let encoded = registry.encode()?;
        self.plugin
            .store(REGISTRY_MODULE, DatastoreKind::Startup, &encoded)
    }
}

impl std::fmt::Debug for ModuleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleStore")
            .field("plugin", &self.plugin.name())
            .field("default_bindings", &self.default_bindings)
            .finish()
    }
}
