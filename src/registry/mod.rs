//! Persisted module registry and its transactions
//!
//! The registry records every installed schema module together with a fully
//! recomputed graph of cross-module dependencies. [`ModuleStore`] runs the
//! transactions; [`collector`] walks compiled schemas to produce the
//! dependency records.

pub mod collector;
pub mod record;
pub mod store;

pub use record::{
    DependencySection, InstanceIdDep, LeafrefDep, ModuleRecord, NotifDeps, PluginBinding,
    Registry, ReplaySupport, RpcDeps, XPathDep,
};
pub use store::{ModuleSet, ModuleStore, BUILTIN_MODULES, REGISTRY_MODULE};
