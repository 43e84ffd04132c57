//! modstore - module metadata engine for a shared multi-process datastore
//!
//! Many independent processes (management applications, protocol front-ends,
//! CLI tools) attach to the same datastore concurrently. This crate is the
//! subsystem keeping that shared state consistent under concurrent,
//! crash-prone access:
//!
//! 1. **Module metadata & dependency graph** ([`registry`]): a persisted
//!    registry of every installed schema module (name, revision, enabled
//!    features, storage plugin bindings) plus a fully recomputed graph of
//!    every cross-module dependency — leafref targets, instance-identifier
//!    defaults, `when`/`must` expression targets, and operation input/output
//!    dependencies — needed to validate any future schema change safely.
//! 2. **Crash-safe cross-process wait/notify** ([`cond`]): the condition
//!    variable all shared-memory-resident datastore state is built on,
//!    robust to a holder dying mid-operation.
//!
//! The schema compiler, per-module storage plugins, the notification replay
//! log, and client-facing protocols are external collaborators; their
//! interfaces live in [`schema`] and [`plugin`].
//!
//! ## Design principles
//!
//! 1. **Full recomputation over incremental patching**: every schema-changing
//!    transaction drops all dependency records across the whole registry and
//!    rebuilds them, so no stale or duplicate dependency can survive a
//!    change.
//! 2. **Single persist point**: a transaction persists exactly once, after
//!    validation; failures discard the in-memory working tree and leave the
//!    stored registry untouched.
//! 3. **No hidden caching**: every transaction reloads the persisted
//!    registry before mutating, so attached processes never diverge.

pub mod cond;
pub mod config;
pub mod error;
pub mod plugin;
pub mod registry;
pub mod schema;

pub use config::StoreConfig;
pub use error::{MetaError, Result};

// Re-export the types one needs to run transactions
pub use cond::{Acquired, CondBackend, CondCell, SharedCond, SharedMutex};
pub use plugin::{DatastoreKind, DatastorePlugin, DsBindings, FilePlugin, NotificationLog};
pub use registry::{ModuleSet, ModuleStore, Registry};
pub use schema::{ContextBuilder, SchemaContext};
