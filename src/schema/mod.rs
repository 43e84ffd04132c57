//! Compiled-schema object model and queries
//!
//! The schema compiler itself is an external collaborator; this module
//! defines the compiled objects the metadata engine consumes from it and the
//! read-only queries the engine needs: module lookup, feature enumeration,
//! canonical data paths, resolved expression atoms, and foreign-atom
//! classification. [`ContextBuilder`] is the handoff surface through which
//! the compiler delivers a finished context.

pub mod builder;
pub mod context;
pub mod model;
pub mod visitor;

pub use builder::ContextBuilder;
pub use context::SchemaContext;
pub use model::{
    ModuleId, NodeId, NodeKind, ResolvedExpr, SchemaModule, SchemaNode, Submodule, ValueType,
};
pub use visitor::{walk_module, walk_subtree, SchemaVisitor, VisitControl};
