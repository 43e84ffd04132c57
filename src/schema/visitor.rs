//! Depth-first traversal over compiled schema trees
//!
//! The visitor controls descent explicitly: continue into the subtree, skip
//! it, or abort the whole walk with an error. Operation-boundary handling in
//! dependency collection relies on the skip outcome.

use crate::error::Result;
use crate::schema::context::SchemaContext;
use crate::schema::model::{ModuleId, NodeId};

/// Outcome of visiting one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitControl {
    /// Descend into the node's children
    Descend,
    /// Do not descend; continue with the next sibling
    Skip,
}

/// Callback invoked for every node of a preorder depth-first walk
pub trait SchemaVisitor {
    fn visit(&mut self, ctx: &SchemaContext, node: NodeId) -> Result<VisitControl>;
}

/// Walk a subtree, including its root
pub fn walk_subtree(
    ctx: &SchemaContext,
    root: NodeId,
    visitor: &mut dyn SchemaVisitor,
) -> Result<()> {
    if visitor.visit(ctx, root)? == VisitControl::Skip {
        return Ok(());
    }
    for i in 0..ctx.node(root).children.len() {
        let child = ctx.node(root).children[i];
        walk_subtree(ctx, child, visitor)?;
    }
    Ok(())
}

/// Walk every top-level subtree of a module
pub fn walk_module(
    ctx: &SchemaContext,
    module: ModuleId,
    visitor: &mut dyn SchemaVisitor,
) -> Result<()> {
    for i in 0..ctx.module(module).top_nodes.len() {
        let top = ctx.module(module).top_nodes[i];
        walk_subtree(ctx, top, visitor)?;
    }
    Ok(())
}
