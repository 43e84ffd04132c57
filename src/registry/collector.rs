//! Dependency collection over compiled schema trees
//!
//! Walks a module's schema depth-first and emits dependency records: leafref
//! and instance-identifier deps from value types, xpath deps from
//! `when`/`must` constraints. Operation nodes open their own dependency
//! entries and are not descended into by the outer walk; an rpc's input and
//! output subtrees are collected into separate sections.

use crate::error::Result;
use crate::registry::record::{
    DependencySection, InstanceIdDep, LeafrefDep, NotifDeps, RpcDeps, XPathDep,
};
use crate::schema::{
    walk_module, walk_subtree, NodeId, NodeKind, ResolvedExpr, SchemaContext, SchemaVisitor,
    ValueType, VisitControl,
};

/// Operation entries accumulated for one module
#[derive(Debug, Default)]
struct OpAccum {
    rpcs: Vec<RpcDeps>,
    notifs: Vec<NotifDeps>,
}

/// Collect all dependency records of one module's compiled tree
pub fn collect_module(
    ctx: &SchemaContext,
    module: crate::schema::ModuleId,
) -> Result<(DependencySection, Vec<RpcDeps>, Vec<NotifDeps>)> {
    let mut deps = DependencySection::default();
    let mut ops = OpAccum::default();

    let mut visitor = DepsVisitor {
        deps: &mut deps,
        ops: &mut ops,
        root_notif: None,
    };
    walk_module(ctx, module, &mut visitor)?;

    Ok((deps, ops.rpcs, ops.notifs))
}

struct DepsVisitor<'a> {
    /// Section the plain-data walk emits into
    deps: &'a mut DependencySection,
    /// Module-level operation entries, shared with nested walks
    ops: &'a mut OpAccum,
    /// Notification currently collected as the walk's own root, if any
    root_notif: Option<NodeId>,
}

impl SchemaVisitor for DepsVisitor<'_> {
    fn visit(&mut self, ctx: &SchemaContext, node: NodeId) -> Result<VisitControl> {
        let kind = ctx.node(node).kind;

        if kind.is_rpc() {
            // operation, its dependencies go into a separate entry
            self.add_op_deps(ctx, node)?;
            return Ok(VisitControl::Skip);
        }
        if kind == NodeKind::Notification && self.root_notif != Some(node) {
            self.add_op_deps(ctx, node)?;
            return Ok(VisitControl::Skip);
        }

        let ctx_node = ctx.enclosing_context(node);
        let data = ctx.node(node);

        if matches!(kind, NodeKind::Leaf | NodeKind::LeafList) {
            collect_type(ctx, &data.value_type, node, ctx_node, self.deps);
        }
        for cond in data.when.iter().chain(data.musts.iter()) {
            collect_xpath(ctx, cond, ctx_node, self.deps);
        }

        Ok(VisitControl::Descend)
    }
}

impl DepsVisitor<'_> {
    /// Open a dependency entry for an operation and collect its subtrees
    fn add_op_deps(&mut self, ctx: &SchemaContext, op: NodeId) -> Result<()> {
        let path = ctx.data_path(op);
        let is_rpc = ctx.node(op).kind.is_rpc();

        // a grouping can land the same operation in the walk twice
        let exists = if is_rpc {
            self.ops.rpcs.iter().any(|r| r.path == path)
        } else {
            self.ops.notifs.iter().any(|n| n.path == path)
        };
        if exists {
            return Ok(());
        }

        if is_rpc {
            let mut input = DependencySection::default();
            let mut output = DependencySection::default();

            let in_node = ctx.op_child(op, NodeKind::Input)?;
            walk_subtree(
                ctx,
                in_node,
                &mut DepsVisitor {
                    deps: &mut input,
                    ops: &mut *self.ops,
                    root_notif: None,
                },
            )?;

            let out_node = ctx.op_child(op, NodeKind::Output)?;
            walk_subtree(
                ctx,
                out_node,
                &mut DepsVisitor {
                    deps: &mut output,
                    ops: &mut *self.ops,
                    root_notif: None,
                },
            )?;

            self.ops.rpcs.push(RpcDeps {
                path,
                input,
                output,
            });
        } else {
            let mut deps = DependencySection::default();
            walk_subtree(
                ctx,
                op,
                &mut DepsVisitor {
                    deps: &mut deps,
                    ops: &mut *self.ops,
                    root_notif: Some(op),
                },
            )?;

            self.ops.notifs.push(NotifDeps { path, deps });
        }

        Ok(())
    }
}

/// Collect dependencies from a value type, recursing through unions
fn collect_type(
    ctx: &SchemaContext,
    vtype: &ValueType,
    node: NodeId,
    ctx_node: NodeId,
    deps: &mut DependencySection,
) {
    match vtype {
        ValueType::Leafref {
            path,
            require_instance,
        } => {
            if !require_instance {
                // not needed for validation
                return;
            }
            for &atom in &path.atoms {
                let Some(foreign) = ctx.foreign_atom_module(atom, ctx_node) else {
                    continue;
                };
                deps.lrefs.push(LeafrefDep {
                    target_path: path.canonical.clone(),
                    target_module: ctx.module_name(foreign).to_string(),
                });
                // only a single module can be referenced
                break;
            }
        }
        ValueType::InstanceId {
            require_instance,
            default_target,
        } => {
            if !require_instance {
                return;
            }
            let default_target_path = default_target.as_ref().and_then(|target| {
                let first = target.atoms.first()?;
                ctx.foreign_atom_module(*first, ctx_node)
                    .map(|_| target.canonical.clone())
            });
            deps.inst_ids.push(InstanceIdDep {
                source_path: ctx.data_path(node),
                default_target_path,
            });
        }
        ValueType::Union(members) => {
            for member in members {
                collect_type(ctx, member, node, ctx_node, deps);
            }
        }
        ValueType::Plain => {}
    }
}

/// Emit one xpath dependency for a `when`/`must` constraint
fn collect_xpath(
    ctx: &SchemaContext,
    cond: &ResolvedExpr,
    ctx_node: NodeId,
    deps: &mut DependencySection,
) {
    let mut target_modules: Vec<String> = Vec::new();
    for &atom in &cond.atoms {
        if let Some(foreign) = ctx.foreign_atom_module(atom, ctx_node) {
            let name = ctx.module_name(foreign);
            if !target_modules.iter().any(|m| m == name) {
                target_modules.push(name.to_string());
            }
        }
    }
    deps.xpaths.push(XPathDep {
        expression: cond.canonical.clone(),
        target_modules,
    });
}
