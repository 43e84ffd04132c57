//! Compiled schema context and its read-only queries

use std::collections::HashMap;

use crate::error::{MetaError, Result};
use crate::schema::model::{ModuleId, NodeId, NodeKind, SchemaModule, SchemaNode};

/// A sealed set of compiled modules
///
/// Produced by the external schema engine (through
/// [`super::ContextBuilder`]); immutable afterwards. Every transaction of the
/// metadata store runs against exactly one context reflecting the
/// post-transaction schema state.
#[derive(Debug)]
pub struct SchemaContext {
    pub(crate) modules: Vec<SchemaModule>,
    pub(crate) nodes: Vec<SchemaNode>,
    pub(crate) by_name: HashMap<String, ModuleId>,
}

impl SchemaContext {
    /// Look up a module by name
    pub fn module_id(&self, name: &str) -> Option<ModuleId> {
        self.by_name.get(name).copied()
    }

    /// Module data for an id
    pub fn module(&self, id: ModuleId) -> &SchemaModule {
        &self.modules[id.0]
    }

    /// Module name for an id
    pub fn module_name(&self, id: ModuleId) -> &str {
        &self.modules[id.0].name
    }

    /// All modules in registration order
    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &SchemaModule)> {
        self.modules.iter().enumerate().map(|(i, m)| (ModuleId(i), m))
    }

    /// Implemented modules in registration order
    pub fn implemented_modules(&self) -> impl Iterator<Item = (ModuleId, &SchemaModule)> {
        self.modules().filter(|(_, m)| m.implemented)
    }

    /// Node data for an id
    pub fn node(&self, id: NodeId) -> &SchemaNode {
        &self.nodes[id.0]
    }

    /// Child of an operation node with the given kind (its input or output
    /// container)
    pub fn op_child(&self, op: NodeId, kind: NodeKind) -> Result<NodeId> {
        self.node(op)
            .children
            .iter()
            .copied()
            .find(|&c| self.node(c).kind == kind)
            .ok_or_else(|| {
                MetaError::internal(format!(
                    "operation \"{}\" has no {:?} container",
                    self.node(op).name,
                    kind
                ))
            })
    }

    /// Canonical data path of a node
    ///
    /// Schema-only nodes (choice, case, input, output) contribute no segment;
    /// a segment is prefixed with its defining module's name whenever that
    /// module differs from the previous segment's.
    pub fn data_path(&self, id: NodeId) -> String {
        let mut chain = Vec::new();
        let mut cur = Some(id);
        while let Some(n) = cur {
            chain.push(n);
            cur = self.node(n).parent;
        }
        chain.reverse();

        let mut path = String::new();
        let mut prev_mod = None;
        for n in chain {
            let node = self.node(n);
            if !node.kind.in_data_path() {
                continue;
            }
            if prev_mod == Some(node.module) {
                path.push('/');
            } else {
                path.push('/');
                path.push_str(&self.modules[node.module.0].name);
                path.push(':');
            }
            path.push_str(&node.name);
            prev_mod = Some(node.module);
        }
        path
    }

    /// First ancestor that is an operation node, or the top-level node when
    /// the node is plain data
    ///
    /// This is the context against which atoms are classified as foreign.
    pub fn enclosing_context(&self, id: NodeId) -> NodeId {
        let mut cur = id;
        while !self.node(cur).kind.is_operation() {
            match self.node(cur).parent {
                Some(p) => cur = p,
                None => break,
            }
        }
        cur
    }

    /// Classify an expression atom against its enclosing context node
    ///
    /// Climbs the atom's ancestor chain; reaching `ctx_node` means the atom
    /// is local. Otherwise the atom's top-level ancestor decides: owned by
    /// the context module (including nodes augmented into its tree) means
    /// local, anything else yields the foreign module.
    pub fn foreign_atom_module(&self, atom: NodeId, ctx_node: NodeId) -> Option<ModuleId> {
        let mut top = atom;
        loop {
            if top == ctx_node {
                return None;
            }
            match self.node(top).parent {
                Some(p) => top = p,
                None => break,
            }
        }

        let top_mod = self.node(top).module;
        if top_mod == self.node(ctx_node).module {
            None
        } else {
            Some(top_mod)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::schema::{ContextBuilder, NodeKind, ValueType};

    #[test]
    fn test_data_path_prefixes() {
        let mut b = ContextBuilder::new();
        let m = b.module("base", Some("2024-01-01"));
        let top = b.node(m, None, "system", NodeKind::Container);
        let ch = b.node(m, Some(top), "choice", NodeKind::Choice);
        let cs = b.node(m, Some(ch), "case-a", NodeKind::Case);
        let leaf = b.leaf(m, Some(cs), "hostname", ValueType::Plain);

        let aug = b.module("augmenting", None);
        let aug_leaf = b.leaf(aug, Some(top), "extra", ValueType::Plain);

        let ctx = b.build().unwrap();
        assert_eq!(ctx.data_path(leaf), "/base:system/hostname");
        assert_eq!(ctx.data_path(aug_leaf), "/base:system/augmenting:extra");
    }

    #[test]
    fn test_foreign_atom_classification() {
        let mut b = ContextBuilder::new();
        let m1 = b.module("one", None);
        let top1 = b.node(m1, None, "a", NodeKind::Container);
        let leaf1 = b.leaf(m1, Some(top1), "x", ValueType::Plain);

        let m2 = b.module("two", None);
        let top2 = b.node(m2, None, "b", NodeKind::Container);
        let leaf2 = b.leaf(m2, Some(top2), "y", ValueType::Plain);

        // node augmented by "two" into "one"'s tree
        let aug = b.leaf(m2, Some(top1), "z", ValueType::Plain);

        let ctx = b.build().unwrap();

        // same module: local
        assert_eq!(ctx.foreign_atom_module(leaf1, top1), None);
        // other module's tree: foreign
        assert_eq!(ctx.foreign_atom_module(leaf2, top1), Some(m2));
        // augment into the context tree: local despite foreign owner
        assert_eq!(ctx.foreign_atom_module(aug, top1), None);
    }

    #[test]
    fn test_enclosing_context_of_operation_input() {
        let mut b = ContextBuilder::new();
        let m = b.module("ops", None);
        let rpc = b.node(m, None, "reset", NodeKind::Rpc);
        let input = b.node(m, Some(rpc), "input", NodeKind::Input);
        let leaf = b.leaf(m, Some(input), "delay", ValueType::Plain);
        let ctx = b.build().unwrap();

        assert_eq!(ctx.enclosing_context(leaf), rpc);
        assert_eq!(ctx.data_path(rpc), "/ops:reset");
        // input/output are schema-only in data paths
        assert_eq!(ctx.data_path(leaf), "/ops:reset/delay");
    }
}
