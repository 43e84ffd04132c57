//! Construction surface for compiled schema contexts
//!
//! The external compiler (or a test fixture) registers modules, nodes and
//! resolved expressions here, then seals the result into a
//! [`SchemaContext`]. Node and module ids are handed out eagerly so
//! expressions can reference previously built nodes.

use std::collections::HashMap;

use crate::error::{MetaError, Result};
use crate::schema::context::SchemaContext;
use crate::schema::model::{
    ModuleId, NodeId, NodeKind, ResolvedExpr, SchemaModule, SchemaNode, Submodule, ValueType,
};

/// Incremental builder for a [`SchemaContext`]
#[derive(Debug, Default)]
pub struct ContextBuilder {
    modules: Vec<SchemaModule>,
    nodes: Vec<SchemaNode>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implemented module
    pub fn module(&mut self, name: &str, revision: Option<&str>) -> ModuleId {
        self.add_module(name, revision, true)
    }

    /// Register a module imported only for its types (no data tree)
    pub fn import_only_module(&mut self, name: &str, revision: Option<&str>) -> ModuleId {
        self.add_module(name, revision, false)
    }

    fn add_module(&mut self, name: &str, revision: Option<&str>, implemented: bool) -> ModuleId {
        let id = ModuleId(self.modules.len());
        self.modules.push(SchemaModule {
            name: name.to_string(),
            revision: revision.map(str::to_string),
            implemented,
            features: Vec::new(),
            imports: Vec::new(),
            includes: Vec::new(),
            top_nodes: Vec::new(),
        });
        id
    }

    /// Mark a feature as enabled on a module
    pub fn feature(&mut self, module: ModuleId, name: &str) {
        self.modules[module.0].features.push(name.to_string());
    }

    /// Record a direct import
    pub fn import(&mut self, module: ModuleId, imported: ModuleId) {
        self.modules[module.0].imports.push(imported);
    }

    /// Record an included submodule together with the submodule's imports
    pub fn include(&mut self, module: ModuleId, submodule: &str, imports: &[ModuleId]) {
        self.modules[module.0].includes.push(Submodule {
            name: submodule.to_string(),
            imports: imports.to_vec(),
        });
    }

    /// Add a schema node
    ///
    /// `module` is the defining module; passing a parent from another
    /// module's tree models an augment.
    pub fn node(
        &mut self,
        module: ModuleId,
        parent: Option<NodeId>,
        name: &str,
        kind: NodeKind,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(SchemaNode {
            name: name.to_string(),
            kind,
            module,
            parent,
            children: Vec::new(),
            value_type: ValueType::Plain,
            when: Vec::new(),
            musts: Vec::new(),
        });
        match parent {
            Some(p) => self.nodes[p.0].children.push(id),
            None => self.modules[module.0].top_nodes.push(id),
        }
        id
    }

    /// Add a leaf node with a value type
    pub fn leaf(
        &mut self,
        module: ModuleId,
        parent: Option<NodeId>,
        name: &str,
        value_type: ValueType,
    ) -> NodeId {
        let id = self.node(module, parent, name, NodeKind::Leaf);
        self.nodes[id.0].value_type = value_type;
        id
    }

    /// Replace a node's value type
    pub fn set_type(&mut self, node: NodeId, value_type: ValueType) {
        self.nodes[node.0].value_type = value_type;
    }

    /// Attach a resolved `when` condition to a node
    pub fn when(&mut self, node: NodeId, canonical: &str, atoms: &[NodeId]) {
        self.nodes[node.0]
            .when
            .push(ResolvedExpr::new(canonical, atoms));
    }

    /// Attach a resolved `must` constraint to a node
    pub fn must(&mut self, node: NodeId, canonical: &str, atoms: &[NodeId]) {
        self.nodes[node.0]
            .musts
            .push(ResolvedExpr::new(canonical, atoms));
    }

    /// Seal the context
    pub fn build(self) -> Result<SchemaContext> {
        let mut by_name = HashMap::with_capacity(self.modules.len());
        for (i, module) in self.modules.iter().enumerate() {
            if by_name.insert(module.name.clone(), ModuleId(i)).is_some() {
                return Err(MetaError::schema(format!(
                    "duplicate module \"{}\" in context",
                    module.name
                )));
            }
        }

        Ok(SchemaContext {
            modules: self.modules,
            nodes: self.nodes,
            by_name,
        })
    }
}
